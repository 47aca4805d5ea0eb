/// Snapshot of how far the student has come, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionProgress {
    pub total: usize,
    pub answered: usize,
    pub current_index: usize,
    /// Answered questions whose latest selection the backend has not acknowledged.
    pub unsynced: usize,
}

impl SessionProgress {
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.answered)
    }

    /// One-based position of the displayed question.
    #[must_use]
    pub fn position(&self) -> usize {
        self.current_index + 1
    }

    #[must_use]
    pub fn is_fully_answered(&self) -> bool {
        self.answered == self.total
    }
}
