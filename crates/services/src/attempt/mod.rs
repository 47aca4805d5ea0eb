//! Contract with the remote attempt backend and its implementations.

mod http;
mod memory;
mod wire;

use async_trait::async_trait;
use quiz_core::model::{AttemptId, AttemptResult, OptionId, Question, QuestionId, StudentSnapshot};

use crate::error::AttemptApiError;

pub use http::HttpAttemptService;
pub use memory::{AttemptCall, InMemoryAttemptService, Operation};

/// A freshly created attempt and the questions it owns.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatedAttempt {
    pub attempt_id: AttemptId,
    pub questions: Vec<Question>,
}

/// One row of an attempt's answer history. `option_id` is `None` for
/// questions the backend has no selection for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub question_id: QuestionId,
    pub option_id: Option<OptionId>,
}

/// Remote service that owns attempts and scores them.
///
/// Answer updates are keyed by `(attempt, question)` and idempotent; the last
/// write per question wins.
#[async_trait]
pub trait AttemptService: Send + Sync {
    /// Create an attempt for a registered student.
    ///
    /// # Errors
    ///
    /// Returns `AttemptApiError` on transport or backend failures.
    async fn create_attempt(
        &self,
        student: &StudentSnapshot,
    ) -> Result<CreatedAttempt, AttemptApiError>;

    /// Fetch what the backend has recorded for each question of the attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptApiError` on transport failures or malformed bodies.
    async fn answer_history(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<Vec<HistoryEntry>, AttemptApiError>;

    /// Record the selection for one question.
    ///
    /// # Errors
    ///
    /// Returns `AttemptApiError` on transport or backend failures.
    async fn update_answer(
        &self,
        attempt_id: &AttemptId,
        question_id: &QuestionId,
        option_id: &OptionId,
    ) -> Result<(), AttemptApiError>;

    /// Finalize the attempt and return its score.
    ///
    /// # Errors
    ///
    /// Returns `AttemptApiError` on transport or backend failures.
    async fn submit_attempt(&self, attempt_id: &AttemptId)
    -> Result<AttemptResult, AttemptApiError>;
}
