use std::sync::Arc;

use tracing::info;

use quiz_core::model::{AttemptId, StudentSnapshot};
use quiz_core::snapshot::SessionSnapshot;
use storage::SnapshotStore;

use crate::attempt::AttemptService;
use crate::error::RegistrationError;

/// Creates attempts and persists the session that `QuizSessionController::resume`
/// later picks up.
#[derive(Clone)]
pub struct RegistrationService {
    attempts: Arc<dyn AttemptService>,
    snapshots: SnapshotStore,
}

impl RegistrationService {
    #[must_use]
    pub fn new(attempts: Arc<dyn AttemptService>, snapshots: SnapshotStore) -> Self {
        Self {
            attempts,
            snapshots,
        }
    }

    /// Create an attempt for `student` and store it as the active session.
    ///
    /// Any previously stored session is replaced. The start time stays unset
    /// until the session is first resumed.
    ///
    /// # Errors
    ///
    /// Returns `RegistrationError::NoQuestions` if the backend hands out an
    /// empty attempt, `RegistrationError::Api` on backend failures and
    /// `RegistrationError::Storage` if the session cannot be saved.
    pub async fn register(&self, student: StudentSnapshot) -> Result<AttemptId, RegistrationError> {
        let created = self.attempts.create_attempt(&student).await?;
        if created.questions.is_empty() {
            return Err(RegistrationError::NoQuestions);
        }

        let attempt_id = created.attempt_id.clone();
        let questions = created.questions.len();
        let snapshot = SessionSnapshot::new(created.attempt_id, created.questions, Some(student));
        self.snapshots.save(&snapshot).await?;

        info!(%attempt_id, questions, "attempt registered");
        Ok(attempt_id)
    }
}
