use thiserror::Error;

use crate::model::{ParseIdError, QuestionError, SessionStateError};
use crate::snapshot::SnapshotError;

/// Domain errors surfaced by `quiz-core`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Id(#[from] ParseIdError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    SessionState(#[from] SessionStateError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
