use quiz_core::model::{OptionId, QuestionId};

use crate::error::SessionError;

/// Events raised by background work that the caller did not await.
#[derive(Debug)]
#[non_exhaustive]
pub enum SessionNotice {
    /// The backend acknowledged a selection.
    AnswerSaved {
        question_id: QuestionId,
        option_id: OptionId,
    },
    /// A background sync failed. The local selection is kept and will be
    /// retried when the student moves on or submits.
    AnswerSyncFailed(SessionError),
}
