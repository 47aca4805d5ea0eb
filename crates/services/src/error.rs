//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AttemptStatus, OptionId, QuestionId, SessionStateError};
use storage::StorageError;

/// Errors emitted by `AttemptService` implementations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AttemptApiError {
    #[error("attempt service request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("attempt service unreachable: {0}")]
    Unreachable(String),
    #[error("malformed attempt service response: {0}")]
    Malformed(String),
    #[error("attempt service returned invalid data: {0}")]
    InvalidData(#[from] quiz_core::Error),
    #[error("request task did not finish: {0}")]
    Interrupted(String),
}

/// Errors emitted while reading attempt service configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("QUIZ_API_BASE_URL is not set")]
    MissingBaseUrl,
    #[error("invalid attempt service base URL: {0}")]
    InvalidBaseUrl(String),
    #[error("invalid request timeout: {0}")]
    InvalidTimeout(String),
}

/// Why a persisted session could not be resumed.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExpiryReason {
    /// No persisted attempt was found.
    Missing,
    /// The persisted attempt is no longer active.
    Inactive(AttemptStatus),
    /// The persisted attempt has no questions.
    NoQuestions,
    /// Persisted data exists but could not be read or is inconsistent.
    Unreadable(String),
}

impl std::fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing => f.write_str("no saved attempt"),
            Self::Inactive(status) => write!(f, "attempt status is {status}"),
            Self::NoQuestions => f.write_str("saved attempt has no questions"),
            Self::Unreadable(detail) => write!(f, "saved attempt is unreadable: {detail}"),
        }
    }
}

/// How the presentation layer should react to a `SessionError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Send the student back to registration; retrying will not help.
    RedirectToRegistration,
    /// Show a retry prompt; local state is intact.
    Retry,
    /// Show a non-blocking warning and carry on.
    Warn,
    /// The student has to change something first (e.g. answer every question).
    FixInput,
}

/// Errors emitted by the quiz session controller.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("session expired: {0}")]
    SessionExpired(ExpiryReason),
    #[error("could not load answer history")]
    HistoryFetchFailed {
        #[source]
        source: AttemptApiError,
    },
    #[error("answer for question {question_id} may not have been saved")]
    AnswerSyncFailed {
        question_id: QuestionId,
        option_id: OptionId,
        #[source]
        source: AttemptApiError,
    },
    #[error("{} question(s) still unanswered", .missing.len())]
    IncompleteAttempt { missing: Vec<QuestionId> },
    #[error("submission failed")]
    SubmitFailed {
        #[source]
        source: AttemptApiError,
    },
    #[error("no quiz session is loaded")]
    NotLoaded,
    #[error("submit is only available on the last question (at {current} of {total})")]
    NotOnLastQuestion { current: usize, total: usize },
    #[error(transparent)]
    State(#[from] SessionStateError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::SessionExpired(_)
            | Self::HistoryFetchFailed { .. }
            | Self::NotLoaded
            | Self::Storage(_) => Disposition::RedirectToRegistration,
            Self::SubmitFailed { .. } => Disposition::Retry,
            Self::AnswerSyncFailed { .. } => Disposition::Warn,
            Self::IncompleteAttempt { .. } | Self::NotOnLastQuestion { .. } | Self::State(_) => {
                Disposition::FixInput
            }
        }
    }

    /// True for failures the student can retry in place.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self.disposition(), Disposition::Retry)
    }
}

/// Errors emitted by `RegistrationService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegistrationError {
    #[error("attempt has no questions")]
    NoQuestions,
    #[error(transparent)]
    Api(#[from] AttemptApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
