#![forbid(unsafe_code)]

pub mod attempt;
pub mod config;
pub mod error;
pub mod registration;
pub mod session;
pub mod timer;

pub use quiz_core::Clock;

pub use attempt::{
    AttemptService, CreatedAttempt, HistoryEntry, HttpAttemptService, InMemoryAttemptService,
};
pub use config::AttemptServiceConfig;
pub use error::{
    AttemptApiError, ConfigError, Disposition, ExpiryReason, RegistrationError, SessionError,
};
pub use registration::RegistrationService;
pub use session::{QuizSessionController, SessionNotice, SessionProgress};
pub use timer::{QuizTimer, format_elapsed};
