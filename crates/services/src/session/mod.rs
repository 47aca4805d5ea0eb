mod controller;
mod notice;
mod progress;
mod pump;

// Public API of the quiz session subsystem.
pub use crate::error::{Disposition, ExpiryReason, SessionError};
pub use controller::QuizSessionController;
pub use notice::SessionNotice;
pub use progress::SessionProgress;
