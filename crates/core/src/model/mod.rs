mod answer;
mod attempt;
mod ids;
mod question;
mod session;
mod student;

pub use answer::{Answer, AnswerSet};
pub use attempt::{AttemptResult, AttemptStatus};
pub use ids::{AttemptId, OptionId, ParseIdError, QuestionId, StudentId};
pub use question::{AnswerOption, Question, QuestionError};
pub use session::{Direction, QuizAction, QuizSessionState, SessionStateError};
pub use student::StudentSnapshot;
