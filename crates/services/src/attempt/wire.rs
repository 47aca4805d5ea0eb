//! JSON bodies exchanged with the attempt backend.
//!
//! The backend is tolerant about naming (`snake_case` or `camelCase`) and may
//! send numeric ids, so decoding accepts both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quiz_core::model::{
    AnswerOption, AttemptId, AttemptResult, AttemptStatus, OptionId, Question, QuestionId,
    StudentId, StudentSnapshot,
};

use super::{CreatedAttempt, HistoryEntry};
use crate::error::AttemptApiError;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireId {
    Text(String),
    Number(i64),
}

impl WireId {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

fn invalid<E: Into<quiz_core::Error>>(err: E) -> AttemptApiError {
    AttemptApiError::InvalidData(err.into())
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateAttemptRequest<'a> {
    pub student: &'a StudentSnapshot,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateAttemptResponse {
    #[serde(alias = "attemptId", alias = "id")]
    attempt_id: WireId,
    #[serde(default)]
    questions: Vec<WireQuestion>,
}

#[derive(Debug, Deserialize)]
struct WireQuestion {
    id: WireId,
    #[serde(alias = "question_text", alias = "questionText")]
    text: String,
    #[serde(default)]
    options: Vec<WireOption>,
}

#[derive(Debug, Deserialize)]
struct WireOption {
    id: WireId,
    #[serde(alias = "option_text", alias = "optionText")]
    text: String,
}

impl WireQuestion {
    fn into_question(self) -> Result<Question, AttemptApiError> {
        let options = self
            .options
            .into_iter()
            .map(|o| {
                let id = OptionId::new(o.id.into_string()).map_err(invalid)?;
                Ok(AnswerOption::new(id, o.text))
            })
            .collect::<Result<Vec<_>, AttemptApiError>>()?;
        let id = QuestionId::new(self.id.into_string()).map_err(invalid)?;
        Question::new(id, self.text, options).map_err(invalid)
    }
}

impl CreateAttemptResponse {
    pub(crate) fn into_created(self) -> Result<CreatedAttempt, AttemptApiError> {
        let attempt_id = AttemptId::new(self.attempt_id.into_string()).map_err(invalid)?;
        let questions = self
            .questions
            .into_iter()
            .map(WireQuestion::into_question)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CreatedAttempt {
            attempt_id,
            questions,
        })
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryResponse {
    answers: Vec<WireHistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct WireHistoryEntry {
    #[serde(alias = "questionId")]
    question_id: WireId,
    #[serde(default, alias = "optionId")]
    option_id: Option<WireId>,
}

impl HistoryResponse {
    pub(crate) fn into_entries(self) -> Result<Vec<HistoryEntry>, AttemptApiError> {
        self.answers
            .into_iter()
            .map(|entry| {
                let question_id =
                    QuestionId::new(entry.question_id.into_string()).map_err(invalid)?;
                let option_id = entry
                    .option_id
                    .map(|id| OptionId::new(id.into_string()).map_err(invalid))
                    .transpose()?;
                Ok(HistoryEntry {
                    question_id,
                    option_id,
                })
            })
            .collect()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateAnswerRequest<'a> {
    pub option_id: &'a str,
}

/// Submit response. Every field may be missing; numeric fields default to
/// zero and timestamps to the time the response was received.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct SubmitResponse {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default, alias = "studentId")]
    student_id: Option<WireId>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "startedAt")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "finishedAt")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "totalCount")]
    total_count: Option<u32>,
    #[serde(default, alias = "correctCount")]
    correct_count: Option<u32>,
    #[serde(default)]
    score: Option<f64>,
}

impl SubmitResponse {
    pub(crate) fn into_result(
        self,
        submitted: &AttemptId,
        now: DateTime<Utc>,
    ) -> Result<AttemptResult, AttemptApiError> {
        let attempt_id = match self.id {
            Some(id) => AttemptId::new(id.into_string()).map_err(invalid)?,
            None => submitted.clone(),
        };
        let student_id = self
            .student_id
            .map(|id| StudentId::new(id.into_string()).map_err(invalid))
            .transpose()?;

        Ok(AttemptResult {
            attempt_id,
            student_id,
            status: self
                .status
                .map_or(AttemptStatus::Submitted, |raw| AttemptStatus::parse(&raw)),
            started_at: self.started_at.unwrap_or(now),
            finished_at: self.finished_at.unwrap_or(now),
            total_count: self.total_count.unwrap_or(0),
            correct_count: self.correct_count.unwrap_or(0),
            score: self.score.unwrap_or(0.0),
        })
    }
}
