use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::ids::{OptionId, QuestionId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has no options")]
    NoOptions(QuestionId),

    #[error("question {question} lists option {option} more than once")]
    DuplicateOption {
        question: QuestionId,
        option: OptionId,
    },
}

//
// ─── OPTION ────────────────────────────────────────────────────────────────────
//

/// One selectable choice of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    pub id: OptionId,
    pub text: String,
}

impl AnswerOption {
    #[must_use]
    pub fn new(id: OptionId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A multiple-choice question as delivered by the attempt backend.
///
/// Questions are immutable once fetched. The client never learns which option
/// is correct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuestion")]
pub struct Question {
    id: QuestionId,
    text: String,
    options: Vec<AnswerOption>,
}

#[derive(Deserialize)]
struct RawQuestion {
    id: QuestionId,
    text: String,
    options: Vec<AnswerOption>,
}

impl TryFrom<RawQuestion> for Question {
    type Error = QuestionError;

    fn try_from(raw: RawQuestion) -> Result<Self, Self::Error> {
        Self::new(raw.id, raw.text, raw.options)
    }
}

impl Question {
    /// Build a question, checking that it has options and that option ids are unique.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::NoOptions` or `QuestionError::DuplicateOption`.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        options: Vec<AnswerOption>,
    ) -> Result<Self, QuestionError> {
        if options.is_empty() {
            return Err(QuestionError::NoOptions(id));
        }
        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if !seen.insert(&option.id) {
                return Err(QuestionError::DuplicateOption {
                    question: id,
                    option: option.id.clone(),
                });
            }
        }

        Ok(Self {
            id,
            text: text.into(),
            options,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    #[must_use]
    pub fn has_option(&self, option_id: &OptionId) -> bool {
        self.options.iter().any(|o| &o.id == option_id)
    }

    #[must_use]
    pub fn option(&self, option_id: &OptionId) -> Option<&AnswerOption> {
        self.options.iter().find(|o| &o.id == option_id)
    }
}
