use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::answer::AnswerSet;
use crate::model::attempt::AttemptResult;
use crate::model::ids::{AttemptId, OptionId, QuestionId};
use crate::model::question::Question;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionStateError {
    #[error("a quiz session needs at least one question")]
    NoQuestions,

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error("question {0} is not part of this attempt")]
    UnknownQuestion(QuestionId),

    #[error("option {option} does not belong to question {question}")]
    UnknownOption {
        question: QuestionId,
        option: OptionId,
    },

    #[error("quiz session already completed")]
    Completed,
}

//
// ─── ACTIONS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// Transitions accepted by `QuizSessionState::apply`.
#[derive(Debug, Clone, PartialEq)]
pub enum QuizAction {
    SelectOption {
        question_id: QuestionId,
        option_id: OptionId,
    },
    Advance(Direction),
    JumpTo(usize),
    Complete(AttemptResult),
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Client-owned state of one quiz attempt.
///
/// Invariants:
/// - `questions` is never empty and never changes after construction
/// - `current_index` is always within `[0, questions.len())`
/// - a result is present exactly when the session is completed
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSessionState {
    attempt_id: AttemptId,
    questions: Vec<Question>,
    current_index: usize,
    answers: AnswerSet,
    started_at: DateTime<Utc>,
    result: Option<AttemptResult>,
}

impl QuizSessionState {
    /// Start a fresh session positioned on the first question.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::NoQuestions` for an empty list and
    /// `SessionStateError::DuplicateQuestion` if two questions share an id.
    pub fn new(
        attempt_id: AttemptId,
        questions: Vec<Question>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, SessionStateError> {
        if questions.is_empty() {
            return Err(SessionStateError::NoQuestions);
        }
        let mut seen = HashSet::with_capacity(questions.len());
        for q in &questions {
            if !seen.insert(q.id()) {
                return Err(SessionStateError::DuplicateQuestion(q.id().clone()));
            }
        }

        Ok(Self {
            attempt_id,
            questions,
            current_index: 0,
            answers: AnswerSet::new(),
            started_at,
            result: None,
        })
    }

    #[must_use]
    pub fn attempt_id(&self) -> &AttemptId {
        &self.attempt_id
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub fn current_question(&self) -> &Question {
        // current_index is kept in range by every transition
        &self.questions[self.current_index]
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 == self.questions.len()
    }

    #[must_use]
    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    #[must_use]
    pub fn selected_option(&self, question_id: &QuestionId) -> Option<&OptionId> {
        self.answers.get(question_id)
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.result.is_some()
    }

    #[must_use]
    pub fn result(&self) -> Option<&AttemptResult> {
        self.result.as_ref()
    }

    #[must_use]
    pub fn question(&self, question_id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == question_id)
    }

    /// Time since the session started, never negative.
    #[must_use]
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).max(Duration::zero())
    }

    /// Questions still lacking an answer, in question order.
    #[must_use]
    pub fn unanswered(&self) -> Vec<QuestionId> {
        self.answers.missing(&self.questions)
    }

    /// Apply a single transition.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` once the session is completed,
    /// or a validation error for unknown question/option ids.
    pub fn apply(&mut self, action: QuizAction) -> Result<(), SessionStateError> {
        match action {
            QuizAction::SelectOption {
                question_id,
                option_id,
            } => self.select_option(question_id, option_id).map(|_| ()),
            QuizAction::Advance(direction) => self.advance(direction).map(|_| ()),
            QuizAction::JumpTo(index) => self.jump_to(index).map(|_| ()),
            QuizAction::Complete(result) => self.complete(result),
        }
    }

    /// Record a selection, replacing any earlier one for the same question.
    ///
    /// Returns the replaced option, if any.
    ///
    /// # Errors
    ///
    /// See [`QuizSessionState::apply`].
    pub fn select_option(
        &mut self,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<Option<OptionId>, SessionStateError> {
        self.ensure_open()?;
        let question = self
            .question(&question_id)
            .ok_or_else(|| SessionStateError::UnknownQuestion(question_id.clone()))?;
        if !question.has_option(&option_id) {
            return Err(SessionStateError::UnknownOption {
                question: question_id,
                option: option_id,
            });
        }
        Ok(self.answers.record(question_id, option_id))
    }

    /// Move one question forward or back, clamped to the question range.
    ///
    /// Returns the new index.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` after completion.
    pub fn advance(&mut self, direction: Direction) -> Result<usize, SessionStateError> {
        let target = match direction {
            Direction::Next => self.current_index.saturating_add(1),
            Direction::Previous => self.current_index.saturating_sub(1),
        };
        self.jump_to(target)
    }

    /// Move to `index`, clamped to the question range. Returns the new index.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` after completion.
    pub fn jump_to(&mut self, index: usize) -> Result<usize, SessionStateError> {
        self.ensure_open()?;
        self.current_index = index.min(self.questions.len() - 1);
        Ok(self.current_index)
    }

    /// Mark the session completed with the backend's scored result.
    ///
    /// # Errors
    ///
    /// Returns `SessionStateError::Completed` if a result is already present.
    pub fn complete(&mut self, result: AttemptResult) -> Result<(), SessionStateError> {
        self.ensure_open()?;
        self.result = Some(result);
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), SessionStateError> {
        if self.is_completed() {
            Err(SessionStateError::Completed)
        } else {
            Ok(())
        }
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
