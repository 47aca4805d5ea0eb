use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::ids::{OptionId, QuestionId};
use crate::model::question::Question;

/// A student's selection for one question.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: QuestionId,
    pub option_id: OptionId,
}

impl Answer {
    #[must_use]
    pub fn new(question_id: QuestionId, option_id: OptionId) -> Self {
        Self {
            question_id,
            option_id,
        }
    }
}

/// Answers keyed by question id. At most one answer exists per question;
/// recording a new one replaces the previous selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerSet {
    by_question: HashMap<QuestionId, OptionId>,
}

impl AnswerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `option_id` for `question_id`, returning the replaced option if any.
    pub fn record(&mut self, question_id: QuestionId, option_id: OptionId) -> Option<OptionId> {
        self.by_question.insert(question_id, option_id)
    }

    #[must_use]
    pub fn get(&self, question_id: &QuestionId) -> Option<&OptionId> {
        self.by_question.get(question_id)
    }

    #[must_use]
    pub fn contains(&self, question_id: &QuestionId) -> bool {
        self.by_question.contains_key(question_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_question.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_question.is_empty()
    }

    /// True when every question in `questions` has an answer.
    #[must_use]
    pub fn covers(&self, questions: &[Question]) -> bool {
        questions.iter().all(|q| self.contains(q.id()))
    }

    /// Ids of the questions without an answer, in question order.
    #[must_use]
    pub fn missing(&self, questions: &[Question]) -> Vec<QuestionId> {
        questions
            .iter()
            .filter(|q| !self.contains(q.id()))
            .map(|q| q.id().clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Answer> + '_ {
        self.by_question
            .iter()
            .map(|(q, o)| Answer::new(q.clone(), o.clone()))
    }
}

impl FromIterator<Answer> for AnswerSet {
    fn from_iter<I: IntoIterator<Item = Answer>>(iter: I) -> Self {
        let mut set = Self::new();
        for answer in iter {
            set.record(answer.question_id, answer.option_id);
        }
        set
    }
}
