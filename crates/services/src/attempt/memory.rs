use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use quiz_core::Clock;
use quiz_core::model::{
    AttemptId, AttemptResult, AttemptStatus, OptionId, Question, QuestionId, StudentSnapshot,
};

use super::{AttemptService, CreatedAttempt, HistoryEntry};
use crate::error::AttemptApiError;

/// The four attempt service operations, used for call logs and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Create,
    History,
    Update,
    Submit,
}

/// One recorded call against `InMemoryAttemptService`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptCall {
    Create,
    History(AttemptId),
    Update(AttemptId, QuestionId, OptionId),
    Submit(AttemptId),
}

impl AttemptCall {
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Create => Operation::Create,
            Self::History(_) => Operation::History,
            Self::Update(..) => Operation::Update,
            Self::Submit(_) => Operation::Submit,
        }
    }
}

struct StoredAttempt {
    student: StudentSnapshot,
    answers: HashMap<QuestionId, OptionId>,
    started_at: chrono::DateTime<chrono::Utc>,
    result: Option<AttemptResult>,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    attempts: HashMap<AttemptId, StoredAttempt>,
    calls: Vec<AttemptCall>,
    failures: HashMap<Operation, u32>,
}

/// Attempt backend held in process memory.
///
/// Scores against an answer key, records every call, and can be told to fail
/// the next N calls of an operation. Useful for tests and offline runs.
#[derive(Clone)]
pub struct InMemoryAttemptService {
    questions: Arc<Vec<Question>>,
    answer_key: Arc<HashMap<QuestionId, OptionId>>,
    clock: Clock,
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryAttemptService {
    /// Build a backend serving `questions`, scored by the paired correct option.
    #[must_use]
    pub fn new(questions: Vec<(Question, OptionId)>, clock: Clock) -> Self {
        let answer_key = questions
            .iter()
            .map(|(q, correct)| (q.id().clone(), correct.clone()))
            .collect();
        let questions = questions.into_iter().map(|(q, _)| q).collect();
        Self {
            questions: Arc::new(questions),
            answer_key: Arc::new(answer_key),
            clock,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, AttemptApiError> {
        self.inner
            .lock()
            .map_err(|e| AttemptApiError::Unreachable(e.to_string()))
    }

    /// Make the next `times` calls of `operation` fail as if the network dropped.
    pub fn fail_next(&self, operation: Operation, times: u32) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failures.insert(operation, times);
        }
    }

    /// Every call received so far, in arrival order.
    #[must_use]
    pub fn calls(&self) -> Vec<AttemptCall> {
        self.inner
            .lock()
            .map(|inner| inner.calls.clone())
            .unwrap_or_default()
    }

    /// Calls of a single operation, in arrival order.
    #[must_use]
    pub fn calls_of(&self, operation: Operation) -> Vec<AttemptCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation() == operation)
            .collect()
    }

    /// Seed an attempt directly, as if created by an earlier process.
    pub fn insert_attempt(&self, attempt_id: AttemptId, student: StudentSnapshot) {
        if let Ok(mut inner) = self.inner.lock() {
            let started_at = self.clock.now();
            inner.attempts.insert(
                attempt_id,
                StoredAttempt {
                    student,
                    answers: HashMap::new(),
                    started_at,
                    result: None,
                },
            );
        }
    }

    /// The backend's recorded selection for a question.
    #[must_use]
    pub fn recorded_answer(&self, attempt_id: &AttemptId, question_id: &QuestionId) -> Option<OptionId> {
        let inner = self.inner.lock().ok()?;
        inner
            .attempts
            .get(attempt_id)
            .and_then(|a| a.answers.get(question_id).cloned())
    }

    /// Log the call and consume an injected failure if one is pending.
    fn record(&self, call: AttemptCall) -> Result<MutexGuard<'_, Inner>, AttemptApiError> {
        let mut inner = self.lock()?;
        let operation = call.operation();
        inner.calls.push(call);
        if let Some(remaining) = inner.failures.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AttemptApiError::Unreachable(format!(
                    "injected {operation:?} failure"
                )));
            }
        }
        Ok(inner)
    }
}

fn not_found() -> AttemptApiError {
    AttemptApiError::HttpStatus(StatusCode::NOT_FOUND)
}

#[async_trait]
impl AttemptService for InMemoryAttemptService {
    async fn create_attempt(
        &self,
        student: &StudentSnapshot,
    ) -> Result<CreatedAttempt, AttemptApiError> {
        let mut inner = self.record(AttemptCall::Create)?;
        inner.next_id += 1;
        let attempt_id = AttemptId::new(format!("attempt-{}", inner.next_id))
            .map_err(|e| AttemptApiError::InvalidData(e.into()))?;
        inner.attempts.insert(
            attempt_id.clone(),
            StoredAttempt {
                student: student.clone(),
                answers: HashMap::new(),
                started_at: self.clock.now(),
                result: None,
            },
        );
        Ok(CreatedAttempt {
            attempt_id,
            questions: self.questions.as_ref().clone(),
        })
    }

    async fn answer_history(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<Vec<HistoryEntry>, AttemptApiError> {
        let inner = self.record(AttemptCall::History(attempt_id.clone()))?;
        let attempt = inner.attempts.get(attempt_id).ok_or_else(not_found)?;
        Ok(self
            .questions
            .iter()
            .map(|q| HistoryEntry {
                question_id: q.id().clone(),
                option_id: attempt.answers.get(q.id()).cloned(),
            })
            .collect())
    }

    async fn update_answer(
        &self,
        attempt_id: &AttemptId,
        question_id: &QuestionId,
        option_id: &OptionId,
    ) -> Result<(), AttemptApiError> {
        let mut inner = self.record(AttemptCall::Update(
            attempt_id.clone(),
            question_id.clone(),
            option_id.clone(),
        ))?;
        let known = self
            .questions
            .iter()
            .any(|q| q.id() == question_id && q.has_option(option_id));
        if !known {
            return Err(AttemptApiError::HttpStatus(StatusCode::UNPROCESSABLE_ENTITY));
        }
        let attempt = inner.attempts.get_mut(attempt_id).ok_or_else(not_found)?;
        if attempt.result.is_some() {
            return Err(AttemptApiError::HttpStatus(StatusCode::CONFLICT));
        }
        attempt
            .answers
            .insert(question_id.clone(), option_id.clone());
        Ok(())
    }

    async fn submit_attempt(
        &self,
        attempt_id: &AttemptId,
    ) -> Result<AttemptResult, AttemptApiError> {
        let mut inner = self.record(AttemptCall::Submit(attempt_id.clone()))?;
        let now = self.clock.now();
        let attempt = inner.attempts.get_mut(attempt_id).ok_or_else(not_found)?;
        if let Some(result) = &attempt.result {
            return Ok(result.clone());
        }

        let total_count = u32::try_from(self.questions.len()).unwrap_or(u32::MAX);
        let correct_count = u32::try_from(
            self.answer_key
                .iter()
                .filter(|(q, correct)| attempt.answers.get(*q) == Some(*correct))
                .count(),
        )
        .unwrap_or(u32::MAX);
        let score = if total_count == 0 {
            0.0
        } else {
            f64::from(correct_count) * 100.0 / f64::from(total_count)
        };

        let result = AttemptResult {
            attempt_id: attempt_id.clone(),
            student_id: Some(attempt.student.id.clone()),
            status: AttemptStatus::Submitted,
            started_at: attempt.started_at,
            finished_at: now,
            total_count,
            correct_count,
            score,
        };
        attempt.result = Some(result.clone());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{AnswerOption, StudentId};
    use quiz_core::time::fixed_clock;

    fn backend() -> InMemoryAttemptService {
        let questions = (1..=2)
            .map(|i| {
                let q = Question::new(
                    QuestionId::new(format!("q{i}")).unwrap(),
                    format!("Question {i}"),
                    vec![
                        AnswerOption::new(OptionId::new("a").unwrap(), "A"),
                        AnswerOption::new(OptionId::new("b").unwrap(), "B"),
                    ],
                )
                .unwrap();
                (q, OptionId::new("a").unwrap())
            })
            .collect();
        InMemoryAttemptService::new(questions, fixed_clock())
    }

    fn student() -> StudentSnapshot {
        StudentSnapshot::new(StudentId::new("s1").unwrap(), "Ada")
    }

    #[tokio::test]
    async fn scores_last_written_answers() {
        let svc = backend();
        let created = svc.create_attempt(&student()).await.unwrap();
        let id = created.attempt_id;
        let q1 = QuestionId::new("q1").unwrap();
        let q2 = QuestionId::new("q2").unwrap();

        svc.update_answer(&id, &q1, &OptionId::new("b").unwrap()).await.unwrap();
        svc.update_answer(&id, &q1, &OptionId::new("a").unwrap()).await.unwrap();
        svc.update_answer(&id, &q2, &OptionId::new("b").unwrap()).await.unwrap();

        let result = svc.submit_attempt(&id).await.unwrap();
        assert_eq!(result.total_count, 2);
        assert_eq!(result.correct_count, 1);
        assert!((result.score - 50.0).abs() < f64::EPSILON);

        let again = svc.submit_attempt(&id).await.unwrap();
        assert_eq!(again, result);

        let err = svc
            .update_answer(&id, &q2, &OptionId::new("a").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, AttemptApiError::HttpStatus(StatusCode::CONFLICT)));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let svc = backend();
        svc.fail_next(Operation::Create, 1);
        assert!(svc.create_attempt(&student()).await.is_err());
        assert!(svc.create_attempt(&student()).await.is_ok());
        assert_eq!(svc.calls_of(Operation::Create).len(), 2);
    }

    #[tokio::test]
    async fn history_reports_unanswered_as_none() {
        let svc = backend();
        let id = svc.create_attempt(&student()).await.unwrap().attempt_id;
        svc.update_answer(&id, &QuestionId::new("q2").unwrap(), &OptionId::new("b").unwrap())
            .await
            .unwrap();
        let history = svc.answer_history(&id).await.unwrap();
        assert_eq!(history[0].option_id, None);
        assert_eq!(history[1].option_id, Some(OptionId::new("b").unwrap()));

        let missing = svc.answer_history(&AttemptId::new("nope").unwrap()).await;
        assert!(matches!(
            missing,
            Err(AttemptApiError::HttpStatus(StatusCode::NOT_FOUND))
        ));
    }
}
