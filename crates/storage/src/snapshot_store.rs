//! Typed access to the persisted quiz session.
//!
//! The current layout is one versioned JSON snapshot under [`SNAPSHOT_KEY`].
//! Older registration flows wrote five flat keys instead; those are still read
//! when no snapshot exists and are always removed on save and clear.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use quiz_core::model::{AttemptId, AttemptStatus, Question, StudentSnapshot};
use quiz_core::snapshot::{SessionSnapshot, SnapshotError};
use quiz_core::time::to_epoch_millis;
use tracing::{debug, warn};

use crate::repository::{SessionStore, StorageError};

pub const SNAPSHOT_KEY: &str = "quiz.session";

/// Flat keys written by older registration flows.
pub mod legacy {
    pub const ATTEMPT_ID: &str = "attemptId";
    pub const ATTEMPT_STATUS: &str = "attemptStatus";
    pub const QUESTIONS: &str = "quizQuestions";
    pub const START_TIME: &str = "quizStartTime";
    pub const STUDENT: &str = "studentData";

    pub const ALL: [&str; 5] = [ATTEMPT_ID, ATTEMPT_STATUS, QUESTIONS, START_TIME, STUDENT];
}

impl From<SnapshotError> for StorageError {
    fn from(err: SnapshotError) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn SessionStore>,
}

impl SnapshotStore {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Load the persisted session.
    ///
    /// Returns `Ok(None)` when required data (attempt id, status, questions) is
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` when stored data exists but cannot
    /// be decoded, or other storage errors from the backend.
    pub async fn load(&self) -> Result<Option<SessionSnapshot>, StorageError> {
        if let Some(raw) = self.store.get(SNAPSHOT_KEY).await? {
            return Ok(Some(SessionSnapshot::decode(&raw)?));
        }
        self.load_legacy().await
    }

    async fn load_legacy(&self) -> Result<Option<SessionSnapshot>, StorageError> {
        let Some(attempt_id) = self.store.get(legacy::ATTEMPT_ID).await? else {
            return Ok(None);
        };
        let Some(status) = self.store.get(legacy::ATTEMPT_STATUS).await? else {
            return Ok(None);
        };
        let Some(questions_raw) = self.store.get(legacy::QUESTIONS).await? else {
            return Ok(None);
        };

        let attempt_id = AttemptId::new(attempt_id).map_err(ser)?;
        let questions: Vec<Question> = serde_json::from_str(&questions_raw).map_err(ser)?;

        let mut snapshot = SessionSnapshot::new(attempt_id, questions, None);
        snapshot.attempt_status = AttemptStatus::parse(&status);

        if let Some(raw) = self.store.get(legacy::START_TIME).await? {
            match raw.trim().parse::<i64>() {
                Ok(ms) => snapshot.started_at_ms = Some(ms),
                Err(err) => warn!(%err, "ignoring unparsable start time marker"),
            }
        }
        if let Some(raw) = self.store.get(legacy::STUDENT).await? {
            match serde_json::from_str::<StudentSnapshot>(&raw) {
                Ok(student) => snapshot.student = Some(student),
                Err(err) => warn!(%err, "ignoring unparsable student snapshot"),
            }
        }

        debug!(attempt_id = %snapshot.attempt_id, "loaded session from legacy keys");
        Ok(Some(snapshot))
    }

    /// Persist `snapshot` under the single snapshot key, dropping legacy keys.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if encoding or writing fails.
    pub async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let raw = snapshot.encode()?;
        self.store.set(SNAPSHOT_KEY, &raw).await?;
        for key in legacy::ALL {
            self.store.remove(key).await?;
        }
        Ok(())
    }

    /// Record the start-time marker on the persisted session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if there is no session to update.
    pub async fn set_started_at(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut snapshot = self.load().await?.ok_or(StorageError::NotFound)?;
        snapshot.started_at_ms = Some(to_epoch_millis(at));
        self.save(&snapshot).await
    }

    /// Remove every key associated with the attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if a key cannot be removed.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(SNAPSHOT_KEY).await?;
        for key in legacy::ALL {
            self.store.remove(key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemorySessionStore;
    use quiz_core::model::{AnswerOption, OptionId, QuestionId, StudentId};
    use quiz_core::time::fixed_now;

    fn question(id: &str) -> Question {
        Question::new(
            QuestionId::new(id).unwrap(),
            "Pick",
            vec![AnswerOption::new(OptionId::new("a").unwrap(), "A")],
        )
        .unwrap()
    }

    fn store() -> (InMemorySessionStore, SnapshotStore) {
        let raw = InMemorySessionStore::new();
        let snapshots = SnapshotStore::new(Arc::new(raw.clone()));
        (raw, snapshots)
    }

    #[tokio::test]
    async fn empty_store_loads_nothing() {
        let (_, snapshots) = store();
        assert!(snapshots.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load() {
        let (raw, snapshots) = store();
        let snap = SessionSnapshot::new(AttemptId::new("att-1").unwrap(), vec![question("q1")], None);
        snapshots.save(&snap).await.unwrap();

        assert_eq!(raw.keys().await.unwrap(), vec![SNAPSHOT_KEY.to_string()]);
        assert_eq!(snapshots.load().await.unwrap(), Some(snap));
    }

    #[tokio::test]
    async fn legacy_keys_are_read_and_migrated() {
        let (raw, snapshots) = store();
        let questions = serde_json::to_string(&vec![question("q1"), question("q2")]).unwrap();
        let student = StudentSnapshot::new(StudentId::new("s1").unwrap(), "Grace");
        raw.set(legacy::ATTEMPT_ID, "att-9").await.unwrap();
        raw.set(legacy::ATTEMPT_STATUS, "ACTIVE").await.unwrap();
        raw.set(legacy::QUESTIONS, &questions).await.unwrap();
        raw.set(legacy::START_TIME, "1700000000000").await.unwrap();
        raw.set(legacy::STUDENT, &serde_json::to_string(&student).unwrap())
            .await
            .unwrap();

        let snap = snapshots.load().await.unwrap().unwrap();
        assert_eq!(snap.attempt_id.as_str(), "att-9");
        assert!(snap.attempt_status.is_active());
        assert_eq!(snap.questions.len(), 2);
        assert_eq!(snap.started_at(), Some(fixed_now()));
        assert_eq!(snap.student, Some(student));

        snapshots.set_started_at(fixed_now()).await.unwrap();
        assert_eq!(raw.keys().await.unwrap(), vec![SNAPSHOT_KEY.to_string()]);
    }

    #[tokio::test]
    async fn legacy_without_status_is_absent() {
        let (raw, snapshots) = store();
        raw.set(legacy::ATTEMPT_ID, "att-9").await.unwrap();
        raw.set(legacy::QUESTIONS, "[]").await.unwrap();
        assert!(snapshots.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_serialization_error() {
        let (raw, snapshots) = store();
        raw.set(SNAPSHOT_KEY, "{broken").await.unwrap();
        let err = snapshots.load().await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn set_started_at_requires_a_session() {
        let (_, snapshots) = store();
        let err = snapshots.set_started_at(fixed_now()).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound));
    }

    #[tokio::test]
    async fn clear_removes_every_attempt_key() {
        let (raw, snapshots) = store();
        let snap = SessionSnapshot::new(AttemptId::new("att-1").unwrap(), vec![question("q1")], None);
        snapshots.save(&snap).await.unwrap();
        for key in legacy::ALL {
            raw.set(key, "stale").await.unwrap();
        }
        raw.set("unrelated", "keep").await.unwrap();

        snapshots.clear().await.unwrap();
        assert_eq!(raw.keys().await.unwrap(), vec!["unrelated".to_string()]);
    }
}
