//! Versioned, single-key representation of a resumable quiz session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AttemptId, AttemptStatus, Question, StudentSnapshot};
use crate::time::{from_epoch_millis, to_epoch_millis};

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Everything needed to rebuild a quiz session after a reload.
///
/// Answers are deliberately absent: they are re-fetched from the backend,
/// which is authoritative for them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub attempt_id: AttemptId,
    pub attempt_status: AttemptStatus,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student: Option<StudentSnapshot>,
}

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl SessionSnapshot {
    /// Snapshot of a freshly created, not yet started attempt.
    #[must_use]
    pub fn new(
        attempt_id: AttemptId,
        questions: Vec<Question>,
        student: Option<StudentSnapshot>,
    ) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            attempt_id,
            attempt_status: AttemptStatus::Active,
            questions,
            started_at_ms: None,
            student,
        }
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at_ms.and_then(from_epoch_millis)
    }

    pub fn set_started_at(&mut self, at: DateTime<Utc>) {
        self.started_at_ms = Some(to_epoch_millis(at));
    }

    /// # Errors
    ///
    /// Returns `SnapshotError::Malformed` if serialization fails.
    pub fn encode(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode a stored snapshot, checking the schema version first.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError::UnsupportedVersion` for other schema versions and
    /// `SnapshotError::Malformed` for anything that does not parse.
    pub fn decode(raw: &str) -> Result<Self, SnapshotError> {
        let probe: VersionProbe = serde_json::from_str(raw)?;
        if probe.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(probe.version));
        }
        Ok(serde_json::from_str(raw)?)
    }
}
