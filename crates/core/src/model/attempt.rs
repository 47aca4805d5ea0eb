use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{AttemptId, StudentId};

/// Lifecycle status of an attempt as reported by the backend.
///
/// Parsing is case-insensitive; anything other than `active` or `submitted`
/// is preserved verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AttemptStatus {
    Active,
    Submitted,
    Other(String),
}

impl AttemptStatus {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("active") {
            Self::Active
        } else if trimmed.eq_ignore_ascii_case("submitted") {
            Self::Submitted
        } else {
            Self::Other(trimmed.to_owned())
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Active => "active",
            Self::Submitted => "submitted",
            Self::Other(raw) => raw,
        }
    }
}

impl From<String> for AttemptStatus {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<AttemptStatus> for String {
    fn from(status: AttemptStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored outcome of a submitted attempt. Correctness is computed by the
/// backend only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptResult {
    pub attempt_id: AttemptId,
    pub student_id: Option<StudentId>,
    pub status: AttemptStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_count: u32,
    pub correct_count: u32,
    pub score: f64,
}

impl AttemptResult {
    /// Wall-clock duration between start and finish as reported by the backend.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        (self.finished_at - self.started_at).max(chrono::Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(AttemptStatus::parse("ACTIVE"), AttemptStatus::Active);
        assert_eq!(AttemptStatus::parse(" Active "), AttemptStatus::Active);
        assert_eq!(AttemptStatus::parse("submitted"), AttemptStatus::Submitted);
        assert_eq!(
            AttemptStatus::parse("expired"),
            AttemptStatus::Other("expired".into())
        );
        assert!(!AttemptStatus::parse("expired").is_active());
    }

    #[test]
    fn status_serializes_as_lowercase_string() {
        let json = serde_json::to_string(&AttemptStatus::Active).unwrap();
        assert_eq!(json, "\"active\"");
        let back: AttemptStatus = serde_json::from_str("\"SUBMITTED\"").unwrap();
        assert_eq!(back, AttemptStatus::Submitted);
    }
}
