use serde::{Deserialize, Serialize};

use crate::model::ids::StudentId;

/// Identity captured at registration and carried alongside the attempt.
///
/// The quiz session only passes it through; it never edits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentSnapshot {
    pub id: StudentId,
    pub full_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl StudentSnapshot {
    #[must_use]
    pub fn new(id: StudentId, full_name: impl Into<String>) -> Self {
        Self {
            id,
            full_name: full_name.into(),
            email: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}
