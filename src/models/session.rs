//! Application runtime session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One process run of the application, persisted at bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Store-assigned identifier.
    pub id: i64,
    /// When the application process started.
    pub started_at: DateTime<Utc>,
    /// When the record was written.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Session known only by its identifier and start time.
    #[must_use]
    pub fn new(id: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at,
            created_at: Utc::now(),
        }
    }
}
