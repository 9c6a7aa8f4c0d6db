//! Persisted network capability rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network capability row as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NetworkCapabilities {
    /// Row identifier, increasing with insertion order.
    pub id: i64,
    /// Session the capabilities were observed in.
    pub session_id: i64,
    /// Advertised capability codes.
    pub capabilities: Vec<i32>,
    /// Estimated downstream bandwidth.
    pub downstream_kbps: i32,
    /// Estimated upstream bandwidth.
    pub upstream_kbps: i32,
    /// Signal strength.
    pub signal_strength: i32,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}
