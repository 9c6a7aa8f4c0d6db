//! Persisted network state rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Network state to append for a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NetworkStateSnapshot {
    /// Session the state was observed in.
    pub session_id: i64,
    /// Local connectivity.
    pub is_connected: bool,
    /// Local connectivity and external reachability.
    pub has_internet: bool,
    /// Wi-Fi transport present.
    pub has_wifi: bool,
    /// Mobile transport present.
    pub has_mobile: bool,
}

impl NetworkStateSnapshot {
    /// Connected locally but the outside world did not answer.
    #[must_use]
    pub fn is_externally_disconnected(&self) -> bool {
        self.is_connected && !self.has_internet
    }
}

/// Network state row as stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NetworkState {
    /// Row identifier, increasing with insertion order.
    pub id: i64,
    /// Session the state was observed in.
    pub session_id: i64,
    /// Local connectivity.
    pub is_connected: bool,
    /// Local connectivity and external reachability.
    pub has_internet: bool,
    /// Wi-Fi transport present.
    pub has_wifi: bool,
    /// Mobile transport present.
    pub has_mobile: bool,
    /// Connected locally but not reachable from outside.
    pub is_externally_disconnected: bool,
    /// Insertion time.
    pub created_at: DateTime<Utc>,
}
