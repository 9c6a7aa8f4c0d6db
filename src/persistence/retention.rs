//! History trimming for the append-only connectivity logs.
//!
//! Each store keeps only its newest rows. Trimming is best effort: a failure
//! in one store is logged and the others are still trimmed.

use tracing::{info, warn};

use super::{CapabilityStore, NetworkStateStore, SessionStore};

/// Number of rows each store keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Sessions kept.
    pub sessions: u32,
    /// Network state rows kept.
    pub network_states: u32,
    /// Network capability rows kept.
    pub network_capabilities: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            sessions: 3,
            network_states: 30,
            network_capabilities: 30,
        }
    }
}

/// Rows deleted per store by one [`trim`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimReport {
    /// Sessions deleted.
    pub sessions: u64,
    /// Network state rows deleted.
    pub network_states: u64,
    /// Network capability rows deleted.
    pub network_capabilities: u64,
}

/// Trim all three stores to `policy`.
pub async fn trim(
    sessions: &dyn SessionStore,
    states: &dyn NetworkStateStore,
    capabilities: &dyn CapabilityStore,
    policy: RetentionPolicy,
) -> TrimReport {
    let mut report = TrimReport::default();

    match sessions.trim_sessions(policy.sessions).await {
        Ok(deleted) => report.sessions = deleted,
        Err(err) => warn!(%err, "session trim failed"),
    }
    match states.trim_states(policy.network_states).await {
        Ok(deleted) => report.network_states = deleted,
        Err(err) => warn!(%err, "network state trim failed"),
    }
    match capabilities
        .trim_capabilities(policy.network_capabilities)
        .await
    {
        Ok(deleted) => report.network_capabilities = deleted,
        Err(err) => warn!(%err, "network capabilities trim failed"),
    }

    info!(
        sessions = report.sessions,
        network_states = report.network_states,
        network_capabilities = report.network_capabilities,
        "retention trim completed"
    );
    report
}
