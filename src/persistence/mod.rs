//! Persistence layer: storage collaborators consumed by the bootstrap
//! orchestrator and their `SQLite` implementations.

pub mod capabilities_repo;
pub mod db;
pub mod network_state_repo;
pub mod retention;
pub mod schema;
pub mod session_repo;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::models::capabilities::NetworkCapabilities;
use crate::models::network_state::{NetworkState, NetworkStateSnapshot};
use crate::models::session::Session;
use crate::network::CapabilitySnapshot;
use crate::Result;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;

/// Boxed future returned by store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Append-only log of application sessions.
pub trait SessionStore: Send + Sync {
    /// Append a session and return its identifier.
    fn create_session(&self, started_at: DateTime<Utc>) -> StoreFuture<'_, i64>;
    /// Most recently created session.
    fn load_latest_session(&self) -> StoreFuture<'_, Option<Session>>;
    /// Keep the newest `keep` sessions; returns the number deleted.
    fn trim_sessions(&self, keep: u32) -> StoreFuture<'_, u64>;
}

/// Append-only log of network states.
pub trait NetworkStateStore: Send + Sync {
    /// Append a state row and return its identifier.
    fn write_state(&self, state: NetworkStateSnapshot) -> StoreFuture<'_, i64>;
    /// Most recently written state.
    fn load_latest_state(&self) -> StoreFuture<'_, Option<NetworkState>>;
    /// Keep the newest `keep` rows; returns the number deleted.
    fn trim_states(&self, keep: u32) -> StoreFuture<'_, u64>;
}

/// Append-only log of network capability snapshots.
pub trait CapabilityStore: Send + Sync {
    /// Append a capability row for `session_id` and return its identifier.
    fn write_capabilities(
        &self,
        session_id: i64,
        capabilities: CapabilitySnapshot,
    ) -> StoreFuture<'_, i64>;
    /// Most recently written capabilities.
    fn load_latest_capabilities(&self) -> StoreFuture<'_, Option<NetworkCapabilities>>;
    /// Keep the newest `keep` rows; returns the number deleted.
    fn trim_capabilities(&self, keep: u32) -> StoreFuture<'_, u64>;
}
