//! Network state repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::network_state::{NetworkState, NetworkStateSnapshot};
use crate::Result;

use super::db::Database;
use super::session_repo::parse_timestamp;
use super::{NetworkStateStore, StoreFuture};

/// Repository for network state rows.
#[derive(Clone)]
pub struct NetworkStateRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct NetworkStateRow {
    id: i64,
    sid: i64,
    is_connected: i64,
    has_internet: i64,
    has_wifi: i64,
    has_mobile: i64,
    is_externally_disconnected: i64,
    created_at: String,
}

impl NetworkStateRow {
    fn into_state(self) -> Result<NetworkState> {
        Ok(NetworkState {
            id: self.id,
            session_id: self.sid,
            is_connected: self.is_connected != 0,
            has_internet: self.has_internet != 0,
            has_wifi: self.has_wifi != 0,
            has_mobile: self.has_mobile != 0,
            is_externally_disconnected: self.is_externally_disconnected != 0,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT id, sid, is_connected, has_internet, has_wifi, has_mobile,
     is_externally_disconnected, created_at FROM network_state";

impl NetworkStateRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a state row and return its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn insert(&self, state: NetworkStateSnapshot) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO network_state
             (sid, is_connected, has_internet, has_wifi, has_mobile,
              is_externally_disconnected, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )
        .bind(state.session_id)
        .bind(i64::from(state.is_connected))
        .bind(i64::from(state.has_internet))
        .bind(i64::from(state.has_wifi))
        .bind(i64::from(state.has_mobile))
        .bind(i64::from(state.is_externally_disconnected()))
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Fetch the most recently written state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_latest(&self) -> Result<Option<NetworkState>> {
        self.load_previous(0).await
    }

    /// Fetch the row `n` places before the newest one (`0` is the newest).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_previous(&self, n: u32) -> Result<Option<NetworkState>> {
        let row: Option<NetworkStateRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT 1 OFFSET ?1"))
                .bind(i64::from(n))
                .fetch_optional(self.db.as_ref())
                .await?;
        row.map(NetworkStateRow::into_state).transpose()
    }

    /// All rows written for `session_id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_session(&self, session_id: i64) -> Result<Vec<NetworkState>> {
        let rows: Vec<NetworkStateRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE sid = ?1 ORDER BY id ASC"))
                .bind(session_id)
                .fetch_all(self.db.as_ref())
                .await?;
        rows.into_iter().map(NetworkStateRow::into_state).collect()
    }

    /// Count stored rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM network_state")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Delete every row not written for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn clean(&self, session_id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM network_state WHERE sid <> ?1")
            .bind(session_id)
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every row except the oldest one. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn pop(&self) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM network_state WHERE id NOT IN
             (SELECT id FROM network_state ORDER BY id ASC LIMIT 1)",
        )
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    /// Keep only the newest `keep` rows. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn trim(&self, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM network_state WHERE id NOT IN
             (SELECT id FROM network_state ORDER BY id DESC LIMIT ?1)",
        )
        .bind(i64::from(keep))
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete every row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn drop_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM network_state")
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}

impl NetworkStateStore for NetworkStateRepo {
    fn write_state(&self, state: NetworkStateSnapshot) -> StoreFuture<'_, i64> {
        Box::pin(self.insert(state))
    }

    fn load_latest_state(&self) -> StoreFuture<'_, Option<NetworkState>> {
        Box::pin(self.load_latest())
    }

    fn trim_states(&self, keep: u32) -> StoreFuture<'_, u64> {
        Box::pin(self.trim(keep))
    }
}
