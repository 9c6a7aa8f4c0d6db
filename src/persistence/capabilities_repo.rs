//! Network capabilities repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;

use crate::models::capabilities::NetworkCapabilities;
use crate::network::CapabilitySnapshot;
use crate::{AppError, Result};

use super::db::Database;
use super::session_repo::parse_timestamp;
use super::{CapabilityStore, StoreFuture};

/// Repository for network capability rows.
#[derive(Clone)]
pub struct CapabilitiesRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct CapabilitiesRow {
    id: i64,
    sid: i64,
    capabilities: String,
    downstream: i64,
    upstream: i64,
    strength: i64,
    created_at: String,
}

impl CapabilitiesRow {
    fn into_capabilities(self) -> Result<NetworkCapabilities> {
        let capabilities = serde_json::from_str(&self.capabilities)
            .map_err(|e| AppError::Db(format!("invalid capabilities: {e}")))?;
        Ok(NetworkCapabilities {
            id: self.id,
            session_id: self.sid,
            capabilities,
            downstream_kbps: narrow(self.downstream, "downstream")?,
            upstream_kbps: narrow(self.upstream, "upstream")?,
            signal_strength: narrow(self.strength, "strength")?,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

fn narrow(value: i64, column: &str) -> Result<i32> {
    i32::try_from(value).map_err(|e| AppError::Db(format!("invalid {column}: {e}")))
}

impl CapabilitiesRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a capability row for `session_id` and return its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if serialization or the insert fails.
    pub async fn insert(&self, session_id: i64, snapshot: &CapabilitySnapshot) -> Result<i64> {
        let capabilities = serde_json::to_string(&snapshot.capabilities)
            .map_err(|e| AppError::Db(format!("serialize capabilities: {e}")))?;

        let result = sqlx::query(
            "INSERT INTO network_capabilities
             (sid, capabilities, downstream, upstream, strength, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(session_id)
        .bind(&capabilities)
        .bind(i64::from(snapshot.downstream_kbps))
        .bind(i64::from(snapshot.upstream_kbps))
        .bind(i64::from(snapshot.signal_strength))
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Fetch the most recently written row.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_latest(&self) -> Result<Option<NetworkCapabilities>> {
        self.load_previous(0).await
    }

    /// Fetch the row `n` places before the newest one (`0` is the newest).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_previous(&self, n: u32) -> Result<Option<NetworkCapabilities>> {
        let row: Option<CapabilitiesRow> = sqlx::query_as(
            "SELECT id, sid, capabilities, downstream, upstream, strength, created_at
             FROM network_capabilities ORDER BY id DESC LIMIT 1 OFFSET ?1",
        )
        .bind(i64::from(n))
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(CapabilitiesRow::into_capabilities).transpose()
    }

    /// Count stored rows.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM network_capabilities")
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
        let result = sqlx::query("DELETE FROM network_capabilities WHERE sid <> ?1")
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
            "DELETE FROM network_capabilities WHERE id NOT IN
             (SELECT id FROM network_capabilities ORDER BY id ASC LIMIT 1)",
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
            "DELETE FROM network_capabilities WHERE id NOT IN
             (SELECT id FROM network_capabilities ORDER BY id DESC LIMIT ?1)",
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
        let result = sqlx::query("DELETE FROM network_capabilities")
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}

impl CapabilityStore for CapabilitiesRepo {
    fn write_capabilities(
        &self,
        session_id: i64,
        capabilities: CapabilitySnapshot,
    ) -> StoreFuture<'_, i64> {
        Box::pin(async move { self.insert(session_id, &capabilities).await })
    }

    fn load_latest_capabilities(&self) -> StoreFuture<'_, Option<NetworkCapabilities>> {
        Box::pin(self.load_latest())
    }

    fn trim_capabilities(&self, keep: u32) -> StoreFuture<'_, u64> {
        Box::pin(self.trim(keep))
    }
}
