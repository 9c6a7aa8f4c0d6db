//! Session repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use crate::models::session::Session;
use crate::{AppError, Result};

use super::db::Database;
use super::{SessionStore, StoreFuture};

/// Repository for application session records.
#[derive(Clone)]
pub struct SessionRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct SessionRow {
    id: i64,
    app_time: i64,
    created_at: String,
}

impl SessionRow {
    fn into_session(self) -> Result<Session> {
        let started_at = Utc
            .timestamp_millis_opt(self.app_time)
            .single()
            .ok_or_else(|| AppError::Db(format!("invalid app_time: {}", self.app_time)))?;
        Ok(Session {
            id: self.id,
            started_at,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub(super) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .map_err(|e| AppError::Db(format!("invalid created_at: {e}")))?
        .with_timezone(&Utc))
}

impl SessionRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Append a session started at `started_at` and return its id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the insert fails.
    pub async fn create(&self, started_at: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query("INSERT INTO session (app_time, created_at) VALUES (?1, ?2)")
            .bind(started_at.timestamp_millis())
            .bind(Utc::now().to_rfc3339())
            .execute(self.db.as_ref())
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Fetch the most recently created session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_latest(&self) -> Result<Option<Session>> {
        self.load_previous(0).await
    }

    /// Fetch the session `n` places before the newest one (`0` is the newest).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_previous(&self, n: u32) -> Result<Option<Session>> {
        let row: Option<SessionRow> = sqlx::query_as(
            "SELECT id, app_time, created_at FROM session
             ORDER BY id DESC LIMIT 1 OFFSET ?1",
        )
        .bind(i64::from(n))
        .fetch_optional(self.db.as_ref())
        .await?;
        row.map(SessionRow::into_session).transpose()
    }

    /// Fetch a session by id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no session has that id, or
    /// `AppError::Db` if the query fails.
    pub async fn get(&self, id: i64) -> Result<Session> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT id, app_time, created_at FROM session WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;
        row.ok_or_else(|| AppError::NotFound(format!("session {id} not found")))?
            .into_session()
    }

    /// Count stored sessions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM session")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Keep only the newest `keep` sessions. Returns the number deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn trim(&self, keep: u32) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM session WHERE id NOT IN
             (SELECT id FROM session ORDER BY id DESC LIMIT ?1)",
        )
        .bind(i64::from(keep))
        .execute(self.db.as_ref())
        .await?;
        Ok(result.rows_affected())
    }

    /// Delete every session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn drop_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM session")
            .execute(self.db.as_ref())
            .await?;
        Ok(result.rows_affected())
    }
}

impl SessionStore for SessionRepo {
    fn create_session(&self, started_at: DateTime<Utc>) -> StoreFuture<'_, i64> {
        Box::pin(self.create(started_at))
    }

    fn load_latest_session(&self) -> StoreFuture<'_, Option<Session>> {
        Box::pin(self.load_latest())
    }

    fn trim_sessions(&self, keep: u32) -> StoreFuture<'_, u64> {
        Box::pin(self.trim(keep))
    }
}
