//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so this is safe
//! to run on every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS session (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    app_time        INTEGER NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS network_state (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    sid             INTEGER NOT NULL,
    is_connected    INTEGER NOT NULL,
    has_internet    INTEGER NOT NULL,
    has_wifi        INTEGER NOT NULL,
    has_mobile      INTEGER NOT NULL,
    is_externally_disconnected INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS network_capabilities (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    sid             INTEGER NOT NULL,
    capabilities    TEXT NOT NULL,
    downstream      INTEGER NOT NULL,
    upstream        INTEGER NOT NULL,
    strength        INTEGER NOT NULL,
    created_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_network_state_sid ON network_state(sid);
CREATE INDEX IF NOT EXISTS idx_network_capabilities_sid ON network_capabilities(sid);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
