pub mod jobs;
pub mod requests;

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Open the store. WAL keeps readers off the writer's back; the busy timeout
/// absorbs transient writer contention so claim callers never see lock errors.
pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
}

/// Idempotent schema bootstrap, run once at startup.
pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS jobs (
             id               BLOB PRIMARY KEY,
             queue_name       TEXT NOT NULL,
             kind             TEXT NOT NULL,
             payload          TEXT NOT NULL,
             priority         INTEGER NOT NULL DEFAULT 1,
             status           TEXT NOT NULL DEFAULT 'pending',
             created_at       TEXT NOT NULL,
             scheduled_at     TEXT,
             started_at       TEXT,
             completed_at     TEXT,
             retries          INTEGER NOT NULL DEFAULT 0,
             max_retries      INTEGER NOT NULL DEFAULT 3,
             retry_delay_secs INTEGER NOT NULL DEFAULT 30,
             worker_id        TEXT,
             lease_expires_at TEXT,
             error_message    TEXT,
             error_history    TEXT NOT NULL DEFAULT '[]'
         )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_jobs_claim
         ON jobs (queue_name, status, priority DESC, created_at ASC)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS agent_requests (
             id               BLOB PRIMARY KEY,
             agent_id         TEXT NOT NULL,
             session_id       TEXT NOT NULL,
             command          TEXT NOT NULL,
             description      TEXT NOT NULL DEFAULT '',
             priority         INTEGER NOT NULL DEFAULT 1,
             risk_tier        TEXT NOT NULL,
             status           TEXT NOT NULL DEFAULT 'pending',
             auto_approved    INTEGER NOT NULL DEFAULT 0,
             created_at       TEXT NOT NULL,
             approved_at      TEXT,
             started_at       TEXT,
             completed_at     TEXT,
             result           TEXT,
             error            TEXT,
             supervisor_notes TEXT
         )",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_requests_status
         ON agent_requests (status, created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
