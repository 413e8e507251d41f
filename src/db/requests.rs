use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::models::{AgentRequest, NewRequest, RiskTier};

pub async fn insert(
    pool: &SqlitePool,
    new: &NewRequest,
    risk_tier: RiskTier,
    auto_approved: bool,
) -> Result<AgentRequest, sqlx::Error> {
    sqlx::query_as::<_, AgentRequest>(
        "INSERT INTO agent_requests
             (id, agent_id, session_id, command, description, priority,
              risk_tier, status, auto_approved, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, 'pending', ?, ?)
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&new.agent_id)
    .bind(&new.session_id)
    .bind(&new.command)
    .bind(&new.description)
    .bind(new.priority)
    .bind(risk_tier)
    .bind(auto_approved)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(
    pool: &SqlitePool,
    id: Uuid,
) -> Result<Option<AgentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AgentRequest>("SELECT * FROM agent_requests WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_pending(
    pool: &SqlitePool,
    limit: i64,
) -> Result<Vec<AgentRequest>, sqlx::Error> {
    sqlx::query_as::<_, AgentRequest>(
        "SELECT * FROM agent_requests WHERE status = 'pending'
         ORDER BY priority DESC, created_at ASC
         LIMIT ?",
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

/// Pending -> Approved. The status guard makes approval single-shot: a second
/// call affects zero rows and reports false. Takes an executor because the
/// approval hop commits in one transaction with the job enqueue.
pub async fn mark_approved<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
    notes: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE agent_requests
         SET status = 'approved', approved_at = ?, supervisor_notes = COALESCE(?, supervisor_notes)
         WHERE id = ? AND status = 'pending'",
    )
    .bind(Utc::now())
    .bind(notes)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Approved -> Processing, once the execution job is in the queue.
pub async fn mark_processing<'e>(
    executor: impl SqliteExecutor<'e>,
    id: Uuid,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE agent_requests
         SET status = 'processing', started_at = ?
         WHERE id = ? AND status = 'approved'",
    )
    .bind(Utc::now())
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Pending -> Rejected.
pub async fn mark_rejected(
    pool: &SqlitePool,
    id: Uuid,
    reason: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE agent_requests
         SET status = 'rejected', supervisor_notes = ?, completed_at = ?
         WHERE id = ? AND status = 'pending'",
    )
    .bind(reason)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Processing -> Completed. A request the timeout sweep already failed stays
/// failed; the guard reports that as false.
pub async fn mark_completed(
    pool: &SqlitePool,
    id: Uuid,
    result_text: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE agent_requests
         SET status = 'completed', result = ?, completed_at = ?
         WHERE id = ? AND status = 'processing'",
    )
    .bind(result_text)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Processing -> Failed.
pub async fn mark_failed(
    pool: &SqlitePool,
    id: Uuid,
    error: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE agent_requests
         SET status = 'failed', error = ?, completed_at = ?
         WHERE id = ? AND status = 'processing'",
    )
    .bind(error)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Fail every processing request whose `started_at` predates `cutoff`.
/// Returns (id, session_id) per swept request so the caller can notify.
pub async fn sweep_timed_out(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    error: &str,
) -> Result<Vec<(Uuid, String)>, sqlx::Error> {
    sqlx::query_as::<_, (Uuid, String)>(
        "UPDATE agent_requests
         SET status = 'failed', error = ?, completed_at = ?
         WHERE status = 'processing' AND started_at < ?
         RETURNING id, session_id",
    )
    .bind(error)
    .bind(Utc::now())
    .bind(cutoff)
    .fetch_all(pool)
    .await
}

/// Drop terminal requests beyond the newest `keep`, bounding history growth.
pub async fn purge_history(pool: &SqlitePool, keep: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM agent_requests
         WHERE status IN ('completed', 'failed', 'rejected')
           AND id NOT IN (
               SELECT id FROM agent_requests
               WHERE status IN ('completed', 'failed', 'rejected')
               ORDER BY created_at DESC
               LIMIT ?
           )",
    )
    .bind(keep)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RequestStats {
    pub pending: i64,
    pub approved: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub rejected: i64,
}

pub async fn stats(pool: &SqlitePool) -> Result<RequestStats, sqlx::Error> {
    let rows = sqlx::query_as::<_, (crate::models::RequestStatus, i64)>(
        "SELECT status, COUNT(*) FROM agent_requests GROUP BY status",
    )
    .fetch_all(pool)
    .await?;

    use crate::models::RequestStatus;
    let mut stats = RequestStats::default();
    for (status, count) in rows {
        match status {
            RequestStatus::Pending => stats.pending = count,
            RequestStatus::Approved => stats.approved = count,
            RequestStatus::Processing => stats.processing = count,
            RequestStatus::Completed => stats.completed = count,
            RequestStatus::Failed => stats.failed = count,
            RequestStatus::Rejected => stats.rejected = count,
        }
    }

    Ok(stats)
}
