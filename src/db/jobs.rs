use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use sqlx::{SqliteExecutor, SqlitePool};
use uuid::Uuid;

use crate::models::{Job, JobStatus, NewJob};

/// Insert a new job as pending. Returns the stored row. Takes an executor so
/// callers can enqueue inside a larger transaction.
pub async fn enqueue<'e>(
    executor: impl SqliteExecutor<'e>,
    new: &NewJob,
) -> Result<Job, sqlx::Error> {
    sqlx::query_as::<_, Job>(
        "INSERT INTO jobs (id, queue_name, kind, payload, priority, status, created_at,
                           scheduled_at, retries, max_retries, retry_delay_secs, error_history)
         VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, 0, ?, ?, '[]')
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&new.queue_name)
    .bind(&new.kind)
    .bind(&new.payload)
    .bind(new.priority)
    .bind(Utc::now())
    .bind(new.scheduled_at)
    .bind(new.max_retries)
    .bind(new.retry_delay_secs)
    .fetch_one(executor)
    .await
}

pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Atomically claim the highest-priority eligible job in `queue_name` and
/// lease it to `worker_id` for `lease_secs`. The whole claim is one UPDATE
/// statement, so SQLite's writer lock guarantees at most one claimant per job
/// even with concurrent callers. Returns None when nothing is eligible.
pub async fn claim_next(
    pool: &SqlitePool,
    queue_name: &str,
    worker_id: &str,
    lease_secs: i64,
) -> Result<Option<Job>, sqlx::Error> {
    let now = Utc::now();
    let lease_expires_at = now + Duration::seconds(lease_secs);

    sqlx::query_as::<_, Job>(
        "UPDATE jobs
         SET status = 'processing',
             worker_id = ?,
             started_at = ?,
             lease_expires_at = ?
         WHERE id = (
             SELECT id FROM jobs
             WHERE queue_name = ?
               AND status IN ('pending', 'retrying')
               AND (scheduled_at IS NULL OR scheduled_at <= ?)
             ORDER BY priority DESC, created_at ASC
             LIMIT 1
         )
         RETURNING *",
    )
    .bind(worker_id)
    .bind(now)
    .bind(lease_expires_at)
    .bind(queue_name)
    .bind(now)
    .fetch_optional(pool)
    .await
}

/// Transition processing -> completed, only for the current lease holder.
/// Returns false (no mutation) on ownership or status mismatch, so duplicate
/// completions are harmless.
pub async fn complete(
    pool: &SqlitePool,
    id: Uuid,
    worker_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs
         SET status = 'completed', completed_at = ?, worker_id = NULL, lease_expires_at = NULL
         WHERE id = ? AND status = 'processing' AND worker_id = ?",
    )
    .bind(Utc::now())
    .bind(id)
    .bind(worker_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Record a failed attempt. Retries with linear backoff
/// (retry_delay_secs * attempt number) until max_retries is spent, then the
/// job is dead for good. Returns the resulting status, or None when the
/// caller no longer holds the lease.
pub async fn fail(
    pool: &SqlitePool,
    id: Uuid,
    worker_id: &str,
    error: &str,
) -> Result<Option<JobStatus>, sqlx::Error> {
    let job = sqlx::query_as::<_, Job>(
        "SELECT * FROM jobs WHERE id = ? AND status = 'processing' AND worker_id = ?",
    )
    .bind(id)
    .bind(worker_id)
    .fetch_optional(pool)
    .await?;

    let job = match job {
        Some(job) => job,
        None => return Ok(None),
    };

    let now = Utc::now();
    let attempt = job.retries + 1;

    let mut history = job.error_history.as_array().cloned().unwrap_or_default();
    history.push(json!({ "attempt": attempt, "error": error, "at": now }));
    let history = serde_json::Value::Array(history);

    if job.retries < job.max_retries {
        let scheduled_at = now + Duration::seconds(job.retry_delay_secs * attempt);
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'retrying', retries = ?, scheduled_at = ?,
                 worker_id = NULL, lease_expires_at = NULL,
                 error_message = ?, error_history = ?
             WHERE id = ? AND status = 'processing' AND worker_id = ?",
        )
        .bind(attempt)
        .bind(scheduled_at)
        .bind(error)
        .bind(&history)
        .bind(id)
        .bind(worker_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(Some(JobStatus::Retrying))
        } else {
            Ok(None)
        }
    } else {
        let result = sqlx::query(
            "UPDATE jobs
             SET status = 'dead', completed_at = ?,
                 worker_id = NULL, lease_expires_at = NULL,
                 error_message = ?, error_history = ?
             WHERE id = ? AND status = 'processing' AND worker_id = ?",
        )
        .bind(now)
        .bind(error)
        .bind(&history)
        .bind(id)
        .bind(worker_id)
        .execute(pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(Some(JobStatus::Dead))
        } else {
            Ok(None)
        }
    }
}

/// Return abandoned processing jobs (expired lease, e.g. crashed worker) to
/// pending. Safe to run concurrently with claim_next; the expiry predicate
/// never matches a live lease.
pub async fn reclaim_expired_leases(
    pool: &SqlitePool,
    queue_name: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE jobs
         SET status = 'pending', worker_id = NULL, lease_expires_at = NULL
         WHERE queue_name = ? AND status = 'processing' AND lease_expires_at < ?",
    )
    .bind(queue_name)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
    pub retrying: i64,
    pub dead: i64,
}

pub async fn stats(pool: &SqlitePool, queue_name: &str) -> Result<QueueStats, sqlx::Error> {
    let rows = sqlx::query_as::<_, (JobStatus, i64)>(
        "SELECT status, COUNT(*) FROM jobs WHERE queue_name = ? GROUP BY status",
    )
    .bind(queue_name)
    .fetch_all(pool)
    .await?;

    let mut stats = QueueStats::default();
    for (status, count) in rows {
        match status {
            JobStatus::Pending => stats.pending = count,
            JobStatus::Processing => stats.processing = count,
            JobStatus::Completed => stats.completed = count,
            JobStatus::Failed => stats.failed = count,
            JobStatus::Retrying => stats.retrying = count,
            JobStatus::Dead => stats.dead = count,
        }
    }

    Ok(stats)
}
