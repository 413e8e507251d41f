use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unit of queued work. Mutated only through the job store operations;
/// while `status` is Processing, `worker_id` and `lease_expires_at` are set,
/// otherwise both are null.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub queue_name: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub retries: i64,
    pub max_retries: i64,
    pub retry_delay_secs: i64,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    /// JSON array of `{attempt, error, at}` entries, one per failed attempt.
    pub error_history: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
    Dead,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retrying => "retrying",
            JobStatus::Dead => "dead",
        };
        write!(f, "{s}")
    }
}

/// Service-order tier. Stored as an integer so the claim query can sort on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, sqlx::Type, Serialize, Deserialize,
)]
#[repr(i32)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    Normal = 1,
    High = 2,
    Urgent = 3,
    Emergency = 4,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Input for `db::jobs::enqueue`. Server-assigned fields (id, status,
/// created_at) are filled at insert time.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub queue_name: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    pub max_retries: i64,
    pub retry_delay_secs: i64,
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(queue_name: &str, kind: &str, payload: serde_json::Value) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            kind: kind.to_string(),
            payload,
            priority: Priority::Normal,
            max_retries: 3,
            retry_delay_secs: 30,
            scheduled_at: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn max_retries(mut self, max_retries: i64) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn retry_delay_secs(mut self, secs: i64) -> Self {
        self.retry_delay_secs = secs;
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }
}
