use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::db::jobs::QueueStats;
use crate::db::requests::RequestStats;
use crate::error::AppError;
use crate::models::{AgentRequest, Job, NewJob, NewRequest, RiskTier};
use crate::risk::{RiskAssessor, SafePatterns};
use crate::state::SharedState;
use crate::worker::JobObserver;

pub const EXECUTION_QUEUE: &str = "execution";
pub const NOTIFICATION_QUEUE: &str = "notifications";

/// Owns the AgentRequest lifecycle: submission, approval, rejection,
/// completion callbacks from the worker pool, and the timeout sweep. The only
/// component that mutates request rows.
pub struct RequestManager {
    state: SharedState,
    assessor: RiskAssessor,
    safe: SafePatterns,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub requests: RequestStats,
    pub execution: QueueStats,
    pub notifications: QueueStats,
}

impl RequestManager {
    pub fn new(state: SharedState) -> Result<Self, AppError> {
        let assessor = RiskAssessor::new(
            &state.config.critical_patterns,
            &state.config.high_patterns,
            &state.config.low_patterns,
        )
        .map_err(|e| AppError::Validation(format!("Invalid risk pattern: {e}")))?;

        let safe = SafePatterns::new(&state.config.safe_patterns)
            .map_err(|e| AppError::Validation(format!("Invalid safe pattern: {e}")))?;

        Ok(Self {
            state,
            assessor,
            safe,
        })
    }

    fn config(&self) -> &Config {
        &self.state.config
    }

    /// Create a request in pending, score its risk, and auto-approve it when
    /// policy allows. Returns the stored request (post-approval when
    /// auto-approved).
    pub async fn submit(&self, new: NewRequest) -> Result<AgentRequest, AppError> {
        if new.agent_id.trim().is_empty() {
            return Err(AppError::Validation("agent_id must not be empty".into()));
        }
        if new.session_id.trim().is_empty() {
            return Err(AppError::Validation("session_id must not be empty".into()));
        }
        if new.command.trim().is_empty() {
            return Err(AppError::Validation("command must not be empty".into()));
        }

        let risk_tier = self.assessor.assess(&new.command);
        // Auto-approval needs both a benign tier and an explicit safe-list
        // match; high and critical always wait for manual review.
        let auto_approved = match risk_tier {
            RiskTier::Low | RiskTier::Medium => self.safe.matches(&new.command),
            RiskTier::High | RiskTier::Critical => false,
        };

        let request = db::requests::insert(&self.state.pool, &new, risk_tier, auto_approved).await?;

        tracing::info!(
            "Request {} submitted by {} (risk={risk_tier}, auto_approved={auto_approved})",
            request.id,
            request.agent_id
        );

        if auto_approved {
            self.do_approve(&request, Some("auto-approved by policy"))
                .await?;
            return self.get_status(request.id).await;
        }

        Ok(request)
    }

    /// Manual approval. Valid only from pending; returns false otherwise, so
    /// a request can only ever be approved once.
    pub async fn approve(&self, id: Uuid, notes: Option<&str>) -> Result<bool, AppError> {
        let request = self.get_status(id).await?;
        self.do_approve(&request, notes).await
    }

    async fn do_approve(
        &self,
        request: &AgentRequest,
        notes: Option<&str>,
    ) -> Result<bool, AppError> {
        // The approval hop, the job enqueue, and the move to processing
        // commit together: an interrupted approval rolls back to pending and
        // the request stays approvable. Approved is never left behind as a
        // resting state.
        let mut tx = self.state.pool.begin().await?;

        if !db::requests::mark_approved(&mut *tx, request.id, notes).await? {
            return Ok(false);
        }

        // The pending guard above fired exactly once for this request, so
        // exactly one execution job is ever enqueued for it.
        let job = NewJob::new(
            EXECUTION_QUEUE,
            "execute_command",
            json!({
                "request_id": request.id,
                "session_id": request.session_id,
                "command": request.command,
            }),
        )
        .priority(request.priority)
        .max_retries(self.config().max_retries)
        .retry_delay_secs(self.config().retry_delay_secs);

        let job = db::jobs::enqueue(&mut *tx, &job).await?;
        db::requests::mark_processing(&mut *tx, request.id).await?;

        tx.commit().await?;

        tracing::info!("Request {} approved, execution job {} enqueued", request.id, job.id);
        Ok(true)
    }

    /// Valid only from pending. The originating session is told why.
    pub async fn reject(&self, id: Uuid, reason: &str) -> Result<bool, AppError> {
        let request = self.get_status(id).await?;

        if !db::requests::mark_rejected(&self.state.pool, id, reason).await? {
            return Ok(false);
        }

        self.notify(
            &request.session_id,
            &format!("Request {} rejected: {reason}", request.id),
        )
        .await?;

        tracing::info!("Request {} rejected: {reason}", request.id);
        Ok(true)
    }

    pub async fn get_status(&self, id: Uuid) -> Result<AgentRequest, AppError> {
        db::requests::find_by_id(&self.state.pool, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Request {id} not found")))
    }

    pub async fn list_pending(&self, limit: i64) -> Result<Vec<AgentRequest>, AppError> {
        Ok(db::requests::list_pending(&self.state.pool, limit).await?)
    }

    pub async fn stats(&self) -> Result<ManagerStats, AppError> {
        Ok(ManagerStats {
            requests: db::requests::stats(&self.state.pool).await?,
            execution: db::jobs::stats(&self.state.pool, EXECUTION_QUEUE).await?,
            notifications: db::jobs::stats(&self.state.pool, NOTIFICATION_QUEUE).await?,
        })
    }

    /// Fail processing requests stuck past the configured budget and notify
    /// their sessions. Returns the number swept.
    pub async fn sweep_timeouts(&self) -> Result<u64, AppError> {
        let budget = self.config().request_timeout_secs;
        let cutoff = Utc::now() - Duration::seconds(budget);
        let error = AppError::Timeout(format!("Request timed out after {budget}s")).to_string();

        let swept = db::requests::sweep_timed_out(&self.state.pool, cutoff, &error).await?;

        for (id, session_id) in &swept {
            tracing::warn!("Request {id} timed out, marking failed");
            if let Err(e) = self
                .notify(session_id, &format!("Request {id} failed: {error}"))
                .await
            {
                tracing::error!("Failed to enqueue timeout notification for {id}: {e}");
            }
        }

        Ok(swept.len() as u64)
    }

    /// Background sweep: timeout enforcement plus bounded-history purge,
    /// every `sweep_interval_secs` until shutdown.
    pub async fn run_sweep(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = std::time::Duration::from_secs(self.config().sweep_interval_secs);
        tracing::debug!("Timeout sweep started (interval {interval:?})");

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.sweep_timeouts().await {
                Ok(0) => {}
                Ok(n) => tracing::info!("Sweep failed {n} timed-out request(s)"),
                Err(e) => tracing::error!("Timeout sweep error: {e}"),
            }

            match db::requests::purge_history(&self.state.pool, self.config().history_keep).await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {n} old request(s) from history"),
                Err(e) => tracing::error!("History purge error: {e}"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => {}
            }
        }

        tracing::debug!("Timeout sweep stopped");
    }

    async fn notify(&self, session_id: &str, message: &str) -> Result<(), AppError> {
        let job = NewJob::new(
            NOTIFICATION_QUEUE,
            "notify_result",
            json!({ "session_id": session_id, "message": message }),
        )
        .max_retries(self.config().max_retries)
        .retry_delay_secs(self.config().retry_delay_secs);

        db::jobs::enqueue(&self.state.pool, &job).await?;
        Ok(())
    }

    fn request_tag(job: &Job) -> Option<(Uuid, String)> {
        if job.kind != "execute_command" {
            return None;
        }
        let request_id = job
            .payload
            .get("request_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())?;
        let session_id = job.payload.get("session_id")?.as_str()?.to_string();
        Some((request_id, session_id))
    }
}

/// Completion callbacks: the worker pool reports terminal job transitions
/// here; jobs without a request tag are ignored.
#[async_trait]
impl JobObserver for RequestManager {
    async fn on_job_succeeded(&self, job: &Job, result: &serde_json::Value) {
        let Some((request_id, session_id)) = Self::request_tag(job) else {
            return;
        };

        let output = result
            .get("output")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        match db::requests::mark_completed(&self.state.pool, request_id, &output).await {
            Ok(true) => {
                tracing::info!("Request {request_id} completed");
                let message = if output.trim().is_empty() {
                    format!("Request {request_id} completed")
                } else {
                    format!("Request {request_id} completed:\n{}", output.trim())
                };
                if let Err(e) = self.notify(&session_id, &message).await {
                    tracing::error!("Failed to enqueue completion notification: {e}");
                }
            }
            // Already failed by the timeout sweep; the late result is dropped.
            Ok(false) => {
                tracing::warn!("Request {request_id} no longer processing, result discarded")
            }
            Err(e) => tracing::error!("Failed to complete request {request_id}: {e}"),
        }
    }

    async fn on_job_dead(&self, job: &Job, error: &str) {
        let Some((request_id, session_id)) = Self::request_tag(job) else {
            return;
        };

        match db::requests::mark_failed(&self.state.pool, request_id, error).await {
            Ok(true) => {
                tracing::warn!("Request {request_id} failed permanently: {error}");
                if let Err(e) = self
                    .notify(&session_id, &format!("Request {request_id} failed: {error}"))
                    .await
                {
                    tracing::error!("Failed to enqueue failure notification: {e}");
                }
            }
            Ok(false) => {
                tracing::warn!("Request {request_id} no longer processing, error discarded")
            }
            Err(e) => tracing::error!("Failed to fail request {request_id}: {e}"),
        }
    }
}
