use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{HandlerError, JobHandler};

/// External collaborator that delivers a terminal result back to the
/// originating session.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, session_id: &str, message: &str) -> Result<(), String>;
}

#[derive(Debug, Deserialize)]
struct NotifyPayload {
    session_id: String,
    message: String,
}

/// Handler for "notify_result" jobs. Delivery failures are logged and follow
/// the job's normal retry path; they never touch the request lifecycle.
pub struct NotifyResultHandler {
    sink: Arc<dyn NotificationSink>,
}

impl NotifyResultHandler {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl JobHandler for NotifyResultHandler {
    fn kind(&self) -> &str {
        "notify_result"
    }

    async fn run(&self, payload: &serde_json::Value) -> Result<serde_json::Value, HandlerError> {
        let payload: NotifyPayload = serde_json::from_value(payload.clone())
            .map_err(|e| format!("Invalid notify_result payload: {e}"))?;

        if let Err(e) = self.sink.deliver(&payload.session_id, &payload.message).await {
            tracing::warn!(
                "Notification delivery failed for session {}: {e}",
                payload.session_id
            );
            return Err(HandlerError::from(e));
        }

        Ok(json!({ "delivered": true }))
    }
}

/// Default sink for the daemon: echoes the result into the log stream.
pub struct TerminalSink;

#[async_trait]
impl NotificationSink for TerminalSink {
    async fn deliver(&self, session_id: &str, message: &str) -> Result<(), String> {
        tracing::info!("[session {session_id}] {message}");
        Ok(())
    }
}
