use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{HandlerError, JobHandler};

/// External collaborator that actually runs a command inside an agent
/// session. Implementations must be retry-tolerant: the same job can be
/// dispatched again after a lease reclaim.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, session_id: &str, command: &str) -> Result<String, String>;
}

#[derive(Debug, Deserialize)]
struct ExecutePayload {
    session_id: String,
    command: String,
}

/// Handler for "execute_command" jobs enqueued on request approval.
pub struct ExecuteCommandHandler {
    executor: Arc<dyn CommandExecutor>,
}

impl ExecuteCommandHandler {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }
}

#[async_trait]
impl JobHandler for ExecuteCommandHandler {
    fn kind(&self) -> &str {
        "execute_command"
    }

    async fn run(&self, payload: &serde_json::Value) -> Result<serde_json::Value, HandlerError> {
        let payload: ExecutePayload = serde_json::from_value(payload.clone())
            .map_err(|e| format!("Invalid execute_command payload: {e}"))?;

        let output = self
            .executor
            .execute(&payload.session_id, &payload.command)
            .await
            .map_err(HandlerError::from)?;

        Ok(json!({ "output": output }))
    }
}

/// Default executor for the daemon: runs the command through `sh -c` and
/// captures its output.
pub struct ShellExecutor;

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, session_id: &str, command: &str) -> Result<String, String> {
        tracing::debug!("Executing for session {session_id}: {command}");

        let output = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .map_err(|e| format!("Failed to spawn command: {e}"))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(format!(
                "Command exited with {}: {}",
                output.status,
                stderr.trim()
            ))
        }
    }
}
