pub mod execute;
pub mod notify;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

#[derive(Debug)]
pub struct HandlerError {
    pub message: String,
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        HandlerError { message: s }
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        HandlerError {
            message: s.to_string(),
        }
    }
}

/// A job handler, selected by the job's string `kind`. Handlers must be
/// idempotent or safely re-runnable: a job whose lease expires mid-flight is
/// reclaimed and run again.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn kind(&self) -> &str;
    async fn run(&self, payload: &serde_json::Value) -> Result<serde_json::Value, HandlerError>;
}

/// Kind-to-handler mapping, built at startup and injected into the worker
/// pool. No global registration state.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.kind().to_string(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn JobHandler>> {
        self.handlers.get(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.handlers.keys().map(|k| k.as_str()).collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
