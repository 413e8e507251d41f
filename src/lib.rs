pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod models;
pub mod risk;
pub mod handlers;
pub mod manager;
pub mod worker;

use std::sync::Arc;

use crate::handlers::execute::{CommandExecutor, ExecuteCommandHandler};
use crate::handlers::notify::{NotificationSink, NotifyResultHandler};
use crate::handlers::HandlerRegistry;

/// Wire the standard handler set over the injected collaborators.
pub fn build_registry(
    executor: Arc<dyn CommandExecutor>,
    sink: Arc<dyn NotificationSink>,
) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(ExecuteCommandHandler::new(executor)));
    registry.register(Arc::new(NotifyResultHandler::new(sink)));
    registry
}
