#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use warden::config::Config;
use warden::handlers::execute::CommandExecutor;
use warden::handlers::notify::NotificationSink;
use warden::manager::RequestManager;
use warden::state::{AppState, SharedState};

/// A test instance backed by a dedicated throwaway SQLite file.
pub struct TestApp {
    pub pool: SqlitePool,
    pub state: SharedState,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(mut config: Config) -> Self {
        let db_path = std::env::temp_dir().join(format!("warden-test-{}.db", Uuid::now_v7()));
        config.database_url = format!("sqlite://{}", db_path.display());

        let pool = warden::db::connect(&config.database_url)
            .await
            .expect("failed to open test store");
        warden::db::init_schema(&pool)
            .await
            .expect("failed to init test schema");

        let state = Arc::new(AppState {
            pool: pool.clone(),
            config,
        });

        TestApp { pool, state }
    }

    pub fn manager(&self) -> Arc<RequestManager> {
        Arc::new(RequestManager::new(self.state.clone()).expect("failed to build manager"))
    }
}

/// Defaults tuned for tests: zero retry delay so retrying jobs are
/// immediately eligible again.
pub fn test_config() -> Config {
    Config {
        database_url: String::new(),
        log_level: "info".to_string(),
        worker_count: 1,
        queues: vec!["execution".to_string(), "notifications".to_string()],
        poll_interval_secs: 1,
        lease_secs: 60,
        handler_timeout_secs: 5,
        request_timeout_secs: 300,
        sweep_interval_secs: 30,
        max_retries: 3,
        retry_delay_secs: 0,
        history_keep: 100,
        critical_patterns: Config::default_critical_patterns(),
        high_patterns: Config::default_high_patterns(),
        low_patterns: Config::default_low_patterns(),
        safe_patterns: Config::default_safe_patterns(),
    }
}

/// Executor that always succeeds with a fixed output.
pub struct StaticExecutor(pub String);

#[async_trait]
impl CommandExecutor for StaticExecutor {
    async fn execute(&self, _session_id: &str, _command: &str) -> Result<String, String> {
        Ok(self.0.clone())
    }
}

/// Executor that always fails with a fixed error.
pub struct FailingExecutor(pub String);

#[async_trait]
impl CommandExecutor for FailingExecutor {
    async fn execute(&self, _session_id: &str, _command: &str) -> Result<String, String> {
        Err(self.0.clone())
    }
}

/// Sink that records every delivered message.
#[derive(Default)]
pub struct RecordingSink {
    pub messages: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, session_id: &str, message: &str) -> Result<(), String> {
        self.messages
            .lock()
            .unwrap()
            .push((session_id.to_string(), message.to_string()));
        Ok(())
    }
}
