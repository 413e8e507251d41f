use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use warden::config::Config;
use warden::handlers::execute::ShellExecutor;
use warden::handlers::notify::TerminalSink;
use warden::manager::RequestManager;
use warden::state::AppState;
use warden::{db, worker};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    tracing::info!("Starting Warden");

    let pool = db::connect(&config.database_url)
        .await
        .expect("Failed to open job store");

    db::init_schema(&pool).await.expect("Failed to initialize schema");
    tracing::info!("Job store ready at {}", config.database_url);

    let worker_count = config.worker_count;
    let state = Arc::new(AppState { pool, config });

    let manager = Arc::new(RequestManager::new(state.clone())?);
    let registry = warden::build_registry(Arc::new(ShellExecutor), Arc::new(TerminalSink));
    tracing::info!("Handlers registered: {}", registry.kinds().join(", "));
    let registry = Arc::new(registry);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let pool_handle = worker::run_pool(
        state.clone(),
        registry,
        manager.clone(),
        shutdown_rx.clone(),
        worker_count,
    );

    let sweep_manager = manager.clone();
    let sweep_shutdown = shutdown_rx.clone();
    let sweep_handle = tokio::spawn(async move { sweep_manager.run_sweep(sweep_shutdown).await });

    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    let _ = sweep_handle.await;
    let _ = pool_handle.join();

    tracing::info!("Warden stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
