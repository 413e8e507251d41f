use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::watch;

use crate::db;
use crate::handlers::HandlerRegistry;
use crate::models::{Job, JobStatus};
use crate::state::SharedState;

/// How often each worker sweeps its queues for expired leases.
const RECLAIM_INTERVAL: Duration = Duration::from_secs(30);

/// Bounded retries for reporting an outcome back to the store. If these are
/// spent the job stays leased until expiry and reclaim recovers it.
const REPORT_ATTEMPTS: u32 = 3;

/// Receives terminal job transitions. The request manager implements this to
/// reconcile execution jobs with their requests.
#[async_trait]
pub trait JobObserver: Send + Sync {
    async fn on_job_succeeded(&self, job: &Job, result: &serde_json::Value);
    async fn on_job_dead(&self, job: &Job, error: &str);
}

/// Start a worker pool on a dedicated Tokio runtime with its own thread pool.
/// This runs on a separate OS thread and blocks until shutdown is signaled.
pub fn run_pool(
    state: SharedState,
    registry: Arc<HandlerRegistry>,
    observer: Arc<dyn JobObserver>,
    shutdown: watch::Receiver<bool>,
    worker_count: usize,
) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("worker-pool".into())
        .spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(worker_count)
                .thread_name("job-worker")
                .enable_all()
                .build()
                .expect("Failed to build worker runtime");

            runtime.block_on(async {
                let mut handles = Vec::with_capacity(worker_count);

                for id in 0..worker_count {
                    handles.push(tokio::spawn(run(
                        id,
                        state.clone(),
                        registry.clone(),
                        observer.clone(),
                        shutdown.clone(),
                    )));
                }

                tracing::info!("Job worker pool started ({worker_count} workers)");

                for handle in handles {
                    let _ = handle.await;
                }

                tracing::info!("Job worker pool stopped");
            });
        })
        .expect("Failed to spawn worker pool thread")
}

/// A single worker loop: claim, dispatch, report, with an idle backoff sleep
/// when no queue has work and a periodic expired-lease reclaim.
pub async fn run(
    id: usize,
    state: SharedState,
    registry: Arc<HandlerRegistry>,
    observer: Arc<dyn JobObserver>,
    mut shutdown: watch::Receiver<bool>,
) {
    let worker_id = format!("worker-{}-{id}", std::process::id());
    let poll_interval = Duration::from_secs(state.config.poll_interval_secs);
    let mut last_reclaim = Instant::now();

    tracing::debug!("Worker {worker_id} started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        if last_reclaim.elapsed() >= RECLAIM_INTERVAL {
            reclaim_queues(&state, &worker_id).await;
            last_reclaim = Instant::now();
        }

        match process_next(&state, &registry, &observer, &worker_id).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Worker {worker_id} error: {e}");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    tracing::debug!("Worker {worker_id} stopped");
}

async fn reclaim_queues(state: &SharedState, worker_id: &str) {
    for queue in &state.config.queues {
        match db::jobs::reclaim_expired_leases(&state.pool, queue).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!("Worker {worker_id} reclaimed {n} expired lease(s) on {queue}"),
            Err(e) => tracing::error!("Lease reclaim failed on {queue}: {e}"),
        }
    }
}

/// Try to claim and process one job from the first queue that has work.
/// Returns true if a job was processed.
async fn process_next(
    state: &SharedState,
    registry: &HandlerRegistry,
    observer: &Arc<dyn JobObserver>,
    worker_id: &str,
) -> Result<bool, String> {
    for queue in &state.config.queues {
        let job = db::jobs::claim_next(&state.pool, queue, worker_id, state.config.lease_secs)
            .await
            .map_err(|e| format!("Failed to claim from {queue}: {e}"))?;

        let job = match job {
            Some(job) => job,
            None => continue,
        };

        dispatch(state, registry, observer, worker_id, job).await;
        return Ok(true);
    }

    Ok(false)
}

async fn dispatch(
    state: &SharedState,
    registry: &HandlerRegistry,
    observer: &Arc<dyn JobObserver>,
    worker_id: &str,
    job: Job,
) {
    tracing::debug!(
        "Processing job {} (queue={}, kind={}, attempt={})",
        job.id,
        job.queue_name,
        job.kind,
        job.retries + 1
    );

    let timeout = Duration::from_secs(state.config.handler_timeout_secs);

    let outcome = match registry.get(&job.kind) {
        Some(handler) => match tokio::time::timeout(timeout, handler.run(&job.payload)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => Err(e.message),
            Err(_) => Err(format!(
                "Handler timed out after {}s",
                state.config.handler_timeout_secs
            )),
        },
        None => Err(format!("Unknown job kind: {}", job.kind)),
    };

    match outcome {
        Ok(result) => {
            if report_complete(state, &job, worker_id).await {
                observer.on_job_succeeded(&job, &result).await;
            }
        }
        Err(error) => {
            tracing::warn!("Job {} attempt {} failed: {error}", job.id, job.retries + 1);
            if let Some(JobStatus::Dead) = report_fail(state, &job, worker_id, &error).await {
                tracing::error!("Job {} dead after {} retries", job.id, job.retries);
                observer.on_job_dead(&job, &error).await;
            }
        }
    }
}

/// Report success with bounded retries on store I/O errors. Returns true if
/// this worker's completion took effect.
async fn report_complete(state: &SharedState, job: &Job, worker_id: &str) -> bool {
    for attempt in 1..=REPORT_ATTEMPTS {
        match db::jobs::complete(&state.pool, job.id, worker_id).await {
            Ok(done) => {
                if !done {
                    tracing::warn!("Job {} completion ignored, lease no longer held", job.id);
                }
                return done;
            }
            Err(e) => {
                tracing::error!(
                    "Failed to complete job {} (attempt {attempt}/{REPORT_ATTEMPTS}): {e}",
                    job.id
                );
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
    false
}

async fn report_fail(
    state: &SharedState,
    job: &Job,
    worker_id: &str,
    error: &str,
) -> Option<JobStatus> {
    for attempt in 1..=REPORT_ATTEMPTS {
        match db::jobs::fail(&state.pool, job.id, worker_id, error).await {
            Ok(status) => {
                if status.is_none() {
                    tracing::warn!("Job {} failure ignored, lease no longer held", job.id);
                }
                return status;
            }
            Err(e) => {
                tracing::error!(
                    "Failed to record failure for job {} (attempt {attempt}/{REPORT_ATTEMPTS}): {e}",
                    job.id
                );
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        }
    }
    None
}
