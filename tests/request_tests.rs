mod common;

use std::sync::Arc;

use serde_json::json;
use tokio::sync::watch;

use common::{FailingExecutor, RecordingSink, StaticExecutor, TestApp};
use warden::db::jobs;
use warden::error::AppError;
use warden::manager::{EXECUTION_QUEUE, NOTIFICATION_QUEUE};
use warden::models::{NewRequest, Priority, RequestStatus, RiskTier};
use warden::worker::{self, JobObserver};

fn request(command: &str) -> NewRequest {
    NewRequest {
        agent_id: "agent-1".to_string(),
        session_id: "session-1".to_string(),
        command: command.to_string(),
        description: String::new(),
        priority: Priority::Normal,
    }
}

#[tokio::test]
async fn safe_low_risk_command_is_auto_approved() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let req = manager.submit(request("echo status")).await.unwrap();

    assert_eq!(req.risk_tier, RiskTier::Low);
    assert!(req.auto_approved);
    assert_eq!(req.status, RequestStatus::Processing);
    assert!(req.approved_at.is_some());
    assert!(req.started_at.is_some());

    // Exactly one execution job, tagged with the request id.
    let stats = jobs::stats(&app.pool, EXECUTION_QUEUE).await.unwrap();
    assert_eq!(stats.pending, 1);
    let job = jobs::claim_next(&app.pool, EXECUTION_QUEUE, "w1", 60)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.kind, "execute_command");
    assert_eq!(job.payload["request_id"], json!(req.id));
    assert_eq!(job.payload["session_id"], json!("session-1"));
    assert_eq!(job.payload["command"], json!("echo status"));
}

#[tokio::test]
async fn critical_command_is_never_auto_approved() {
    let mut config = common::test_config();
    // Even a safe-list that matches everything must not bypass review for
    // critical commands.
    config.safe_patterns = vec![".*".to_string()];
    let app = TestApp::with_config(config).await;
    let manager = app.manager();

    let req = manager.submit(request("rm -rf /data")).await.unwrap();

    assert_eq!(req.risk_tier, RiskTier::Critical);
    assert!(!req.auto_approved);
    assert_eq!(req.status, RequestStatus::Pending);
    assert_eq!(jobs::stats(&app.pool, EXECUTION_QUEUE).await.unwrap().pending, 0);
}

#[tokio::test]
async fn unmatched_command_is_medium_and_waits_for_review() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let req = manager.submit(request("make build")).await.unwrap();

    assert_eq!(req.risk_tier, RiskTier::Medium);
    assert!(!req.auto_approved);
    assert_eq!(req.status, RequestStatus::Pending);
}

#[tokio::test]
async fn approve_is_single_shot() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let req = manager.submit(request("rm -rf /data")).await.unwrap();

    assert!(manager.approve(req.id, Some("reviewed")).await.unwrap());
    let approved = manager.get_status(req.id).await.unwrap();
    assert_eq!(approved.status, RequestStatus::Processing);
    assert_eq!(approved.supervisor_notes.as_deref(), Some("reviewed"));

    // Second approval is refused and enqueues nothing.
    assert!(!manager.approve(req.id, None).await.unwrap());
    let stats = jobs::stats(&app.pool, EXECUTION_QUEUE).await.unwrap();
    assert_eq!(stats.pending, 1);
}

#[tokio::test]
async fn interrupted_approval_never_strands_the_request() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let req = manager.submit(request("rm -rf /data")).await.unwrap();

    // Break the enqueue step mid-approval by hiding the jobs table.
    sqlx::query("ALTER TABLE jobs RENAME TO jobs_hidden")
        .execute(&app.pool)
        .await
        .unwrap();

    let err = manager.approve(req.id, None).await.unwrap_err();
    assert!(matches!(err, AppError::Database(_)));

    // The whole approval rolled back: not stuck in approved, still pending.
    let status = manager.get_status(req.id).await.unwrap();
    assert_eq!(status.status, RequestStatus::Pending);
    assert!(status.approved_at.is_none());

    // Once the store recovers, the same request is approvable again and
    // still produces exactly one execution job.
    sqlx::query("ALTER TABLE jobs_hidden RENAME TO jobs")
        .execute(&app.pool)
        .await
        .unwrap();

    assert!(manager.approve(req.id, None).await.unwrap());
    let approved = manager.get_status(req.id).await.unwrap();
    assert_eq!(approved.status, RequestStatus::Processing);
    assert_eq!(jobs::stats(&app.pool, EXECUTION_QUEUE).await.unwrap().pending, 1);
}

#[tokio::test]
async fn reject_is_pending_only_and_notifies() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let req = manager.submit(request("make deploy")).await.unwrap();

    assert!(manager.reject(req.id, "not during freeze").await.unwrap());
    let rejected = manager.get_status(req.id).await.unwrap();
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(rejected.supervisor_notes.as_deref(), Some("not during freeze"));

    assert_eq!(
        jobs::stats(&app.pool, NOTIFICATION_QUEUE).await.unwrap().pending,
        1
    );

    // Terminal: neither reject nor approve can move it again.
    assert!(!manager.reject(req.id, "again").await.unwrap());
    assert!(!manager.approve(req.id, None).await.unwrap());
    assert_eq!(jobs::stats(&app.pool, EXECUTION_QUEUE).await.unwrap().pending, 0);
}

#[tokio::test]
async fn submission_is_validated_before_persistence() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let err = manager.submit(request("   ")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let mut missing_agent = request("ls");
    missing_agent.agent_id = String::new();
    let err = manager.submit(missing_agent).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert!(manager.list_pending(10).await.unwrap().is_empty());
    let stats = manager.stats().await.unwrap();
    assert_eq!(stats.requests.pending, 0);
}

#[tokio::test]
async fn get_status_for_unknown_request_is_not_found() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let err = manager.get_status(uuid::Uuid::now_v7()).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn list_pending_orders_by_priority_then_age() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let mut urgent = request("make a");
    urgent.priority = Priority::Urgent;
    let mut low = request("make b");
    low.priority = Priority::Low;

    let first = manager.submit(request("make c")).await.unwrap();
    let urgent = manager.submit(urgent).await.unwrap();
    let low = manager.submit(low).await.unwrap();

    let pending = manager.list_pending(10).await.unwrap();
    let ids: Vec<_> = pending.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![urgent.id, first.id, low.id]);
}

#[tokio::test]
async fn completed_execution_job_completes_request_and_notifies() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let req = manager.submit(request("echo status")).await.unwrap();

    // Worker's happy path: claim, complete, then report to the observer.
    let job = jobs::claim_next(&app.pool, EXECUTION_QUEUE, "w1", 60)
        .await
        .unwrap()
        .unwrap();
    assert!(jobs::complete(&app.pool, job.id, "w1").await.unwrap());
    manager.on_job_succeeded(&job, &json!({ "output": "all good" })).await;

    let done = manager.get_status(req.id).await.unwrap();
    assert_eq!(done.status, RequestStatus::Completed);
    assert_eq!(done.result.as_deref(), Some("all good"));
    assert!(done.completed_at.is_some());

    assert_eq!(
        jobs::stats(&app.pool, NOTIFICATION_QUEUE).await.unwrap().pending,
        1
    );
}

#[tokio::test]
async fn dead_execution_job_fails_request_and_notifies() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let req = manager.submit(request("echo status")).await.unwrap();

    let job = jobs::claim_next(&app.pool, EXECUTION_QUEUE, "w1", 60)
        .await
        .unwrap()
        .unwrap();
    manager.on_job_dead(&job, "command not found").await;

    let failed = manager.get_status(req.id).await.unwrap();
    assert_eq!(failed.status, RequestStatus::Failed);
    assert_eq!(failed.error.as_deref(), Some("command not found"));

    assert_eq!(
        jobs::stats(&app.pool, NOTIFICATION_QUEUE).await.unwrap().pending,
        1
    );
}

#[tokio::test]
async fn timeout_sweep_fails_stuck_requests_once() {
    let mut config = common::test_config();
    config.request_timeout_secs = 0;
    let app = TestApp::with_config(config).await;
    let manager = app.manager();

    let req = manager.submit(request("echo status")).await.unwrap();
    assert_eq!(req.status, RequestStatus::Processing);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(manager.sweep_timeouts().await.unwrap(), 1);

    let failed = manager.get_status(req.id).await.unwrap();
    assert_eq!(failed.status, RequestStatus::Failed);
    assert!(failed.error.as_deref().unwrap().contains("timed out"));

    // Exactly one notification, and a second sweep finds nothing.
    assert_eq!(
        jobs::stats(&app.pool, NOTIFICATION_QUEUE).await.unwrap().pending,
        1
    );
    assert_eq!(manager.sweep_timeouts().await.unwrap(), 0);

    // A late completion report from a worker is discarded.
    let job = jobs::claim_next(&app.pool, EXECUTION_QUEUE, "w1", 60)
        .await
        .unwrap()
        .unwrap();
    manager.on_job_succeeded(&job, &json!({ "output": "late" })).await;
    let still_failed = manager.get_status(req.id).await.unwrap();
    assert_eq!(still_failed.status, RequestStatus::Failed);
}

#[tokio::test]
async fn worker_pool_executes_auto_approved_request_end_to_end() {
    let app = TestApp::new().await;
    let manager = app.manager();

    let sink = Arc::new(RecordingSink::default());
    let registry = Arc::new(warden::build_registry(
        Arc::new(StaticExecutor("done".to_string())),
        sink.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker::run(
        0,
        app.state.clone(),
        registry,
        manager.clone(),
        shutdown_rx,
    ));

    let req = manager.submit(request("echo status")).await.unwrap();

    let done = wait_for_status(&manager, req.id, RequestStatus::Completed).await;
    assert_eq!(done.result.as_deref(), Some("done"));

    // The notification job is processed by the same worker.
    wait_until(|| {
        let messages = sink.messages.lock().unwrap();
        messages
            .iter()
            .any(|(session, msg)| session == "session-1" && msg.contains("completed"))
    })
    .await;

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
}

#[tokio::test]
async fn worker_pool_dead_letters_failing_request_end_to_end() {
    let mut config = common::test_config();
    config.max_retries = 1;
    config.retry_delay_secs = 0;
    let app = TestApp::with_config(config).await;
    let manager = app.manager();

    let sink = Arc::new(RecordingSink::default());
    let registry = Arc::new(warden::build_registry(
        Arc::new(FailingExecutor("disk on fire".to_string())),
        sink.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker_handle = tokio::spawn(worker::run(
        0,
        app.state.clone(),
        registry,
        manager.clone(),
        shutdown_rx,
    ));

    let req = manager.submit(request("echo status")).await.unwrap();

    let failed = wait_for_status(&manager, req.id, RequestStatus::Failed).await;
    assert_eq!(failed.error.as_deref(), Some("disk on fire"));

    wait_until(|| {
        let messages = sink.messages.lock().unwrap();
        messages.iter().any(|(_, msg)| msg.contains("disk on fire"))
    })
    .await;

    // Retried once, then dead.
    let stats = jobs::stats(&app.pool, EXECUTION_QUEUE).await.unwrap();
    assert_eq!(stats.dead, 1);

    let _ = shutdown_tx.send(true);
    let _ = worker_handle.await;
}

async fn wait_for_status(
    manager: &warden::manager::RequestManager,
    id: uuid::Uuid,
    status: RequestStatus,
) -> warden::models::AgentRequest {
    for _ in 0..200 {
        let req = manager.get_status(id).await.unwrap();
        if req.status == status {
            return req;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("request {id} never reached {status}");
}

async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("condition not met within timeout");
}
