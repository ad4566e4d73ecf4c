mod common;

use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use common::{demo_def, StubClient};
use workflow_harness::client::types::{StartWorkflowRequest, WorkflowStatus};
use workflow_harness::validation::validate_workflow_bulk;
use workflow_harness::HarnessError;

#[tokio::test]
async fn test_bulk_all_complete() {
    let (stub, ctx) = StubClient::new().running_polls(2).into_context();

    let outcome = ctx
        .bulk()
        .run(&demo_def(), 5, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.len(), 5);
    assert!(outcome.all_succeeded());
    assert!(outcome.verdict().is_ok());
    assert_eq!(stub.start_calls.load(Ordering::SeqCst), 5);
    assert!(outcome
        .results
        .iter()
        .all(|r| r.status() == Some(WorkflowStatus::Completed)));
}

#[tokio::test]
async fn test_bulk_failure_is_attributed_to_instance() {
    let (_stub, ctx) = StubClient::new()
        .status_for_start(1, WorkflowStatus::Failed)
        .into_context();

    let outcome = ctx
        .bulk()
        .run(&demo_def(), 3, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(outcome.len(), 3);
    assert_eq!(outcome.results[0].status(), Some(WorkflowStatus::Completed));
    assert_eq!(outcome.results[1].status(), Some(WorkflowStatus::Failed));
    assert_eq!(outcome.results[2].status(), Some(WorkflowStatus::Completed));

    let first = outcome.first_failure().unwrap();
    assert_eq!(first.index, 1);
    assert_eq!(first.workflow_id.as_deref(), Some("wf-2"));

    match outcome.verdict().unwrap_err() {
        HarnessError::Bulk { total, failures } => {
            assert_eq!(total, 3);
            assert_eq!(failures.len(), 1);
            assert!(failures[0].reason.contains("FAILED"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_bulk_timeout_keeps_every_slot() {
    let (_stub, ctx) = StubClient::new()
        .default_status(WorkflowStatus::Running)
        .status_for_start(0, WorkflowStatus::Completed)
        .into_context();
    let timeout = Duration::from_millis(100);
    let started = Instant::now();

    let outcome = ctx.bulk().run(&demo_def(), 4, timeout).await.unwrap();

    assert!(started.elapsed() < timeout + Duration::from_secs(1));
    assert_eq!(outcome.len(), 4);
    assert!(outcome.results[0].error.is_none());
    for result in &outcome.results[1..] {
        assert!(result.error.as_ref().is_some_and(HarnessError::is_timeout));
    }
    assert_eq!(outcome.failures().len(), 3);
}

#[tokio::test]
async fn test_bulk_start_failure_does_not_block_others() {
    let (stub, ctx) = StubClient::new().failing_start(1).into_context();

    let outcome = ctx
        .bulk()
        .run(&demo_def(), 3, Duration::from_secs(5))
        .await
        .unwrap();

    assert_eq!(stub.start_calls.load(Ordering::SeqCst), 3);
    assert_eq!(outcome.len(), 3);

    let failures = outcome.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].index, 1);
    assert!(failures[0].workflow_id.is_none());
    assert!(outcome.results[0].error.is_none());
    assert!(outcome.results[2].error.is_none());
}

#[tokio::test]
async fn test_bulk_registration_exhaustion_aborts() {
    let (stub, ctx) = StubClient::new().failing_registrations(u32::MAX).into_context();

    let err = validate_workflow_bulk(&ctx, &demo_def(), Duration::from_secs(1), 3)
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::RegistrationExhausted { .. }));
    assert_eq!(stub.start_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_validate_bulk_returns_aggregate_error() {
    let (_stub, ctx) = StubClient::new()
        .status_for_start(0, WorkflowStatus::TimedOut)
        .status_for_start(2, WorkflowStatus::Terminated)
        .into_context();

    let err = validate_workflow_bulk(&ctx, &demo_def(), Duration::from_secs(5), 3)
        .await
        .unwrap_err();

    match err {
        HarnessError::Bulk { failures, .. } => {
            let indexes: Vec<_> = failures.iter().map(|f| f.index).collect();
            assert_eq!(indexes, vec![0, 2]);
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn test_empty_bulk_succeeds() {
    let (_stub, ctx) = StubClient::new().into_context();

    validate_workflow_bulk(&ctx, &demo_def(), Duration::from_millis(10), 0)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_start_without_waiting_leaves_instances_unresolved() {
    let (stub, ctx) = StubClient::new().into_context();
    let requests = (0..3).map(|_| StartWorkflowRequest::new("demo", Some(1))).collect();

    let running = ctx.bulk().start_workflows(false, requests).await;

    assert_eq!(running.len(), 3);
    assert!(running.iter().all(|r| r.workflow_id.is_some() && !r.is_resolved()));
    assert_eq!(stub.status_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_bulk_pollers_stop_after_shared_timeout() {
    let (stub, ctx) = StubClient::new()
        .default_status(WorkflowStatus::Running)
        .into_context();

    let outcome = ctx
        .bulk()
        .run(&demo_def(), 3, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(outcome.failures().len(), 3);

    let polls_at_timeout = stub.status_calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(polls_at_timeout >= 3);
    assert_eq!(stub.status_calls.load(Ordering::SeqCst), polls_at_timeout);
}

#[tokio::test]
async fn test_bulk_unbounded_timeout_does_not_overflow() {
    let (_stub, ctx) = StubClient::new().running_polls(1).into_context();

    let outcome = ctx
        .bulk()
        .run(&demo_def(), 2, Duration::MAX)
        .await
        .unwrap();

    assert_eq!(outcome.len(), 2);
    assert!(outcome.verdict().is_ok());
}
