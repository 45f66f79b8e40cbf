// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-plane behavior: start, status, await, event ordering.

use super::*;
use aether_core::{EventFilter, StepStatus, WorkflowId, WorkflowState};

#[tokio::test]
async fn start_creates_pending_workflow_with_queued_start_step() {
    let ctx = setup();

    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("World"))
        .await
        .unwrap();

    let status = ctx.handle.status(id).await.unwrap();
    assert_eq!(status.state, WorkflowState::Pending);
    assert_eq!(status.current_step.as_deref(), Some("start"));
    assert_eq!(status.completed_at_ms, None);

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.steps.len(), 1);
    assert_eq!(wf.steps[0].status, StepStatus::Pending);
    assert_eq!(wf.steps[0].attempt, 1);
}

#[tokio::test]
async fn status_of_unknown_workflow_is_not_found() {
    let ctx = setup();
    let err = ctx
        .handle
        .status(WorkflowId::from("wf-missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn await_with_zero_timeout_answers_immediately() {
    let ctx = setup();
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("World"))
        .await
        .unwrap();

    let outcome = ctx
        .handle
        .await_result(id, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(outcome, AwaitOutcome::StillRunning);
}

#[tokio::test]
async fn await_expiry_is_still_running_not_an_error() {
    let ctx = setup();
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("World"))
        .await
        .unwrap();

    let outcome = ctx
        .handle
        .await_result(id, Duration::from_millis(20))
        .await
        .unwrap();
    assert_eq!(outcome, AwaitOutcome::StillRunning);
}

#[tokio::test]
async fn single_step_happy_path() {
    let ctx = setup();
    let mut sub = ctx.bus.subscribe(EventFilter::any());

    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("World"))
        .await
        .unwrap();

    let task = poll_one(&ctx, registration.session_token).await;
    assert_eq!(task.workflow_id, id);
    assert_eq!(task.workflow_type, "greet");
    assert_eq!(task.step_name, "start");
    assert_eq!(task.input, Payload::from("World"));

    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("Hello, World!")),
        )
        .await
        .unwrap();

    let outcome = ctx
        .handle
        .await_result(id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(outcome, AwaitOutcome::Completed(Payload::from("Hello, World!")));

    // Event order for the workflow's lifetime.
    assert_eq!(
        drain_kinds(&mut sub),
        vec![
            "workflow:started",
            "step:started",
            "step:completed",
            "workflow:completed",
        ]
    );
}

#[tokio::test]
async fn await_blocks_until_terminal() {
    let ctx = setup();
    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let handle = ctx.handle.clone();
    let waiter = tokio::spawn(async move { handle.await_result(id, Duration::from_secs(5)).await });

    let task = poll_one(&ctx, registration.session_token).await;
    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("done")),
        )
        .await
        .unwrap();

    let outcome = waiter.await.unwrap().unwrap();
    assert_eq!(outcome, AwaitOutcome::Completed(Payload::from("done")));
}

#[tokio::test]
async fn duplicate_completion_is_idempotent() {
    let ctx = setup();
    let mut sub = ctx.bus.subscribe(EventFilter::any());
    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let task = poll_one(&ctx, registration.session_token).await;
    let outcome = StepOutcome::Completed(Payload::from("out"));
    ctx.handle
        .complete_step(registration.session_token, task.id, outcome.clone())
        .await
        .unwrap();
    // Second completion with the same task id: ok, no state change.
    ctx.handle
        .complete_step(registration.session_token, task.id, outcome)
        .await
        .unwrap();

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Completed);
    assert_eq!(wf.steps.len(), 1);

    let kinds = drain_kinds(&mut sub);
    assert_eq!(
        kinds.iter().filter(|k| *k == "step:completed").count(),
        1,
        "duplicate completion must not emit a second event"
    );
}

#[tokio::test]
async fn failed_workflow_reports_error_through_await() {
    let ctx = setup_with(RuntimeConfig {
        retry: RetryPolicy { max_retries: 1, backoff: Backoff::None },
        ..test_config()
    });
    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let task = poll_one(&ctx, registration.session_token).await;
    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Failed("user code exploded".into()),
        )
        .await
        .unwrap();

    let outcome = ctx
        .handle
        .await_result(id, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(outcome, AwaitOutcome::Failed("user code exploded".into()));
}

#[tokio::test]
async fn completed_timestamps_are_ordered() {
    let ctx = setup();
    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let task = poll_one(&ctx, registration.session_token).await;
    ctx.clock.advance(Duration::from_millis(500));
    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("out")),
        )
        .await
        .unwrap();

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    let record = &wf.steps[0];
    assert!(record.completed_at_ms.unwrap() >= record.started_at_ms);
    assert!(wf.completed_at_ms.unwrap() >= wf.created_at_ms);
}

#[tokio::test]
async fn health_reports_active_counts() {
    let ctx = setup();
    register(&ctx, &["greet"]).await;
    ctx.handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let health = ctx.handle.health().await.unwrap();
    assert!(!health.read_only);
    assert_eq!(health.workflows_active, 1);
    assert_eq!(health.workers_active, 1);
}
