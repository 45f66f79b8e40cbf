// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cancellation behavior.

use super::*;
use aether_core::{EventFilter, StepStatus, WorkflowState};

#[tokio::test]
async fn cancel_with_no_running_step_is_immediate() {
    let ctx = setup();
    let mut sub = ctx.bus.subscribe(EventFilter::any());
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let outcome = ctx.handle.cancel(id).await.unwrap();
    assert_eq!(outcome, CancelOutcome::Accepted);

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Cancelled);
    assert_eq!(wf.steps[0].status, StepStatus::Cancelled);

    let kinds = drain_kinds(&mut sub);
    assert_eq!(kinds.last().map(String::as_str), Some("workflow:cancelled"));

    // A queued task for the cancelled workflow never dispatches.
    let registration = register(&ctx, &["greet"]).await;
    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn cancel_terminal_workflow_is_already_terminal() {
    let ctx = setup();
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
            StepOutcome::Completed(Payload::from("out")),
        )
        .await
        .unwrap();

    let outcome = ctx.handle.cancel(id).await.unwrap();
    assert_eq!(outcome, CancelOutcome::AlreadyTerminal);

    // No effect on the stored record.
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Completed);
    assert_eq!(wf.result, Some(Payload::from("out")));
}

#[tokio::test]
async fn cancel_of_unknown_workflow_is_not_found() {
    let ctx = setup();
    let err = ctx
        .handle
        .cancel(aether_core::WorkflowId::from("wf-missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn worker_acknowledges_cancel_over_the_stream() {
    let ctx = setup();
    let registration = register(&ctx, &["process"]).await;
    let mut stream = ctx
        .handle
        .open_stream(registration.session_token)
        .await
        .unwrap();

    let id = ctx
        .handle
        .start_workflow("process", Payload::from("in"))
        .await
        .unwrap();
    let StreamPush::Task(task) = tokio::time::timeout(Duration::from_secs(2), stream.recv())
        .await
        .unwrap()
        .unwrap()
    else {
        panic!("expected task push");
    };

    let outcome = ctx.handle.cancel(id).await.unwrap();
    assert_eq!(outcome, CancelOutcome::Accepted);

    // Cancellation notice arrives on the same stream.
    let StreamPush::Cancel { workflow_id, task_id } =
        tokio::time::timeout(Duration::from_secs(2), stream.recv())
            .await
            .unwrap()
            .unwrap()
    else {
        panic!("expected cancel push");
    };
    assert_eq!(workflow_id, id);
    assert_eq!(task_id, task.id);

    // Worker acknowledges with a cancelled completion inside the deadline.
    ctx.handle
        .complete_step(registration.session_token, task.id, StepOutcome::Cancelled)
        .await
        .unwrap();

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Cancelled);
    assert_eq!(wf.step("start", 1).unwrap().status, StepStatus::Cancelled);

    let outcome = ctx
        .handle
        .await_result(id, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(outcome, AwaitOutcome::Cancelled);
}

#[tokio::test]
async fn deadline_forces_cancel_leaving_the_step_running() {
    let ctx = setup(); // cancel_deadline_ms = 10_000
    let registration = register(&ctx, &["process"]).await;
    let id = ctx
        .handle
        .start_workflow("process", Payload::from("in"))
        .await
        .unwrap();
    let task = poll_one(&ctx, registration.session_token).await;

    assert_eq!(ctx.handle.cancel(id).await.unwrap(), CancelOutcome::Accepted);

    // Worker never acknowledges; the deadline forces the transition.
    advance_and_tick(&ctx, 10_001).await;

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Cancelled);
    // The abandoned step stays Running until the worker reports it.
    assert_eq!(wf.step("start", 1).unwrap().status, StepStatus::Running);

    // A late completion is accepted for audit without changing state.
    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("late")),
        )
        .await
        .unwrap();
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Cancelled);
    assert_eq!(wf.step("start", 1).unwrap().status, StepStatus::Completed);
    assert_eq!(
        wf.step("start", 1).unwrap().output,
        Some(Payload::from("late"))
    );
}

#[tokio::test]
async fn step_finishing_after_cancel_does_not_advance_a_program() {
    let ctx = setup();
    let registration = register_with_caps(
        &ctx,
        &["etl"],
        vec![
            aether_core::Capability::step("extract"),
            aether_core::Capability::step("load"),
        ],
    )
    .await;
    let id = ctx
        .handle
        .start_workflow("etl", Payload::from("in"))
        .await
        .unwrap();

    let task = poll_one(&ctx, registration.session_token).await;
    assert_eq!(task.step_name, "extract");
    assert_eq!(ctx.handle.cancel(id).await.unwrap(), CancelOutcome::Accepted);

    // The running step is allowed to finish, but the program stops there.
    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("extracted")),
        )
        .await
        .unwrap();

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Cancelled);
    assert!(wf.latest_step("load").is_none());

    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn cancel_when_claimed_worker_died_resolves_on_sweep() {
    let ctx = setup();
    let registration = register(&ctx, &["process"]).await;
    let id = ctx
        .handle
        .start_workflow("process", Payload::from("in"))
        .await
        .unwrap();
    poll_one(&ctx, registration.session_token).await;

    assert_eq!(ctx.handle.cancel(id).await.unwrap(), CancelOutcome::Accepted);

    // The claiming worker dies before acknowledging: nobody is left to
    // answer, so the sweep cancels outright.
    advance_and_tick(&ctx, 31_000).await;

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Cancelled);
}
