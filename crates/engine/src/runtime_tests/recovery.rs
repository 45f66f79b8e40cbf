// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crash-recovery behavior over the durable tier.

use super::*;
use aether_core::{StepStatus, WorkflowAction, WorkflowState};
use aether_storage::{DurableStore, MemoryStore, WorkflowStore};
use tempfile::tempdir;

fn durable_ctx(dir: &std::path::Path) -> TestCtx {
    let clock = FakeClock::new();
    let bus = EventBus::new(256);
    let store = DurableStore::open(dir).unwrap();
    let handle = Runtime::spawn(Box::new(store), bus.clone(), clock.clone(), test_config());
    TestCtx { handle, clock, bus }
}

#[tokio::test]
async fn restart_preserves_state_and_requeues_partial_workflows() {
    let dir = tempdir().unwrap();

    // First life: ten workflows, five completed, five left mid-flight.
    let mut completed_ids = Vec::new();
    let mut partial_ids = Vec::new();
    {
        let ctx = durable_ctx(dir.path());
        let registration = register(&ctx, &["greet"]).await;

        for i in 0..10 {
            let id = ctx
                .handle
                .start_workflow("greet", Payload::from(format!("input-{i}")))
                .await
                .unwrap();
            if i < 5 {
                let task = poll_one(&ctx, registration.session_token).await;
                ctx.handle
                    .complete_step(
                        registration.session_token,
                        task.id,
                        StepOutcome::Completed(Payload::from(format!("output-{i}"))),
                    )
                    .await
                    .unwrap();
                completed_ids.push(id);
            } else {
                partial_ids.push(id);
            }
        }
        ctx.handle.shutdown().await;
    }

    // Second life: identical state, and the partial five make progress
    // once a worker reconnects.
    let ctx = durable_ctx(dir.path());
    let all = ctx.handle.list_workflows(ListFilter::all()).await.unwrap();
    assert_eq!(all.len(), 10);
    for id in &completed_ids {
        let wf = ctx.handle.get_workflow(*id).await.unwrap();
        assert_eq!(wf.state, WorkflowState::Completed);
    }
    for id in &partial_ids {
        let wf = ctx.handle.get_workflow(*id).await.unwrap();
        assert!(!wf.is_terminal());
    }

    let registration = register(&ctx, &["greet"]).await;
    for _ in 0..5 {
        let task = poll_one(&ctx, registration.session_token).await;
        ctx.handle
            .complete_step(
                registration.session_token,
                task.id,
                StepOutcome::Completed(Payload::from("resumed")),
            )
            .await
            .unwrap();
    }

    for id in &partial_ids {
        let wf = ctx.handle.get_workflow(*id).await.unwrap();
        assert_eq!(wf.state, WorkflowState::Completed);
        assert_eq!(wf.result, Some(Payload::from("resumed")));
    }
}

#[tokio::test]
async fn workflow_with_completed_step_but_no_final_transition_is_parked() {
    // Simulate a crash that landed exactly between the step completion
    // and the workflow's own Completed action.
    let mut store = MemoryStore::new();
    let id = aether_core::WorkflowId::from("wf-halfway");
    let wf = aether_core::Workflow::new(id, "greet", Payload::from("in"), 1_000);
    store.create(wf).unwrap();
    store
        .update(
            &id,
            WorkflowAction::StepEnqueued {
                step: "start".into(),
                attempt: 1,
                input: Payload::from("in"),
                at_ms: 1_000,
            },
        )
        .unwrap();
    store
        .update(
            &id,
            WorkflowAction::StepStarted { step: "start".into(), attempt: 1, at_ms: 1_100 },
        )
        .unwrap();
    store
        .update(
            &id,
            WorkflowAction::StepCompleted {
                step: "start".into(),
                attempt: 1,
                output: Payload::from("half-done"),
                at_ms: 1_200,
            },
        )
        .unwrap();

    let clock = FakeClock::new();
    let bus = EventBus::new(256);
    let handle = Runtime::spawn(Box::new(store), bus.clone(), clock.clone(), test_config());
    let ctx = TestCtx { handle, clock, bus };

    // Still parked: no dispatch metadata for "greet" yet.
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert!(!wf.is_terminal());

    // A registration for the type resolves it: the lost final transition
    // is replayed from the completed driving step.
    register(&ctx, &["greet"]).await;
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Completed);
    assert_eq!(wf.result, Some(Payload::from("half-done")));
}

#[tokio::test]
async fn recovered_running_step_redispatches_same_attempt() {
    let dir = tempdir().unwrap();
    let id;
    {
        let ctx = durable_ctx(dir.path());
        let registration = register(&ctx, &["greet"]).await;
        id = ctx
            .handle
            .start_workflow("greet", Payload::from("in"))
            .await
            .unwrap();
        // Claimed and started, never completed: the claim dies with the
        // process.
        let task = poll_one(&ctx, registration.session_token).await;
        assert_eq!(task.attempt, 1);
        ctx.handle.shutdown().await;
    }

    let ctx = durable_ctx(dir.path());
    let registration = register(&ctx, &["greet"]).await;
    let task = poll_one(&ctx, registration.session_token).await;
    assert_eq!(task.workflow_id, id);
    assert_eq!(task.step_name, "start");
    assert_eq!(task.attempt, 1, "recovered attempt is reused, not advanced");

    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("after crash")),
        )
        .await
        .unwrap();
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Completed);
    // One record: the re-dispatch reuses the surviving attempt record.
    assert_eq!(wf.steps.len(), 1);
    assert_eq!(wf.steps[0].status, StepStatus::Completed);
}

#[tokio::test]
async fn recovery_resumes_pending_cancel_deadline() {
    let dir = tempdir().unwrap();
    let id;
    {
        let ctx = durable_ctx(dir.path());
        let registration = register(&ctx, &["process"]).await;
        id = ctx
            .handle
            .start_workflow("process", Payload::from("in"))
            .await
            .unwrap();
        poll_one(&ctx, registration.session_token).await;
        ctx.handle.cancel(id).await.unwrap();
        ctx.handle.shutdown().await;
    }

    let ctx = durable_ctx(dir.path());
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert!(wf.cancel_requested);
    assert!(!wf.is_terminal());

    // The deadline keeps counting in the new life.
    advance_and_tick(&ctx, 10_001).await;
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Cancelled);
}

#[tokio::test]
async fn retention_sweep_prunes_old_terminal_workflows() {
    let ctx = setup_with(RuntimeConfig {
        retention_ms: Some(60_000),
        ..test_config()
    });
    let registration = register(&ctx, &["greet"]).await;

    let done = ctx
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

    let live = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    // Inside the window: the terminal workflow is still queryable.
    advance_and_tick(&ctx, 59_000).await;
    assert!(ctx.handle.get_workflow(done).await.is_ok());

    // Past the window: pruned. Active workflows are never touched.
    advance_and_tick(&ctx, 2_000).await;
    assert!(matches!(
        ctx.handle.get_workflow(done).await.unwrap_err(),
        CoreError::NotFound(_)
    ));
    assert!(ctx.handle.get_workflow(live).await.is_ok());
}

#[tokio::test]
async fn terminal_workflows_are_not_requeued() {
    let dir = tempdir().unwrap();
    {
        let ctx = durable_ctx(dir.path());
        let registration = register(&ctx, &["greet"]).await;
        ctx.handle
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
        ctx.handle.shutdown().await;
    }

    let ctx = durable_ctx(dir.path());
    let registration = register(&ctx, &["greet"]).await;
    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());
}
