// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-plane behavior: registration, claims, streams, reports.

use super::*;
use aether_core::{EventFilter, ReportPhase, StepStatus, WorkerId, WorkflowState};

#[tokio::test]
async fn duplicate_worker_id_rejected_then_revived_after_death() {
    let ctx = setup();
    let worker_id = WorkerId::from("wkr-fixed");

    ctx.handle
        .register(Some(worker_id), "svc", "g", vec![], vec!["greet".into()])
        .await
        .unwrap();

    // Still active: duplicate.
    let err = ctx
        .handle
        .register(Some(worker_id), "svc", "g", vec![], vec!["greet".into()])
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::Duplicate(_)));

    // Expire it, then the id is usable again.
    advance_and_tick(&ctx, 31_000).await;
    ctx.handle
        .register(Some(worker_id), "svc", "g", vec![], vec!["greet".into()])
        .await
        .unwrap();
}

#[tokio::test]
async fn poll_returns_empty_batch_when_nothing_matches() {
    let ctx = setup();
    let registration = register(&ctx, &["greet"]).await;

    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn poll_respects_advertised_types() {
    let ctx = setup();
    let greet = register(&ctx, &["greet"]).await;
    let etl = register(&ctx, &["etl"]).await;

    ctx.handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let none = ctx.handle.poll_tasks(etl.session_token, 5).await.unwrap();
    assert!(none.is_empty());

    let some = ctx.handle.poll_tasks(greet.session_token, 5).await.unwrap();
    assert_eq!(some.len(), 1);
}

#[tokio::test]
async fn unknown_session_cannot_poll_or_complete() {
    let ctx = setup();
    let bogus = SessionToken::from("sess-bogus");

    assert!(matches!(
        ctx.handle.poll_tasks(bogus, 1).await.unwrap_err(),
        CoreError::NotFound(_)
    ));
    assert!(matches!(
        ctx.handle
            .complete_step(bogus, aether_core::TaskId::from("task-x"), StepOutcome::Cancelled)
            .await
            .unwrap_err(),
        CoreError::NotFound(_)
    ));
}

#[tokio::test]
async fn completion_from_wrong_session_is_a_protocol_violation() {
    let ctx = setup();
    let a = register(&ctx, &["greet"]).await;
    let b = register(&ctx, &["greet"]).await;
    ctx.handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let task = poll_one(&ctx, a.session_token).await;
    let err = ctx
        .handle
        .complete_step(
            b.session_token,
            task.id,
            StepOutcome::Completed(Payload::empty()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ProtocolViolation(_)));

    // The rightful owner can still complete.
    ctx.handle
        .complete_step(
            a.session_token,
            task.id,
            StepOutcome::Completed(Payload::empty()),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn completion_for_unknown_task_is_not_found() {
    let ctx = setup();
    let registration = register(&ctx, &["greet"]).await;
    let err = ctx
        .handle
        .complete_step(
            registration.session_token,
            aether_core::TaskId::from("task-gone"),
            StepOutcome::Completed(Payload::empty()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound(_)));
}

#[tokio::test]
async fn draining_worker_gets_no_new_tasks_but_completes_in_flight() {
    let ctx = setup();
    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let task = poll_one(&ctx, registration.session_token).await;
    ctx.handle.drain(registration.session_token).await.unwrap();

    // Another workflow queues but the draining worker never sees it.
    ctx.handle
        .start_workflow("greet", Payload::from("second"))
        .await
        .unwrap();
    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());

    // The in-flight task still completes.
    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("out")),
        )
        .await
        .unwrap();
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Completed);
}

#[tokio::test]
async fn stream_receives_pushed_tasks() {
    let ctx = setup();
    let registration = register(&ctx, &["greet"]).await;
    let mut stream = ctx
        .handle
        .open_stream(registration.session_token)
        .await
        .unwrap();

    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let push = tokio::time::timeout(Duration::from_secs(2), stream.recv())
        .await
        .unwrap()
        .unwrap();
    let StreamPush::Task(task) = push else {
        panic!("expected a task push");
    };
    assert_eq!(task.workflow_id, id);
    assert_eq!(task.step_name, "start");

    // The pushed task is already Running from the core's perspective.
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Running);
}

#[tokio::test]
async fn worker_death_redelivers_with_incremented_attempt() {
    let ctx = setup();
    let mut sub = ctx.bus.subscribe(EventFilter::any());

    let lost = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();
    let first = poll_one(&ctx, lost.session_token).await;
    assert_eq!(first.attempt, 1);

    // Heartbeat stops for 2x the timeout.
    advance_and_tick(&ctx, 61_000).await;

    // A new worker advertising the same type picks the task back up.
    let replacement = register(&ctx, &["greet"]).await;
    let second = poll_one(&ctx, replacement.session_token).await;
    assert_eq!(second.workflow_id, id);
    assert_eq!(second.step_name, "start");
    assert_eq!(second.attempt, 2);
    assert_ne!(second.id, first.id);

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    let lost_record = wf.step("start", 1).unwrap();
    assert_eq!(lost_record.status, StepStatus::Failed);
    assert_eq!(lost_record.error.as_deref(), Some("worker lost"));

    // The stale session can no longer act on its old claim.
    let err = ctx
        .handle
        .complete_step(
            lost.session_token,
            first.id,
            StepOutcome::Completed(Payload::empty()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::ProtocolViolation(_)));

    let kinds = drain_kinds(&mut sub);
    assert!(kinds.contains(&"step:failed".to_string()));
}

#[tokio::test]
async fn visibility_timeout_redelivers_without_advancing() {
    let mut cfg = test_config();
    cfg.heartbeat_ms = 1_000_000; // only the visibility timer fires
    let ctx = setup_with(cfg);

    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();
    let first = poll_one(&ctx, registration.session_token).await;

    // Keep the session alive but never the task.
    ctx.handle
        .heartbeat_session(registration.session_token)
        .await
        .unwrap();
    advance_and_tick(&ctx, 61_000).await;

    let second = poll_one(&ctx, registration.session_token).await;
    assert_eq!(second.workflow_id, id);
    assert_eq!(second.step_name, "start", "redelivery must not skip ahead");
    assert_eq!(second.attempt, 2);
    let _ = first;
}

#[tokio::test]
async fn task_heartbeat_extends_visibility() {
    let mut cfg = test_config();
    cfg.heartbeat_ms = 1_000_000;
    let ctx = setup_with(cfg);

    let registration = register(&ctx, &["greet"]).await;
    ctx.handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();
    let task = poll_one(&ctx, registration.session_token).await;

    advance_and_tick(&ctx, 50_000).await;
    ctx.handle.heartbeat_task(task.id).await.unwrap();
    advance_and_tick(&ctx, 50_000).await;

    // Still claimed: nothing to poll.
    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn returned_task_goes_back_to_the_head() {
    let ctx = setup();
    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    let task = poll_one(&ctx, registration.session_token).await;
    ctx.handle
        .return_task(registration.session_token, task.id)
        .await
        .unwrap();

    let again = poll_one(&ctx, registration.session_token).await;
    assert_eq!(again.workflow_id, id);
    assert_eq!(again.attempt, 2);
}

#[tokio::test]
async fn report_step_builds_authoritative_history() {
    let ctx = setup();
    let mut sub = ctx.bus.subscribe(EventFilter::any());
    let registration = register_with_caps(
        &ctx,
        &["slow-process"],
        vec![aether_core::Capability::workflow("slow-process")],
    )
    .await;

    let id = ctx
        .handle
        .start_workflow("slow-process", Payload::from("in"))
        .await
        .unwrap();
    let task = poll_one(&ctx, registration.session_token).await;
    assert_eq!(task.step_name, "start");

    for step in ["step-1-init", "step-2-process", "step-3-finalize"] {
        ctx.handle
            .report_step(
                registration.session_token,
                id,
                step,
                ReportPhase::Started,
                Payload::empty(),
            )
            .await
            .unwrap();
        ctx.clock.advance(Duration::from_millis(100));
        ctx.handle
            .report_step(
                registration.session_token,
                id,
                step,
                ReportPhase::Completed,
                Payload::from("ok"),
            )
            .await
            .unwrap();
    }

    ctx.handle
        .complete_step(
            registration.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("all done")),
        )
        .await
        .unwrap();

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Completed);
    assert_eq!(wf.result, Some(Payload::from("all done")));

    // Reported steps appear in order with non-decreasing timestamps.
    let reported: Vec<&aether_core::StepExecution> =
        wf.steps.iter().filter(|s| s.reported).collect();
    let names: Vec<&str> = reported.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, vec!["step-1-init", "step-2-process", "step-3-finalize"]);
    for pair in reported.windows(2) {
        assert!(pair[1].started_at_ms >= pair[0].started_at_ms);
    }
    for record in reported {
        assert_eq!(record.status, StepStatus::Completed);
    }

    let kinds = drain_kinds(&mut sub);
    assert_eq!(kinds.iter().filter(|k| *k == "step:completed").count(), 4);
    assert_eq!(kinds.last().map(String::as_str), Some("workflow:completed"));
}

#[tokio::test]
async fn duplicate_report_does_not_duplicate_terminal_events() {
    let ctx = setup();
    let mut sub = ctx.bus.subscribe(EventFilter::any());
    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    for _ in 0..2 {
        ctx.handle
            .report_step(
                registration.session_token,
                id,
                "side-step",
                ReportPhase::Completed,
                Payload::from("out"),
            )
            .await
            .unwrap();
    }

    let kinds = drain_kinds(&mut sub);
    assert_eq!(kinds.iter().filter(|k| *k == "step:completed").count(), 1);
}

#[tokio::test]
async fn step_program_dispatches_in_declared_order_chaining_outputs() {
    let ctx = setup();
    let registration = register_with_caps(
        &ctx,
        &["etl"],
        vec![
            aether_core::Capability::step("extract"),
            aether_core::Capability::step("transform"),
            aether_core::Capability::step("load"),
        ],
    )
    .await;

    let id = ctx
        .handle
        .start_workflow("etl", Payload::from("raw"))
        .await
        .unwrap();

    let extract = poll_one(&ctx, registration.session_token).await;
    assert_eq!(extract.step_name, "extract");
    assert_eq!(extract.input, Payload::from("raw"));
    ctx.handle
        .complete_step(
            registration.session_token,
            extract.id,
            StepOutcome::Completed(Payload::from("extracted")),
        )
        .await
        .unwrap();

    let transform = poll_one(&ctx, registration.session_token).await;
    assert_eq!(transform.step_name, "transform");
    assert_eq!(transform.input, Payload::from("extracted"));
    ctx.handle
        .complete_step(
            registration.session_token,
            transform.id,
            StepOutcome::Completed(Payload::from("transformed")),
        )
        .await
        .unwrap();

    let load = poll_one(&ctx, registration.session_token).await;
    assert_eq!(load.step_name, "load");
    ctx.handle
        .complete_step(
            registration.session_token,
            load.id,
            StepOutcome::Completed(Payload::from("loaded")),
        )
        .await
        .unwrap();

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Completed);
    assert_eq!(wf.result, Some(Payload::from("loaded")));
    assert_eq!(wf.steps.len(), 3);
}

#[tokio::test]
async fn counters_track_dispatch_and_completion() {
    let ctx = setup();
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
            StepOutcome::Completed(Payload::empty()),
        )
        .await
        .unwrap();

    let snapshot = ctx.handle.counters().snapshot();
    assert_eq!(snapshot.workflows_started, 1);
    assert_eq!(snapshot.workflows_completed, 1);
    assert_eq!(snapshot.tasks_dispatched, 1);
    assert_eq!(snapshot.tasks_completed, 1);
}
