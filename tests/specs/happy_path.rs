// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: single-step happy path, and the multi-step reported flow.

use super::prelude::*;

use std::time::Duration;

use aether_core::{Capability, PersistenceMode, ReportPhase, StepStatus, WorkflowState};
use aether_daemon::{AwaitOutcomeDto, Request, Response};
use tempfile::tempdir;

#[tokio::test]
async fn single_step_happy_path() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["greet"]).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("greet", "World").await;

    let task = worker.poll_until(&session, Duration::from_secs(2)).await;
    assert_eq!(task.workflow_id, workflow_id);
    assert_eq!(task.workflow_type, "greet");
    assert_eq!(task.step_name, "start");
    assert_eq!(task.input.as_utf8(), Some("World"));

    worker
        .complete_ok(&session, &task.task_id, "Hello, World!")
        .await;

    match client.await_result(&workflow_id, 5_000).await {
        Response::AwaitResult { outcome: AwaitOutcomeDto::Completed { result } } => {
            assert_eq!(result.as_utf8(), Some("Hello, World!"));
        }
        other => panic!("unexpected await response: {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn multi_step_reported_workflow() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    // The worker runs the workflow body itself and reports each step.
    let mut worker = Conn::open(&server).await;
    let session = worker
        .register(vec![Capability::workflow("slow-process")], &["slow-process"])
        .await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("slow-process", "input").await;

    let task = worker.poll_until(&session, Duration::from_secs(2)).await;
    let steps = ["step-1-init", "step-2-process", "step-3-finalize"];
    for step in steps {
        worker
            .report(&session, &workflow_id, step, ReportPhase::Started, "")
            .await;
        worker
            .report(&session, &workflow_id, step, ReportPhase::Completed, "ok")
            .await;
    }
    worker.complete_ok(&session, &task.task_id, "finished").await;

    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Completed);

    // The reported step executions are recorded in listed order with
    // monotonically non-decreasing timestamps.
    let reported: Vec<_> = detail.steps.iter().filter(|s| s.reported).collect();
    let names: Vec<&str> = reported.iter().map(|s| s.step_name.as_str()).collect();
    assert_eq!(names, steps);
    for record in &reported {
        assert_eq!(record.status, StepStatus::Completed);
        assert!(record.completed_at_ms.unwrap() >= record.started_at_ms);
    }
    for pair in reported.windows(2) {
        assert!(pair[1].started_at_ms >= pair[0].started_at_ms);
    }

    server.shutdown().await;
}

#[tokio::test]
async fn await_with_zero_timeout_and_status_queries() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("greet", "World").await;

    // Not terminal yet: still-running, immediately.
    match client.await_result(&workflow_id, 0).await {
        Response::AwaitResult { outcome: AwaitOutcomeDto::StillRunning } => {}
        other => panic!("unexpected: {other:?}"),
    }

    match client
        .request(&Request::GetWorkflowStatus { workflow_id: workflow_id.clone() })
        .await
    {
        Response::WorkflowStatus { status } => {
            assert_eq!(status.state, WorkflowState::Pending);
            assert_eq!(status.current_step.as_deref(), Some("start"));
        }
        other => panic!("unexpected: {other:?}"),
    }

    // Unknown ids surface the not-found taxonomy over the wire.
    match client
        .request(&Request::GetWorkflowStatus { workflow_id: "wf-missing".into() })
        .await
    {
        Response::Error { kind, .. } => assert_eq!(kind, aether_core::ErrorKind::NotFound),
        other => panic!("unexpected: {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn streaming_claim_delivers_tasks() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut control = Conn::open(&server).await;
    let session = control.register(vec![], &["greet"]).await;

    let mut stream = Conn::open(&server).await;
    stream.open_task_stream(&session).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("greet", "streamed").await;

    let frame = stream
        .next_frame(Duration::from_secs(2))
        .await
        .expect("task frame");
    let Response::Task { task } = frame else {
        panic!("expected Task frame, got {frame:?}");
    };
    assert_eq!(task.workflow_id, workflow_id);

    // Completion goes over the control connection.
    control
        .complete_ok(&session, &task.task_id, "via stream")
        .await;
    match client.await_result(&workflow_id, 5_000).await {
        Response::AwaitResult { outcome: AwaitOutcomeDto::Completed { result } } => {
            assert_eq!(result.as_utf8(), Some("via stream"));
        }
        other => panic!("unexpected: {other:?}"),
    }

    server.shutdown().await;
}
