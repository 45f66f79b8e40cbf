// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: cancel mid-run, acknowledged and forced variants.

use super::prelude::*;

use std::time::Duration;

use aether_core::{PersistenceMode, StepStatus, WorkflowState};
use aether_daemon::{CancelOutcomeDto, Request, Response};
use tempfile::tempdir;

/// Long liveness windows so only the cancel deadline fires.
fn cancel_config(db: &std::path::Path) -> aether_core::Config {
    let mut config = spec_config(PersistenceMode::Memory, db);
    config.timeouts.heartbeat_ms = 60_000;
    config.timeouts.visibility_ms = 60_000;
    config.timeouts.cancel_deadline_ms = 700;
    config
}

async fn cancel(client: &mut Conn, workflow_id: &str) -> CancelOutcomeDto {
    match client
        .request(&Request::CancelWorkflow { workflow_id: workflow_id.into() })
        .await
    {
        Response::CancelResult { outcome } => outcome,
        other => panic!("cancel failed: {other:?}"),
    }
}

#[tokio::test]
async fn worker_acknowledges_cancel_within_deadline() {
    let dir = tempdir().unwrap();
    let server = start_server_with(cancel_config(dir.path())).await;

    let mut control = Conn::open(&server).await;
    let session = control.register(vec![], &["process"]).await;
    let mut stream = Conn::open(&server).await;
    stream.open_task_stream(&session).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("process", "work").await;

    let Some(Response::Task { task }) = stream.next_frame(Duration::from_secs(2)).await else {
        panic!("expected task push");
    };

    assert_eq!(cancel(&mut client, &workflow_id).await, CancelOutcomeDto::Accepted);

    // The cancellation notice arrives on the task stream.
    let Some(Response::CancelTask { workflow_id: cancelled_id, task_id }) =
        stream.next_frame(Duration::from_secs(2)).await
    else {
        panic!("expected cancel push");
    };
    assert_eq!(cancelled_id, workflow_id);
    assert_eq!(task_id, task.task_id);

    control.complete_cancelled(&session, &task.task_id).await;

    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Cancelled);
    assert_eq!(detail.steps[0].status, StepStatus::Cancelled);

    server.shutdown().await;
}

#[tokio::test]
async fn deadline_elapsing_forces_the_cancel() {
    let dir = tempdir().unwrap();
    let server = start_server_with(cancel_config(dir.path())).await;

    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["process"]).await;
    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("process", "work").await;
    let task = worker.poll_until(&session, Duration::from_secs(2)).await;

    assert_eq!(cancel(&mut client, &workflow_id).await, CancelOutcomeDto::Accepted);

    // Worker never acknowledges; the deadline (700ms) forces it.
    let cancelled = wait_for(Duration::from_secs(3), || async {
        let mut probe = Conn::open(&server).await;
        probe.detail(&workflow_id).await.state == WorkflowState::Cancelled
    })
    .await;
    assert!(cancelled, "cancel deadline never fired");

    // The abandoned step record remains Running...
    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.steps[0].status, StepStatus::Running);

    // ...until the worker eventually reports it; the late completion is
    // recorded for audit without changing workflow state.
    worker.complete_ok(&session, &task.task_id, "too late").await;
    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Cancelled);
    assert_eq!(detail.steps[0].status, StepStatus::Completed);

    server.shutdown().await;
}

#[tokio::test]
async fn cancelling_a_completed_workflow_is_already_terminal() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["greet"]).await;
    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("greet", "World").await;

    let task = worker.poll_until(&session, Duration::from_secs(2)).await;
    worker.complete_ok(&session, &task.task_id, "done").await;

    assert_eq!(
        cancel(&mut client, &workflow_id).await,
        CancelOutcomeDto::AlreadyTerminal
    );

    // No effect.
    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Completed);

    server.shutdown().await;
}

#[tokio::test]
async fn cancelling_a_queued_workflow_needs_no_worker() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("process", "never picked up").await;

    assert_eq!(cancel(&mut client, &workflow_id).await, CancelOutcomeDto::Accepted);

    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Cancelled);
    assert_eq!(detail.steps[0].status, StepStatus::Cancelled);

    server.shutdown().await;
}
