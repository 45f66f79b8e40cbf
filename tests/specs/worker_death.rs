// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: worker death mid-step.

use super::prelude::*;

use std::time::Duration;

use aether_core::{PersistenceMode, StepStatus, WorkflowState};
use aether_daemon::{AwaitOutcomeDto, Response};
use tempfile::tempdir;

#[tokio::test]
async fn dead_worker_task_is_redelivered_with_new_attempt() {
    let dir = tempdir().unwrap();
    // heartbeat_ms = 500, sweep every 50ms.
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut doomed = Conn::open(&server).await;
    let doomed_session = doomed.register(vec![], &["greet"]).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("greet", "payload").await;

    let first = doomed.poll_until(&doomed_session, Duration::from_secs(2)).await;
    assert_eq!(first.attempt, 1);

    // Heartbeats stop for well over the timeout; the sweep marks the
    // worker dead and releases its claim.
    tokio::time::sleep(Duration::from_millis(1_100)).await;

    let mut replacement = Conn::open(&server).await;
    let replacement_session = replacement.register(vec![], &["greet"]).await;
    let second = replacement
        .poll_until(&replacement_session, Duration::from_secs(2))
        .await;

    assert_eq!(second.workflow_id, workflow_id);
    assert_eq!(second.step_name, "start");
    assert_eq!(second.attempt, 2);
    assert_ne!(second.task_id, first.task_id);

    // The original Running record is closed out as worker-lost.
    let detail = client.detail(&workflow_id).await;
    let lost = detail
        .steps
        .iter()
        .find(|s| s.attempt == 1)
        .expect("first attempt record");
    assert_eq!(lost.status, StepStatus::Failed);
    assert_eq!(lost.error.as_deref(), Some("worker lost"));

    // The replacement finishes the workflow.
    replacement
        .complete_ok(&replacement_session, &second.task_id, "recovered")
        .await;
    match client.await_result(&workflow_id, 5_000).await {
        Response::AwaitResult { outcome: AwaitOutcomeDto::Completed { result } } => {
            assert_eq!(result.as_utf8(), Some("recovered"));
        }
        other => panic!("unexpected: {other:?}"),
    }
    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Completed);

    server.shutdown().await;
}

#[tokio::test]
async fn session_heartbeats_keep_a_slow_worker_alive() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["greet"]).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("greet", "slow").await;
    let task = worker.poll_until(&session, Duration::from_secs(2)).await;

    // Stay alive past several heartbeat windows by heartbeating both the
    // session and the claimed task.
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(300)).await;
        let response = worker
            .request(&aether_daemon::Request::Heartbeat {
                session_token: Some(session.clone()),
                task_id: None,
            })
            .await;
        assert_eq!(response, Response::Ok);
        let response = worker
            .request(&aether_daemon::Request::Heartbeat {
                session_token: None,
                task_id: Some(task.task_id.clone()),
            })
            .await;
        assert_eq!(response, Response::Ok);
    }

    // The claim was never released: the late completion still lands.
    worker.complete_ok(&session, &task.task_id, "slow but done").await;
    match client.await_result(&workflow_id, 5_000).await {
        Response::AwaitResult { outcome: AwaitOutcomeDto::Completed { result } } => {
            assert_eq!(result.as_utf8(), Some("slow but done"));
        }
        other => panic!("unexpected: {other:?}"),
    }

    server.shutdown().await;
}
