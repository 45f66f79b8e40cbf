// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: crash recovery on the state-action-log tier.

use super::prelude::*;

use std::collections::HashMap;
use std::time::Duration;

use aether_core::{PersistenceMode, WorkflowState};
use aether_daemon::Response;
use tempfile::tempdir;

#[tokio::test]
async fn crash_and_restart_preserves_all_workflows() {
    let dir = tempdir().unwrap();

    // First life: ten workflows, five completed, five left mid-flight.
    let mut expected: HashMap<String, WorkflowState> = HashMap::new();
    {
        let server = start_server(PersistenceMode::StateActionLog, dir.path()).await;
        let mut worker = Conn::open(&server).await;
        let session = worker.register(vec![], &["recoverable"]).await;
        let mut client = Conn::open(&server).await;

        for i in 0..10 {
            let workflow_id = client.start("recoverable", &format!("input-{i}")).await;
            if i < 5 {
                let task = worker.poll_until(&session, Duration::from_secs(2)).await;
                worker
                    .complete_ok(&session, &task.task_id, &format!("output-{i}"))
                    .await;
                expected.insert(workflow_id, WorkflowState::Completed);
            } else {
                expected.insert(workflow_id, WorkflowState::Pending);
            }
        }

        // Kill without flushing: the action log alone must carry this.
        server.abort();
    }

    // Second life: identical states, then the partial five make progress
    // when a worker reconnects.
    let server = start_server(PersistenceMode::StateActionLog, dir.path()).await;
    let mut client = Conn::open(&server).await;

    let all = client.list_all().await;
    assert_eq!(all.len(), 10);
    for summary in &all {
        let want = expected.get(&summary.workflow_id).expect("known workflow");
        assert_eq!(
            summary.state, *want,
            "workflow {} changed state across the crash",
            summary.workflow_id
        );
    }

    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["recoverable"]).await;
    for _ in 0..5 {
        let task = worker.poll_until(&session, Duration::from_secs(2)).await;
        worker.complete_ok(&session, &task.task_id, "resumed").await;
    }

    let all = client.list_all().await;
    assert!(all.iter().all(|s| s.state == WorkflowState::Completed));

    server.shutdown().await;
}

#[tokio::test]
async fn claimed_task_survives_crash_and_is_redispatched() {
    let dir = tempdir().unwrap();
    let workflow_id;
    {
        let server = start_server(PersistenceMode::StateActionLog, dir.path()).await;
        let mut worker = Conn::open(&server).await;
        let session = worker.register(vec![], &["recoverable"]).await;
        let mut client = Conn::open(&server).await;
        workflow_id = client.start("recoverable", "mid-flight").await;

        // Claimed and running at crash time.
        let task = worker.poll_until(&session, Duration::from_secs(2)).await;
        assert_eq!(task.attempt, 1);
        server.abort();
    }

    let server = start_server(PersistenceMode::StateActionLog, dir.path()).await;
    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["recoverable"]).await;

    let task = worker.poll_until(&session, Duration::from_secs(2)).await;
    assert_eq!(task.workflow_id, workflow_id);
    assert_eq!(task.attempt, 1, "recovery reuses the surviving attempt");

    worker.complete_ok(&session, &task.task_id, "after crash").await;

    let mut client = Conn::open(&server).await;
    match client.await_result(&workflow_id, 5_000).await {
        Response::AwaitResult {
            outcome: aether_daemon::AwaitOutcomeDto::Completed { result },
        } => assert_eq!(result.as_utf8(), Some("after crash")),
        other => panic!("unexpected: {other:?}"),
    }

    server.shutdown().await;
}

#[tokio::test]
async fn snapshot_tier_restores_checkpointed_state() {
    let dir = tempdir().unwrap();
    let workflow_id;
    {
        // snapshot_interval_ms = 100 and the sweep runs every 50ms, so a
        // short wait guarantees a checkpoint.
        let server = start_server(PersistenceMode::Snapshot, dir.path()).await;
        let mut worker = Conn::open(&server).await;
        let session = worker.register(vec![], &["snap"]).await;
        let mut client = Conn::open(&server).await;
        workflow_id = client.start("snap", "snapshot me").await;
        let task = worker.poll_until(&session, Duration::from_secs(2)).await;
        worker.complete_ok(&session, &task.task_id, "checkpointed").await;

        tokio::time::sleep(Duration::from_millis(400)).await;
        server.abort();
    }

    let server = start_server(PersistenceMode::Snapshot, dir.path()).await;
    let mut client = Conn::open(&server).await;
    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Completed);
    assert_eq!(detail.result.unwrap().as_utf8(), Some("checkpointed"));

    server.shutdown().await;
}

#[tokio::test]
async fn second_coordinator_on_the_same_db_is_rejected() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let err = aether_daemon::Server::start(spec_config(PersistenceMode::Memory, dir.path()))
        .await
        .err()
        .expect("second start must fail");
    assert!(matches!(err, aether_daemon::ServerError::Locked(_)));

    server.shutdown().await;
}
