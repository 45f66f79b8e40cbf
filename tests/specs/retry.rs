// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scenario: retry on failure until the budget is spent.

use super::prelude::*;

use std::time::Duration;

use aether_core::{PersistenceMode, StepStatus, WorkflowState};
use aether_daemon::{AwaitOutcomeDto, Response};
use tempfile::tempdir;

#[tokio::test]
async fn three_failures_fail_the_workflow() {
    let dir = tempdir().unwrap();
    // max_retries = 3, no backoff.
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["flaky"]).await;

    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("flaky", "input").await;

    for attempt in 1..=3u32 {
        let task = worker.poll_until(&session, Duration::from_secs(2)).await;
        assert_eq!(task.attempt, attempt);
        assert_eq!(task.retry.max_retries, 3);
        worker
            .complete_err(&session, &task.task_id, &format!("error on {attempt}"))
            .await;
    }

    match client.await_result(&workflow_id, 5_000).await {
        Response::AwaitResult { outcome: AwaitOutcomeDto::Failed { error } } => {
            assert_eq!(error, "error on 3");
        }
        other => panic!("unexpected: {other:?}"),
    }

    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Failed);
    assert_eq!(detail.steps.len(), 3);
    for (i, record) in detail.steps.iter().enumerate() {
        assert_eq!(record.attempt as usize, i + 1);
        assert_eq!(record.status, StepStatus::Failed);
    }

    // Nothing left for workers.
    let tasks = worker.poll(&session, 5).await;
    assert!(tasks.is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn success_after_one_failure_completes() {
    let dir = tempdir().unwrap();
    let server = start_server(PersistenceMode::Memory, dir.path()).await;

    let mut worker = Conn::open(&server).await;
    let session = worker.register(vec![], &["flaky"]).await;
    let mut client = Conn::open(&server).await;
    let workflow_id = client.start("flaky", "input").await;

    let first = worker.poll_until(&session, Duration::from_secs(2)).await;
    worker.complete_err(&session, &first.task_id, "transient").await;

    let retry = worker.poll_until(&session, Duration::from_secs(2)).await;
    assert_eq!(retry.attempt, 2);
    worker.complete_ok(&session, &retry.task_id, "second time lucky").await;

    let detail = client.detail(&workflow_id).await;
    assert_eq!(detail.state, WorkflowState::Completed);
    assert_eq!(detail.steps.len(), 2);
    assert_eq!(detail.steps[0].status, StepStatus::Failed);
    assert_eq!(detail.steps[1].status, StepStatus::Completed);

    server.shutdown().await;
}
