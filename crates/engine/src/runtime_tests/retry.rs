// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry policy behavior.

use super::*;
use aether_core::{EventFilter, StepStatus, WorkflowState};

#[tokio::test]
async fn three_failures_exhaust_the_budget() {
    let ctx = setup(); // max_retries = 3, no backoff
    let mut sub = ctx.bus.subscribe(EventFilter::any());
    let registration = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();

    for expected_attempt in 1..=3u32 {
        let task = poll_one(&ctx, registration.session_token).await;
        assert_eq!(task.attempt, expected_attempt);
        ctx.handle
            .complete_step(
                registration.session_token,
                task.id,
                StepOutcome::Failed(format!("boom {expected_attempt}")),
            )
            .await
            .unwrap();
    }

    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Failed);
    assert_eq!(wf.error.as_deref(), Some("boom 3"));
    assert_eq!(wf.steps.len(), 3);
    for (i, record) in wf.steps.iter().enumerate() {
        assert_eq!(record.attempt as usize, i + 1);
        assert_eq!(record.status, StepStatus::Failed);
    }

    // Exactly one workflow:failed, emitted at the final transition.
    let kinds = drain_kinds(&mut sub);
    assert_eq!(kinds.iter().filter(|k| *k == "workflow:failed").count(), 1);
    assert_eq!(kinds.last().map(String::as_str), Some("workflow:failed"));

    // Nothing left to poll.
    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());
}

#[tokio::test]
async fn backoff_delays_the_next_attempt() {
    let ctx = setup_with(RuntimeConfig {
        retry: RetryPolicy {
            max_retries: 3,
            backoff: Backoff::Fixed { delay_ms: 5_000 },
        },
        ..test_config()
    });
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
            StepOutcome::Failed("flaky".into()),
        )
        .await
        .unwrap();

    // The retry is parked until the backoff elapses.
    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());

    advance_and_tick(&ctx, 4_999).await;
    let tasks = ctx
        .handle
        .poll_tasks(registration.session_token, 5)
        .await
        .unwrap();
    assert!(tasks.is_empty());

    advance_and_tick(&ctx, 1).await;
    let retry = poll_one(&ctx, registration.session_token).await;
    assert_eq!(retry.attempt, 2);
}

#[tokio::test]
async fn worker_loss_does_not_consume_the_retry_budget() {
    let ctx = setup_with(RuntimeConfig {
        retry: RetryPolicy { max_retries: 1, backoff: Backoff::None },
        ..test_config()
    });
    let lost = register(&ctx, &["greet"]).await;
    let id = ctx
        .handle
        .start_workflow("greet", Payload::from("in"))
        .await
        .unwrap();
    poll_one(&ctx, lost.session_token).await;

    // Lose the worker: redelivery even though max_retries is already 1.
    advance_and_tick(&ctx, 31_000).await;

    let replacement = register(&ctx, &["greet"]).await;
    let task = poll_one(&ctx, replacement.session_token).await;
    assert_eq!(task.attempt, 2);

    ctx.handle
        .complete_step(
            replacement.session_token,
            task.id,
            StepOutcome::Completed(Payload::from("recovered")),
        )
        .await
        .unwrap();
    let wf = ctx.handle.get_workflow(id).await.unwrap();
    assert_eq!(wf.state, WorkflowState::Completed);

    // One redelivery counted, zero explicit failures.
    assert_eq!(ctx.handle.counters().snapshot().tasks_redelivered, 1);
    assert_eq!(wf.error_attempts("start"), 0);
}

#[tokio::test]
async fn retry_keeps_the_original_input() {
    let ctx = setup();
    let registration = register(&ctx, &["greet"]).await;
    ctx.handle
        .start_workflow("greet", Payload::from("payload-1"))
        .await
        .unwrap();

    let first = poll_one(&ctx, registration.session_token).await;
    ctx.handle
        .complete_step(
            registration.session_token,
            first.id,
            StepOutcome::Failed("try again".into()),
        )
        .await
        .unwrap();

    let second = poll_one(&ctx, registration.session_token).await;
    assert_eq!(second.input, Payload::from("payload-1"));
    assert_eq!(second.retry.max_retries, 3);
}
