// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn task_id_has_prefix() {
    let id = TaskId::new();
    assert!(id.as_str().starts_with("task-"));
}

#[parameterized(
    first = { 1, 500 },
    second = { 2, 1_000 },
    third = { 3, 2_000 },
    capped = { 12, 30_000 },
)]
fn exponential_backoff_doubles_to_cap(failures: u32, expected_ms: u64) {
    let backoff = Backoff::Exponential { base_ms: 500, cap_ms: 30_000 };
    assert_eq!(backoff.delay_ms(failures), expected_ms);
}

#[test]
fn fixed_and_none_backoff() {
    assert_eq!(Backoff::Fixed { delay_ms: 250 }.delay_ms(5), 250);
    assert_eq!(Backoff::None.delay_ms(5), 0);
}

#[test]
fn exponential_never_overflows() {
    let backoff = Backoff::Exponential { base_ms: u64::MAX / 2, cap_ms: u64::MAX };
    assert_eq!(backoff.delay_ms(40), u64::MAX);
}

#[test]
fn default_policy_allows_three_attempts() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_retries, 3);
}

#[test]
fn task_roundtrips_through_spec() {
    let spec = TaskSpec {
        workflow_id: WorkflowId::from("wf-1"),
        workflow_type: "greet".into(),
        step_name: "start".into(),
        attempt: 2,
        input: Payload::from("in"),
        retry: RetryPolicy::default(),
    };
    let task = Task::from_spec(TaskId::from("task-9"), spec.clone());

    assert_eq!(task.spec(), spec);
    assert_eq!(task.id, "task-9");
}

#[test]
fn spec_key_ignores_input() {
    let mut spec = TaskSpec {
        workflow_id: WorkflowId::from("wf-1"),
        workflow_type: "greet".into(),
        step_name: "start".into(),
        attempt: 1,
        input: Payload::from("a"),
        retry: RetryPolicy::default(),
    };
    let key = (spec.workflow_id, "start", 1);
    assert_eq!(spec.key(), (key.0, key.1, key.2));

    spec.input = Payload::from("b");
    assert_eq!(spec.key(), (key.0, key.1, key.2));
}
