// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::action::WorkflowAction;
use yare::parameterized;

fn workflow() -> Workflow {
    Workflow::new(WorkflowId::from("wf-test"), "greet", Payload::from("World"), 1_000)
}

#[test]
fn new_workflow_is_pending() {
    let wf = workflow();
    assert_eq!(wf.state, WorkflowState::Pending);
    assert_eq!(wf.current_step, None);
    assert!(wf.steps.is_empty());
    assert!(!wf.is_terminal());
}

#[test]
fn workflow_id_has_prefix() {
    let id = WorkflowId::new();
    assert!(id.as_str().starts_with("wf-"));
    assert_eq!(id.as_str().len(), 21);
}

#[test]
fn workflow_id_serde_is_transparent() {
    let id = WorkflowId::from("wf-abc");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"wf-abc\"");
}

#[parameterized(
    completed = { WorkflowState::Completed },
    failed = { WorkflowState::Failed },
    cancelled = { WorkflowState::Cancelled },
)]
fn terminal_states(state: WorkflowState) {
    assert!(state.is_terminal());
}

#[parameterized(
    pending = { WorkflowState::Pending },
    running = { WorkflowState::Running },
)]
fn non_terminal_states(state: WorkflowState) {
    assert!(!state.is_terminal());
}

#[test]
fn state_parses_from_str() {
    assert_eq!("running".parse::<WorkflowState>().unwrap(), WorkflowState::Running);
    assert!("bogus".parse::<WorkflowState>().is_err());
}

#[test]
fn step_finalize_is_guarded() {
    let mut record = StepExecution {
        step_name: "start".into(),
        attempt: 1,
        status: StepStatus::Running,
        started_at_ms: 100,
        completed_at_ms: None,
        input: Payload::empty(),
        output: None,
        error: None,
        reported: false,
    };

    record.finalize(StepStatus::Completed, 200);
    assert_eq!(record.status, StepStatus::Completed);
    assert_eq!(record.completed_at_ms, Some(200));

    // A second finalization must not overwrite the first.
    record.finalize(StepStatus::Failed, 300);
    assert_eq!(record.status, StepStatus::Completed);
    assert_eq!(record.completed_at_ms, Some(200));
}

#[test]
fn step_finalize_clamps_completed_at() {
    let mut record = StepExecution {
        step_name: "start".into(),
        attempt: 1,
        status: StepStatus::Running,
        started_at_ms: 500,
        completed_at_ms: None,
        input: Payload::empty(),
        output: None,
        error: None,
        reported: false,
    };

    // completed-at must never precede started-at.
    record.finalize(StepStatus::Failed, 400);
    assert_eq!(record.completed_at_ms, Some(500));
}

#[test]
fn latest_attempt_tracks_max() {
    let mut wf = workflow();
    assert_eq!(wf.latest_attempt("start"), 0);

    wf.apply(&WorkflowAction::StepEnqueued {
        step: "start".into(),
        attempt: 1,
        input: Payload::empty(),
        at_ms: 1,
    });
    wf.apply(&WorkflowAction::StepEnqueued {
        step: "start".into(),
        attempt: 2,
        input: Payload::empty(),
        at_ms: 2,
    });

    assert_eq!(wf.latest_attempt("start"), 2);
    assert_eq!(wf.steps.len(), 2);
}

#[test]
fn serde_roundtrip_preserves_steps() {
    let mut wf = workflow();
    wf.apply(&WorkflowAction::StepEnqueued {
        step: "start".into(),
        attempt: 1,
        input: Payload::from("in"),
        at_ms: 10,
    });
    wf.apply(&WorkflowAction::StepStarted { step: "start".into(), attempt: 1, at_ms: 20 });

    let json = serde_json::to_string(&wf).unwrap();
    let back: Workflow = serde_json::from_str(&json).unwrap();

    assert_eq!(back.id, wf.id);
    assert_eq!(back.state, wf.state);
    assert_eq!(back.steps, wf.steps);
    assert_eq!(back.current_step, wf.current_step);
}
