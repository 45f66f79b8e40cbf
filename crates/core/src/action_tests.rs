// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::workflow::WorkflowId;

fn workflow() -> Workflow {
    Workflow::new(WorkflowId::from("wf-1"), "greet", Payload::from("World"), 1_000)
}

fn enqueue(step: &str, attempt: u32) -> WorkflowAction {
    WorkflowAction::StepEnqueued {
        step: step.into(),
        attempt,
        input: Payload::empty(),
        at_ms: 1_000,
    }
}

fn start(step: &str, attempt: u32) -> WorkflowAction {
    WorkflowAction::StepStarted { step: step.into(), attempt, at_ms: 1_100 }
}

#[test]
fn enqueue_then_start_runs_workflow() {
    let mut wf = workflow();

    wf.apply(&enqueue("start", 1));
    assert_eq!(wf.state, WorkflowState::Pending);
    assert_eq!(wf.current_step.as_deref(), Some("start"));
    assert_eq!(wf.steps[0].status, StepStatus::Pending);

    wf.apply(&start("start", 1));
    assert_eq!(wf.state, WorkflowState::Running);
    assert_eq!(wf.steps[0].status, StepStatus::Running);
    assert_eq!(wf.steps[0].started_at_ms, 1_100);
}

#[test]
fn enqueue_is_idempotent_per_attempt() {
    let mut wf = workflow();
    wf.apply(&enqueue("start", 1));
    wf.apply(&enqueue("start", 1));
    assert_eq!(wf.steps.len(), 1);
}

#[test]
fn complete_sets_output_once() {
    let mut wf = workflow();
    wf.apply(&enqueue("start", 1));
    wf.apply(&start("start", 1));

    let complete = WorkflowAction::StepCompleted {
        step: "start".into(),
        attempt: 1,
        output: Payload::from("Hello, World!"),
        at_ms: 1_200,
    };
    wf.apply(&complete);
    wf.apply(&complete);

    let record = wf.step("start", 1).unwrap();
    assert_eq!(record.status, StepStatus::Completed);
    assert_eq!(record.output, Some(Payload::from("Hello, World!")));
    assert_eq!(record.completed_at_ms, Some(1_200));
}

#[test]
fn explicit_failure_counts_against_retries() {
    let mut wf = workflow();
    wf.apply(&enqueue("start", 1));
    wf.apply(&start("start", 1));

    let fail = WorkflowAction::StepFailed {
        step: "start".into(),
        attempt: 1,
        error: "boom".into(),
        worker_lost: false,
        at_ms: 1_200,
    };
    wf.apply(&fail);
    // Re-applying (replay) must not double-count.
    wf.apply(&fail);

    assert_eq!(wf.error_attempts("start"), 1);
    assert_eq!(wf.step("start", 1).unwrap().error.as_deref(), Some("boom"));
}

#[test]
fn worker_lost_failure_does_not_count() {
    let mut wf = workflow();
    wf.apply(&enqueue("start", 1));
    wf.apply(&start("start", 1));
    wf.apply(&WorkflowAction::StepFailed {
        step: "start".into(),
        attempt: 1,
        error: "worker lost".into(),
        worker_lost: true,
        at_ms: 1_200,
    });

    assert_eq!(wf.error_attempts("start"), 0);
    assert_eq!(wf.step("start", 1).unwrap().status, StepStatus::Failed);
}

#[test]
fn terminal_workflow_never_transitions_again() {
    let mut wf = workflow();
    wf.apply(&enqueue("start", 1));
    wf.apply(&start("start", 1));
    wf.apply(&WorkflowAction::Completed { result: Payload::from("done"), at_ms: 2_000 });

    assert_eq!(wf.state, WorkflowState::Completed);

    wf.apply(&WorkflowAction::Failed { error: "late".into(), at_ms: 3_000 });
    wf.apply(&WorkflowAction::Cancelled { at_ms: 3_000 });

    assert_eq!(wf.state, WorkflowState::Completed);
    assert_eq!(wf.result, Some(Payload::from("done")));
    assert_eq!(wf.completed_at_ms, Some(2_000));
}

#[test]
fn cancelled_keeps_running_step_record() {
    let mut wf = workflow();
    wf.apply(&enqueue("process", 1));
    wf.apply(&start("process", 1));
    wf.apply(&WorkflowAction::CancelRequested { at_ms: 1_500 });
    wf.apply(&WorkflowAction::Cancelled { at_ms: 2_000 });

    assert_eq!(wf.state, WorkflowState::Cancelled);
    // The abandoned step stays Running until the worker reports it.
    assert_eq!(wf.step("process", 1).unwrap().status, StepStatus::Running);
    assert_eq!(wf.current_step.as_deref(), Some("process"));
}

#[test]
fn report_after_terminal_is_audit_only() {
    let mut wf = workflow();
    wf.apply(&enqueue("process", 1));
    wf.apply(&start("process", 1));
    wf.apply(&WorkflowAction::Cancelled { at_ms: 2_000 });

    wf.apply(&WorkflowAction::StepReported {
        step: "process".into(),
        phase: ReportPhase::Completed,
        payload: Payload::from("late result"),
        at_ms: 2_500,
    });

    assert_eq!(wf.state, WorkflowState::Cancelled);
    let record = wf.latest_step("process").unwrap();
    assert_eq!(record.status, StepStatus::Completed);
    assert_eq!(record.output, Some(Payload::from("late result")));
}

#[test]
fn reported_steps_append_records() {
    let mut wf = workflow();
    wf.apply(&enqueue("start", 1));
    wf.apply(&start("start", 1));

    for name in ["step-1-init", "step-2-process"] {
        wf.apply(&WorkflowAction::StepReported {
            step: name.into(),
            phase: ReportPhase::Started,
            payload: Payload::empty(),
            at_ms: 1_300,
        });
        wf.apply(&WorkflowAction::StepReported {
            step: name.into(),
            phase: ReportPhase::Completed,
            payload: Payload::from("ok"),
            at_ms: 1_400,
        });
    }

    assert_eq!(wf.steps.len(), 3);
    assert!(wf.steps[1].reported);
    assert_eq!(wf.steps[1].status, StepStatus::Completed);
    // The driving task record is untouched.
    assert_eq!(wf.last_task_step().unwrap().step_name, "start");
}

#[test]
fn report_completion_for_unknown_step_is_recorded() {
    let mut wf = workflow();
    wf.apply(&WorkflowAction::StepReported {
        step: "surprise".into(),
        phase: ReportPhase::Completed,
        payload: Payload::from("out"),
        at_ms: 1_300,
    });

    let record = wf.latest_step("surprise").unwrap();
    assert!(record.reported);
    assert_eq!(record.status, StepStatus::Completed);
}

#[test]
fn report_restart_appends_new_attempt() {
    let mut wf = workflow();
    let started = WorkflowAction::StepReported {
        step: "load".into(),
        phase: ReportPhase::Started,
        payload: Payload::empty(),
        at_ms: 1_300,
    };
    wf.apply(&started);
    wf.apply(&WorkflowAction::StepReported {
        step: "load".into(),
        phase: ReportPhase::Failed,
        payload: Payload::from("io error"),
        at_ms: 1_400,
    });
    wf.apply(&started);

    assert_eq!(wf.latest_attempt("load"), 2);
    assert_eq!(wf.latest_step("load").unwrap().status, StepStatus::Running);
}

#[test]
fn action_serde_roundtrip() {
    let actions = vec![
        enqueue("start", 1),
        start("start", 1),
        WorkflowAction::StepCompleted {
            step: "start".into(),
            attempt: 1,
            output: Payload::from("out"),
            at_ms: 5,
        },
        WorkflowAction::StepFailed {
            step: "start".into(),
            attempt: 1,
            error: "e".into(),
            worker_lost: true,
            at_ms: 5,
        },
        WorkflowAction::StepCancelled { step: "start".into(), attempt: 1, at_ms: 5 },
        WorkflowAction::StepReported {
            step: "s".into(),
            phase: ReportPhase::Started,
            payload: Payload::empty(),
            at_ms: 5,
        },
        WorkflowAction::CancelRequested { at_ms: 5 },
        WorkflowAction::Completed { result: Payload::empty(), at_ms: 5 },
        WorkflowAction::Failed { error: "e".into(), at_ms: 5 },
        WorkflowAction::Cancelled { at_ms: 5 },
    ];

    for action in actions {
        let json = serde_json::to_string(&action).unwrap();
        let back: WorkflowAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action, "roundtrip failed for {json}");
    }
}

#[test]
fn action_kind_matches_serde_tag() {
    let action = WorkflowAction::CancelRequested { at_ms: 5 };
    let json = serde_json::to_value(&action).unwrap();
    assert_eq!(json["kind"], action.name());
}
