// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use aether_core::Payload;

#[test]
fn request_shapes_use_type_tags() {
    let cases = [
        (r#"{"type": "ListActiveWorkflows"}"#, MonitorRequest::ListActiveWorkflows),
        (r#"{"type": "ListAllWorkflows"}"#, MonitorRequest::ListAllWorkflows),
        (
            r#"{"type": "GetWorkflow", "workflow_id": "wf-1"}"#,
            MonitorRequest::GetWorkflow { workflow_id: "wf-1".into() },
        ),
        (
            r#"{"type": "GetWorkflowHistory", "workflow_id": "wf-1"}"#,
            MonitorRequest::GetWorkflowHistory { workflow_id: "wf-1".into() },
        ),
    ];
    for (json, expected) in cases {
        let parsed: MonitorRequest = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, expected);
    }
}

#[test]
fn error_response_shape() {
    let response = MonitorResponse::Error { message: "nope".into() };
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["type"], "Error");
    assert_eq!(json["message"], "nope");
}

#[test]
fn pushed_event_uses_snake_case_fields() {
    let event = LifecycleEvent::StepCompleted {
        workflow_id: WorkflowId::from("wf-1"),
        workflow_type: "greet".into(),
        step: "start".into(),
        attempt: 2,
        at_ms: 42,
        output: Payload::from("Hello"),
    };

    let monitor_event = MonitorEvent::from_lifecycle(&event);
    let json = serde_json::to_value(&monitor_event).unwrap();

    assert_eq!(json["event_type"], "step:completed");
    assert_eq!(json["workflow_id"], "wf-1");
    assert_eq!(json["workflow_type"], "greet");
    assert_eq!(json["timestamp"], 42);
    assert_eq!(json["payload"]["step_name"], "start");
    assert_eq!(json["payload"]["attempt"], 2);
}

#[test]
fn gap_marker_reports_missed_count() {
    let gap = MonitorEvent::gap(17);
    assert_eq!(gap.event_type, "events:gap");
    assert_eq!(gap.payload["missed"], 17);
    assert!(gap.workflow_id.is_empty());
}

#[test]
fn workflow_started_payload_carries_input() {
    let event = LifecycleEvent::WorkflowStarted {
        workflow_id: WorkflowId::from("wf-1"),
        workflow_type: "greet".into(),
        at_ms: 1,
        input: Payload::from("World"),
    };
    let json = serde_json::to_value(MonitorEvent::from_lifecycle(&event)).unwrap();
    // Payloads travel as base64 strings on every JSON surface.
    assert_eq!(json["payload"]["input"], "V29ybGQ=");
}
