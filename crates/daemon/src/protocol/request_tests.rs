// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use aether_core::Payload;

#[test]
fn serializes_with_type_tag() {
    let request = Request::StartWorkflow {
        workflow_type: "greet".into(),
        input: Payload::from("World"),
    };
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["type"], "StartWorkflow");
    assert_eq!(json["workflow_type"], "greet");
}

#[test]
fn complete_step_flattens_the_outcome() {
    let request = Request::CompleteStep {
        session_token: "sess-1".into(),
        task_id: "task-1".into(),
        completion: CompletionDto::Completed { result: Payload::from("out") },
    };
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["type"], "CompleteStep");
    assert_eq!(json["outcome"], "completed");
    assert!(json.get("result").is_some());

    let back: Request = serde_json::from_value(json).unwrap();
    assert_eq!(back, request);
}

#[test]
fn heartbeat_accepts_either_token() {
    let session: Request = serde_json::from_str(
        r#"{"type": "Heartbeat", "session_token": "sess-1"}"#,
    )
    .unwrap();
    assert_eq!(
        session,
        Request::Heartbeat { session_token: Some("sess-1".into()), task_id: None }
    );

    let task: Request =
        serde_json::from_str(r#"{"type": "Heartbeat", "task_id": "task-1"}"#).unwrap();
    assert_eq!(
        task,
        Request::Heartbeat { session_token: None, task_id: Some("task-1".into()) }
    );
}

#[test]
fn list_workflows_filter_defaults_to_all() {
    let request: Request = serde_json::from_str(r#"{"type": "ListWorkflows"}"#).unwrap();
    let Request::ListWorkflows { filter } = request else {
        panic!("wrong variant");
    };
    assert!(!filter.active_only);
    assert!(filter.workflow_type.is_none());
}

#[test]
fn register_without_worker_id() {
    let request: Request = serde_json::from_str(
        r#"{
            "type": "Register",
            "service_name": "svc",
            "group": "default",
            "capabilities": [{"name": "start", "kind": "step"}],
            "workflow_types": ["greet"]
        }"#,
    )
    .unwrap();
    let Request::Register { worker_id, capabilities, .. } = request else {
        panic!("wrong variant");
    };
    assert!(worker_id.is_none());
    assert_eq!(capabilities.len(), 1);
}
