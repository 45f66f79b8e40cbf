// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn info(capabilities: Vec<Capability>) -> WorkerInfo {
    WorkerInfo {
        worker_id: WorkerId::from("wkr-1"),
        service_name: "svc".into(),
        group: "default".into(),
        capabilities,
        workflow_types: vec!["greet".into(), "etl".into()],
        session: SessionToken::from("sess-1"),
        state: SessionState::Active,
        last_heartbeat_ms: 0,
    }
}

#[test]
fn advertises_matches_types() {
    let w = info(vec![]);
    assert!(w.advertises("greet"));
    assert!(!w.advertises("other"));
}

#[test]
fn step_program_preserves_declaration_order() {
    let w = info(vec![
        Capability::step("extract"),
        Capability { name: "aux".into(), kind: CapabilityKind::Activity },
        Capability::step("transform"),
        Capability::step("load"),
    ]);
    assert_eq!(w.step_program(), vec!["extract", "transform", "load"]);
    assert!(!w.drives_body());
}

#[test]
fn workflow_capability_selects_body_mode() {
    let w = info(vec![Capability::workflow("greet")]);
    assert!(w.drives_body());
    assert!(w.step_program().is_empty());
}

#[test]
fn capability_serde_uses_snake_case_kinds() {
    let json = serde_json::to_value(Capability::step("s1")).unwrap();
    assert_eq!(json["kind"], "step");
    let json = serde_json::to_value(Capability::workflow("w1")).unwrap();
    assert_eq!(json["kind"], "workflow");
}
