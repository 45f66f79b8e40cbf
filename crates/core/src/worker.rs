// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker registration records and capabilities.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier for a registered worker process.
    pub struct WorkerId("wkr-");
}

crate::define_id! {
    /// Capability granted at registration; required on all subsequent
    /// worker operations so a stale worker cannot act.
    pub struct SessionToken("sess-");
}

/// Kind of work a capability advertises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Step,
    Activity,
    Workflow,
}

crate::simple_display! {
    CapabilityKind {
        Step => "step",
        Activity => "activity",
        Workflow => "workflow",
    }
}

/// An advertised (name, kind) pair a worker is willing to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub kind: CapabilityKind,
}

impl Capability {
    pub fn step(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: CapabilityKind::Step }
    }

    pub fn workflow(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: CapabilityKind::Workflow }
    }
}

/// Liveness state of a worker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Draining,
    Dead,
}

crate::simple_display! {
    SessionState {
        Active => "active",
        Draining => "draining",
        Dead => "dead",
    }
}

/// Registration record for one worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub worker_id: WorkerId,
    pub service_name: String,
    pub group: String,
    pub capabilities: Vec<Capability>,
    /// Workflow types this worker accepts tasks for (routing granularity).
    pub workflow_types: Vec<String>,
    pub session: SessionToken,
    pub state: SessionState,
    pub last_heartbeat_ms: u64,
}

impl WorkerInfo {
    pub fn advertises(&self, workflow_type: &str) -> bool {
        self.workflow_types.iter().any(|t| t == workflow_type)
    }

    /// Declared step program: Step capabilities in declaration order.
    pub fn step_program(&self) -> Vec<String> {
        self.capabilities
            .iter()
            .filter(|c| c.kind == CapabilityKind::Step)
            .map(|c| c.name.clone())
            .collect()
    }

    /// True when the worker runs workflow bodies itself (drives progress
    /// through report-step instead of per-step tasks).
    pub fn drives_body(&self) -> bool {
        self.capabilities
            .iter()
            .any(|c| c.kind == CapabilityKind::Workflow)
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
