// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow identifier, state machine states, and step execution records.

use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;

crate::define_id! {
    /// Unique identifier for a workflow instance.
    ///
    /// Generated at start; referenced by every task, event, and query
    /// touching the workflow.
    pub struct WorkflowId("wf-");
}

/// Lifecycle state of a workflow.
///
/// Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowState::Completed | WorkflowState::Failed | WorkflowState::Cancelled
        )
    }
}

crate::simple_display! {
    WorkflowState {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl std::str::FromStr for WorkflowState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowState::Pending),
            "running" => Ok(WorkflowState::Running),
            "completed" => Ok(WorkflowState::Completed),
            "failed" => Ok(WorkflowState::Failed),
            "cancelled" => Ok(WorkflowState::Cancelled),
            other => Err(format!("unknown workflow state: {other}")),
        }
    }
}

/// Status of a single step attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Cancelled
        )
    }
}

crate::simple_display! {
    StepStatus {
        Pending => "pending",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

/// One record per attempted step of a workflow.
///
/// Attempt records are appended, never overwritten; each retry adds a new
/// record with an incremented attempt number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepExecution {
    pub step_name: String,
    /// 1-based attempt counter, unique per step name.
    pub attempt: u32,
    pub status: StepStatus,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub input: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// True when the record came from a worker's report-step call rather
    /// than a dispatched task.
    #[serde(default)]
    pub reported: bool,
}

impl StepExecution {
    /// Finalize the record once; later finalizations are ignored.
    pub fn finalize(&mut self, status: StepStatus, at_ms: u64) {
        if self.completed_at_ms.is_none() {
            self.status = status;
            self.completed_at_ms = Some(at_ms.max(self.started_at_ms));
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// A workflow execution instance.
///
/// Mutated only through [`crate::action::WorkflowAction`] applied under the
/// engine's per-workflow serialization discipline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    /// Routing key chosen by the client.
    pub workflow_type: String,
    pub input: Payload,
    pub state: WorkflowState,
    /// Name of the currently running or next pending step, if any.
    pub current_step: Option<String>,
    pub steps: Vec<StepExecution>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub cancel_requested: bool,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    #[serde(skip, default = "Instant::now")]
    pub created_at: Instant,
    /// Action sequence number, monotonic per workflow. Advanced by the
    /// store on every applied action; the recovery checkpoint boundary.
    #[serde(default)]
    pub seq: u64,
    /// Explicit error completions per step name. Worker-lost redeliveries
    /// do not count here; only these count against the retry budget.
    #[serde(default)]
    pub error_attempts: HashMap<String, u32>,
}

impl Workflow {
    pub fn new(
        id: WorkflowId,
        workflow_type: impl Into<String>,
        input: Payload,
        at_ms: u64,
    ) -> Self {
        Self {
            id,
            workflow_type: workflow_type.into(),
            input,
            state: WorkflowState::Pending,
            current_step: None,
            steps: Vec::new(),
            result: None,
            error: None,
            cancel_requested: false,
            created_at_ms: at_ms,
            completed_at_ms: None,
            created_at: Instant::now(),
            seq: 0,
            error_attempts: HashMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Find a specific step attempt.
    pub fn step(&self, name: &str, attempt: u32) -> Option<&StepExecution> {
        self.steps
            .iter()
            .find(|s| s.step_name == name && s.attempt == attempt)
    }

    pub(crate) fn step_mut(&mut self, name: &str, attempt: u32) -> Option<&mut StepExecution> {
        self.steps
            .iter_mut()
            .find(|s| s.step_name == name && s.attempt == attempt)
    }

    /// Most recent record for a step name, regardless of attempt.
    pub fn latest_step(&self, name: &str) -> Option<&StepExecution> {
        self.steps.iter().rev().find(|s| s.step_name == name)
    }

    pub(crate) fn latest_step_mut(&mut self, name: &str) -> Option<&mut StepExecution> {
        self.steps.iter_mut().rev().find(|s| s.step_name == name)
    }

    /// Highest attempt number seen for a step name (0 if never attempted).
    pub fn latest_attempt(&self, name: &str) -> u32 {
        self.steps
            .iter()
            .filter(|s| s.step_name == name)
            .map(|s| s.attempt)
            .max()
            .unwrap_or(0)
    }

    /// The single Running step, if one exists (invariant: at most one).
    pub fn running_step(&self) -> Option<&StepExecution> {
        self.steps.iter().find(|s| s.status == StepStatus::Running)
    }

    /// Last step record appended, reported or not.
    pub fn last_step(&self) -> Option<&StepExecution> {
        self.steps.last()
    }

    /// Last record created by a dispatched task (skips reported records).
    pub fn last_task_step(&self) -> Option<&StepExecution> {
        self.steps.iter().rev().find(|s| !s.reported)
    }

    /// Explicit error completions recorded for a step name.
    pub fn error_attempts(&self, name: &str) -> u32 {
        self.error_attempts.get(name).copied().unwrap_or(0)
    }
}

#[cfg(test)]
#[path = "workflow_tests.rs"]
mod tests;
