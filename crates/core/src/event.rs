// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lifecycle events broadcast to monitor subscribers.
//!
//! Events are immutable facts emitted after a state change commits to
//! persistence. Delivery is best-effort; the persisted state remains the
//! source of truth.
//!
//! Serializes with `{"type": "workflow:started", ...fields}` format.

use crate::payload::Payload;
use crate::workflow::WorkflowId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LifecycleEvent {
    #[serde(rename = "workflow:started")]
    WorkflowStarted {
        workflow_id: WorkflowId,
        workflow_type: String,
        at_ms: u64,
        input: Payload,
    },

    #[serde(rename = "workflow:completed")]
    WorkflowCompleted {
        workflow_id: WorkflowId,
        workflow_type: String,
        at_ms: u64,
        result: Payload,
    },

    #[serde(rename = "workflow:failed")]
    WorkflowFailed {
        workflow_id: WorkflowId,
        workflow_type: String,
        at_ms: u64,
        error: String,
    },

    #[serde(rename = "workflow:cancelled")]
    WorkflowCancelled {
        workflow_id: WorkflowId,
        workflow_type: String,
        at_ms: u64,
    },

    #[serde(rename = "step:started")]
    StepStarted {
        workflow_id: WorkflowId,
        workflow_type: String,
        step: String,
        attempt: u32,
        at_ms: u64,
        input: Payload,
    },

    #[serde(rename = "step:completed")]
    StepCompleted {
        workflow_id: WorkflowId,
        workflow_type: String,
        step: String,
        attempt: u32,
        at_ms: u64,
        output: Payload,
    },

    #[serde(rename = "step:failed")]
    StepFailed {
        workflow_id: WorkflowId,
        workflow_type: String,
        step: String,
        attempt: u32,
        at_ms: u64,
        error: String,
    },
}

impl LifecycleEvent {
    pub fn workflow_id(&self) -> WorkflowId {
        match self {
            LifecycleEvent::WorkflowStarted { workflow_id, .. }
            | LifecycleEvent::WorkflowCompleted { workflow_id, .. }
            | LifecycleEvent::WorkflowFailed { workflow_id, .. }
            | LifecycleEvent::WorkflowCancelled { workflow_id, .. }
            | LifecycleEvent::StepStarted { workflow_id, .. }
            | LifecycleEvent::StepCompleted { workflow_id, .. }
            | LifecycleEvent::StepFailed { workflow_id, .. } => *workflow_id,
        }
    }

    pub fn workflow_type(&self) -> &str {
        match self {
            LifecycleEvent::WorkflowStarted { workflow_type, .. }
            | LifecycleEvent::WorkflowCompleted { workflow_type, .. }
            | LifecycleEvent::WorkflowFailed { workflow_type, .. }
            | LifecycleEvent::WorkflowCancelled { workflow_type, .. }
            | LifecycleEvent::StepStarted { workflow_type, .. }
            | LifecycleEvent::StepCompleted { workflow_type, .. }
            | LifecycleEvent::StepFailed { workflow_type, .. } => workflow_type,
        }
    }

    pub fn at_ms(&self) -> u64 {
        match self {
            LifecycleEvent::WorkflowStarted { at_ms, .. }
            | LifecycleEvent::WorkflowCompleted { at_ms, .. }
            | LifecycleEvent::WorkflowFailed { at_ms, .. }
            | LifecycleEvent::WorkflowCancelled { at_ms, .. }
            | LifecycleEvent::StepStarted { at_ms, .. }
            | LifecycleEvent::StepCompleted { at_ms, .. }
            | LifecycleEvent::StepFailed { at_ms, .. } => *at_ms,
        }
    }

    /// The wire tag, e.g. `"workflow:started"`.
    pub fn kind(&self) -> &'static str {
        match self {
            LifecycleEvent::WorkflowStarted { .. } => "workflow:started",
            LifecycleEvent::WorkflowCompleted { .. } => "workflow:completed",
            LifecycleEvent::WorkflowFailed { .. } => "workflow:failed",
            LifecycleEvent::WorkflowCancelled { .. } => "workflow:cancelled",
            LifecycleEvent::StepStarted { .. } => "step:started",
            LifecycleEvent::StepCompleted { .. } => "step:completed",
            LifecycleEvent::StepFailed { .. } => "step:failed",
        }
    }
}

/// Subscriber-side filter: by workflow id, workflow type, or everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
}

impl EventFilter {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn for_workflow(id: WorkflowId) -> Self {
        Self { workflow_id: Some(id), workflow_type: None }
    }

    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        if let Some(id) = &self.workflow_id {
            if event.workflow_id() != *id {
                return false;
            }
        }
        if let Some(t) = &self.workflow_type {
            if event.workflow_type() != t {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
