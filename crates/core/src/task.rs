// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatchable tasks and retry policy.

use crate::payload::Payload;
use crate::workflow::WorkflowId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Claim token for one dispatch of a step.
    ///
    /// Freshly generated per dispatch; workers reference it when completing.
    pub struct TaskId("task-");
}

/// Delay strategy between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Backoff {
    None,
    Fixed { delay_ms: u64 },
    Exponential { base_ms: u64, cap_ms: u64 },
}

impl Backoff {
    /// Delay before the next attempt, given how many explicit failures the
    /// step has accumulated so far (≥ 1).
    pub fn delay_ms(&self, failures: u32) -> u64 {
        match self {
            Backoff::None => 0,
            Backoff::Fixed { delay_ms } => *delay_ms,
            Backoff::Exponential { base_ms, cap_ms } => {
                let shift = failures.saturating_sub(1).min(32);
                base_ms.saturating_mul(1u64 << shift).min(*cap_ms)
            }
        }
    }
}

/// Step-level retry policy carried on every task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed for a step (explicit failures only;
    /// worker-lost redeliveries do not consume the budget).
    pub max_retries: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::Exponential { base_ms: 500, cap_ms: 30_000 },
        }
    }
}

/// A dispatchable step before a worker claims it. No task id yet: ids are
/// minted at dispatch time, one per delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub workflow_id: WorkflowId,
    pub workflow_type: String,
    pub step_name: String,
    pub attempt: u32,
    pub input: Payload,
    pub retry: RetryPolicy,
}

impl TaskSpec {
    /// Idempotence key for enqueueing.
    pub fn key(&self) -> (WorkflowId, &str, u32) {
        (self.workflow_id, &self.step_name, self.attempt)
    }
}

/// A claimed dispatch of a step, handed to exactly one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub workflow_id: WorkflowId,
    pub workflow_type: String,
    pub step_name: String,
    pub attempt: u32,
    pub input: Payload,
    pub retry: RetryPolicy,
}

impl Task {
    pub fn from_spec(id: TaskId, spec: TaskSpec) -> Self {
        Self {
            id,
            workflow_id: spec.workflow_id,
            workflow_type: spec.workflow_type,
            step_name: spec.step_name,
            attempt: spec.attempt,
            input: spec.input,
            retry: spec.retry,
        }
    }

    pub fn spec(&self) -> TaskSpec {
        TaskSpec {
            workflow_id: self.workflow_id,
            workflow_type: self.workflow_type.clone(),
            step_name: self.step_name.clone(),
            attempt: self.attempt,
            input: self.input.clone(),
            retry: self.retry,
        }
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
