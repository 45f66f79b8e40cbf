// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use aether_core::ErrorKind;
use serde::{Deserialize, Serialize};

use super::types::{
    AwaitOutcomeDto, CancelOutcomeDto, TaskDto, WorkerSummary, WorkflowDetail, WorkflowStatusDto,
    WorkflowSummary,
};

/// Response (or stream push) from the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    Ok,
    Pong,
    Hello { version: String },

    WorkflowStarted { workflow_id: String },
    WorkflowStatus { status: WorkflowStatusDto },
    AwaitResult { outcome: AwaitOutcomeDto },
    CancelResult { outcome: CancelOutcomeDto },

    Registered {
        worker_id: String,
        session_token: String,
    },
    Tasks { tasks: Vec<TaskDto> },

    /// Acknowledges `OpenTaskStream`; Task/CancelTask frames follow.
    StreamOpened,
    /// Stream push: a claimed task for this worker.
    Task { task: TaskDto },
    /// Stream push: cancellation notice for a claimed task.
    CancelTask {
        workflow_id: String,
        task_id: String,
    },

    Workflows { workflows: Vec<WorkflowSummary> },
    WorkflowDetail { detail: Box<WorkflowDetail> },
    Workers { workers: Vec<WorkerSummary> },

    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(e: &aether_core::CoreError) -> Self {
        Response::Error { kind: e.kind(), message: e.to_string() }
    }
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
