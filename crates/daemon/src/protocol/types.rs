// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol DTOs shared between requests, responses, and the monitor.

use aether_core::{
    Payload, RetryPolicy, SessionState, StepStatus, Task, WorkerInfo, Workflow, WorkflowState,
};
use aether_engine::{AwaitOutcome, CancelOutcome, StatusView, StepOutcome};
use serde::{Deserialize, Serialize};

/// Step result carried by `CompleteStep`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CompletionDto {
    Completed { result: Payload },
    Failed { error: String },
    Cancelled,
}

impl From<CompletionDto> for StepOutcome {
    fn from(dto: CompletionDto) -> Self {
        match dto {
            CompletionDto::Completed { result } => StepOutcome::Completed(result),
            CompletionDto::Failed { error } => StepOutcome::Failed(error),
            CompletionDto::Cancelled => StepOutcome::Cancelled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatusDto {
    pub workflow_id: String,
    pub state: WorkflowState,
    pub current_step: Option<String>,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

impl From<&StatusView> for WorkflowStatusDto {
    fn from(view: &StatusView) -> Self {
        Self {
            workflow_id: view.workflow_id.to_string(),
            state: view.state,
            current_step: view.current_step.clone(),
            started_at_ms: view.started_at_ms,
            completed_at_ms: view.completed_at_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AwaitOutcomeDto {
    Completed { result: Payload },
    Failed { error: String },
    Cancelled,
    StillRunning,
}

impl From<AwaitOutcome> for AwaitOutcomeDto {
    fn from(outcome: AwaitOutcome) -> Self {
        match outcome {
            AwaitOutcome::Completed(result) => AwaitOutcomeDto::Completed { result },
            AwaitOutcome::Failed(error) => AwaitOutcomeDto::Failed { error },
            AwaitOutcome::Cancelled => AwaitOutcomeDto::Cancelled,
            AwaitOutcome::StillRunning => AwaitOutcomeDto::StillRunning,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcomeDto {
    Accepted,
    AlreadyTerminal,
}

impl From<CancelOutcome> for CancelOutcomeDto {
    fn from(outcome: CancelOutcome) -> Self {
        match outcome {
            CancelOutcome::Accepted => CancelOutcomeDto::Accepted,
            CancelOutcome::AlreadyTerminal => CancelOutcomeDto::AlreadyTerminal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDto {
    pub task_id: String,
    pub workflow_id: String,
    pub workflow_type: String,
    pub step_name: String,
    pub attempt: u32,
    pub input: Payload,
    pub retry: RetryPolicy,
}

impl From<&Task> for TaskDto {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.id.to_string(),
            workflow_id: task.workflow_id.to_string(),
            workflow_type: task.workflow_type.clone(),
            step_name: task.step_name.clone(),
            attempt: task.attempt,
            input: task.input.clone(),
            retry: task.retry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecordDetail {
    pub step_name: String,
    pub attempt: u32,
    pub status: StepStatus,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub reported: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub workflow_type: String,
    pub state: WorkflowState,
    pub current_step: Option<String>,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDetail {
    pub workflow_id: String,
    pub workflow_type: String,
    pub state: WorkflowState,
    pub current_step: Option<String>,
    pub input: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Payload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cancel_requested: bool,
    pub started_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub steps: Vec<StepRecordDetail>,
}

impl From<&Workflow> for WorkflowSummary {
    fn from(wf: &Workflow) -> Self {
        Self {
            workflow_id: wf.id.to_string(),
            workflow_type: wf.workflow_type.clone(),
            state: wf.state,
            current_step: wf.current_step.clone(),
            started_at_ms: wf.created_at_ms,
            completed_at_ms: wf.completed_at_ms,
            steps: wf.steps.len(),
        }
    }
}

impl From<&Workflow> for WorkflowDetail {
    fn from(wf: &Workflow) -> Self {
        Self {
            workflow_id: wf.id.to_string(),
            workflow_type: wf.workflow_type.clone(),
            state: wf.state,
            current_step: wf.current_step.clone(),
            input: wf.input.clone(),
            result: wf.result.clone(),
            error: wf.error.clone(),
            cancel_requested: wf.cancel_requested,
            started_at_ms: wf.created_at_ms,
            completed_at_ms: wf.completed_at_ms,
            steps: wf.steps.iter().map(Into::into).collect(),
        }
    }
}

impl From<&aether_core::StepExecution> for StepRecordDetail {
    fn from(record: &aether_core::StepExecution) -> Self {
        Self {
            step_name: record.step_name.clone(),
            attempt: record.attempt,
            status: record.status,
            started_at_ms: record.started_at_ms,
            completed_at_ms: record.completed_at_ms,
            output: record.output.clone(),
            error: record.error.clone(),
            reported: record.reported,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker_id: String,
    pub service_name: String,
    pub group: String,
    pub state: SessionState,
    pub workflow_types: Vec<String>,
    pub last_heartbeat_ms: u64,
}

impl From<&WorkerInfo> for WorkerSummary {
    fn from(info: &WorkerInfo) -> Self {
        Self {
            worker_id: info.worker_id.to_string(),
            service_name: info.service_name.clone(),
            group: info.group.clone(),
            state: info.state,
            workflow_types: info.workflow_types.clone(),
            last_heartbeat_ms: info.last_heartbeat_ms,
        }
    }
}
