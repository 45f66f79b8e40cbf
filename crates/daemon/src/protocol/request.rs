// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use aether_core::{Capability, Payload, ReportPhase};
use aether_storage::ListFilter;
use serde::{Deserialize, Serialize};

use super::types::CompletionDto;

/// Request from a client or worker to the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Health check ping
    Ping,

    /// Version handshake
    Hello { version: String },

    // -- client plane --
    StartWorkflow {
        workflow_type: String,
        input: Payload,
    },

    GetWorkflowStatus { workflow_id: String },

    /// Blocks up to `timeout_ms`; zero answers immediately.
    AwaitResult {
        workflow_id: String,
        timeout_ms: u64,
    },

    CancelWorkflow { workflow_id: String },

    // -- worker plane --
    Register {
        service_name: String,
        group: String,
        capabilities: Vec<Capability>,
        workflow_types: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        worker_id: Option<String>,
    },

    /// Batched claim: up to `max` matched tasks, or an empty batch.
    PollTasks {
        session_token: String,
        max: u32,
    },

    /// Switch this connection into push mode; the server streams Task and
    /// CancelTask frames until either side closes.
    OpenTaskStream { session_token: String },

    CompleteStep {
        session_token: String,
        task_id: String,
        #[serde(flatten)]
        completion: CompletionDto,
    },

    /// Progress report from a worker running the workflow body itself.
    ReportStep {
        session_token: String,
        workflow_id: String,
        step_name: String,
        status: ReportPhase,
        #[serde(default)]
        payload: Payload,
    },

    /// Hand a claimed task back to the head of its queue.
    ReturnTask {
        session_token: String,
        task_id: String,
    },

    /// Session liveness (session_token) or claim liveness (task_id).
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },

    /// No new tasks; in-flight work may finish.
    Drain { session_token: String },

    // -- admin / monitor queries --
    ListWorkflows {
        #[serde(default)]
        filter: ListFilter,
    },

    GetWorkflowDetail { workflow_id: String },

    ListWorkers,
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
