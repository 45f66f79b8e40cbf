// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Replayable workflow mutations.
//!
//! Every state change the engine performs on a workflow is expressed as a
//! [`WorkflowAction`] and applied through [`Workflow::apply`]. The durable
//! store appends the action to the workflow's log before applying it, so
//! replaying the log reproduces the exact same state.

use crate::payload::Payload;
use crate::workflow::{StepExecution, StepStatus, Workflow, WorkflowState};
use serde::{Deserialize, Serialize};

/// Phase carried by a worker's report-step call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportPhase {
    Started,
    Completed,
    Failed,
}

crate::simple_display! {
    ReportPhase {
        Started => "started",
        Completed => "completed",
        Failed => "failed",
    }
}

/// A single replayable mutation of one workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowAction {
    /// A step attempt became dispatchable (a task was queued for it).
    StepEnqueued {
        step: String,
        attempt: u32,
        input: Payload,
        at_ms: u64,
    },
    /// A worker claimed the step's task.
    StepStarted { step: String, attempt: u32, at_ms: u64 },
    StepCompleted {
        step: String,
        attempt: u32,
        output: Payload,
        at_ms: u64,
    },
    StepFailed {
        step: String,
        attempt: u32,
        error: String,
        /// True when the attempt was lost (dead session, visibility
        /// timeout, explicit return) rather than failed by user code.
        /// Lost attempts do not count against the retry budget.
        worker_lost: bool,
        at_ms: u64,
    },
    StepCancelled { step: String, attempt: u32, at_ms: u64 },
    /// Progress reported by a worker running the workflow body itself.
    /// Accepted even for steps never enqueued as tasks.
    StepReported {
        step: String,
        phase: ReportPhase,
        payload: Payload,
        at_ms: u64,
    },
    CancelRequested { at_ms: u64 },
    Completed { result: Payload, at_ms: u64 },
    Failed { error: String, at_ms: u64 },
    Cancelled { at_ms: u64 },
}

impl WorkflowAction {
    /// Stable kind tag, used for log records and tracing.
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowAction::StepEnqueued { .. } => "step_enqueued",
            WorkflowAction::StepStarted { .. } => "step_started",
            WorkflowAction::StepCompleted { .. } => "step_completed",
            WorkflowAction::StepFailed { .. } => "step_failed",
            WorkflowAction::StepCancelled { .. } => "step_cancelled",
            WorkflowAction::StepReported { .. } => "step_reported",
            WorkflowAction::CancelRequested { .. } => "cancel_requested",
            WorkflowAction::Completed { .. } => "completed",
            WorkflowAction::Failed { .. } => "failed",
            WorkflowAction::Cancelled { .. } => "cancelled",
        }
    }
}

impl Workflow {
    /// Apply a replayable action.
    ///
    /// # Idempotency requirement
    ///
    /// All handlers MUST be idempotent: applying the same action twice must
    /// produce the same state as applying it once. Recovery may re-apply a
    /// logged action whose effect already reached the snapshot. Guards:
    /// use assignment instead of arithmetic, check for existing records
    /// before appending, and gate increments on a status transition.
    pub fn apply(&mut self, action: &WorkflowAction) {
        match action {
            WorkflowAction::StepEnqueued { step, attempt, input, at_ms } => {
                if self.step(step, *attempt).is_some() {
                    return;
                }
                self.steps.push(StepExecution {
                    step_name: step.clone(),
                    attempt: *attempt,
                    status: StepStatus::Pending,
                    started_at_ms: *at_ms,
                    completed_at_ms: None,
                    input: input.clone(),
                    output: None,
                    error: None,
                    reported: false,
                });
                if !self.is_terminal() {
                    self.current_step = Some(step.clone());
                }
            }

            WorkflowAction::StepStarted { step, attempt, at_ms } => {
                if self.is_terminal() {
                    return;
                }
                if let Some(record) = self.step_mut(step, *attempt) {
                    if record.status == StepStatus::Pending {
                        record.status = StepStatus::Running;
                        record.started_at_ms = *at_ms;
                    }
                }
                self.state = WorkflowState::Running;
                self.current_step = Some(step.clone());
            }

            WorkflowAction::StepCompleted { step, attempt, output, at_ms } => {
                if let Some(record) = self.step_mut(step, *attempt) {
                    if record.completed_at_ms.is_none() {
                        record.output = Some(output.clone());
                        record.finalize(StepStatus::Completed, *at_ms);
                    }
                }
            }

            WorkflowAction::StepFailed { step, attempt, error, worker_lost, at_ms } => {
                let mut transitioned = false;
                if let Some(record) = self.step_mut(step, *attempt) {
                    if record.completed_at_ms.is_none() {
                        record.error = Some(error.clone());
                        record.finalize(StepStatus::Failed, *at_ms);
                        transitioned = true;
                    }
                }
                // Only count explicit failures, and only on the transition
                // (re-applying the action must not double-count).
                if transitioned && !worker_lost {
                    let count = self.error_attempts.entry(step.clone()).or_insert(0);
                    *count += 1;
                }
            }

            WorkflowAction::StepCancelled { step, attempt, at_ms } => {
                if let Some(record) = self.step_mut(step, *attempt) {
                    record.finalize(StepStatus::Cancelled, *at_ms);
                }
            }

            WorkflowAction::StepReported { step, phase, payload, at_ms } => {
                self.apply_report(step, *phase, payload, *at_ms);
            }

            WorkflowAction::CancelRequested { .. } => {
                if !self.is_terminal() {
                    self.cancel_requested = true;
                }
            }

            WorkflowAction::Completed { result, at_ms } => {
                if self.is_terminal() {
                    return;
                }
                self.state = WorkflowState::Completed;
                self.result = Some(result.clone());
                self.completed_at_ms = Some(*at_ms);
                self.current_step = None;
            }

            WorkflowAction::Failed { error, at_ms } => {
                if self.is_terminal() {
                    return;
                }
                self.state = WorkflowState::Failed;
                self.error = Some(error.clone());
                self.completed_at_ms = Some(*at_ms);
                self.current_step = None;
            }

            WorkflowAction::Cancelled { at_ms } => {
                if self.is_terminal() {
                    return;
                }
                self.state = WorkflowState::Cancelled;
                self.completed_at_ms = Some(*at_ms);
                // A step abandoned mid-run keeps its Running record (and
                // stays the current step) until the worker reports it.
                if self.running_step().is_none() {
                    self.current_step = None;
                }
            }
        }
    }

    /// A completion report for a step the core has never seen still gets a
    /// record, so the history holds what the worker claims happened.
    fn ensure_reported_record(&mut self, step: &str, at_ms: u64) {
        if self.latest_step(step).is_none() {
            self.steps.push(StepExecution {
                step_name: step.to_string(),
                attempt: 1,
                status: StepStatus::Running,
                started_at_ms: at_ms,
                completed_at_ms: None,
                input: Payload::empty(),
                output: None,
                error: None,
                reported: true,
            });
        }
    }

    /// Report-step is authoritative for workflows whose body runs inside a
    /// worker: records are appended for steps the core never enqueued. On a
    /// terminal workflow the report still lands on the step record (audit)
    /// but never changes workflow state.
    fn apply_report(&mut self, step: &str, phase: ReportPhase, payload: &Payload, at_ms: u64) {
        match phase {
            ReportPhase::Started => {
                let needs_record = match self.latest_step(step) {
                    Some(record) => record.is_terminal(),
                    None => true,
                };
                if needs_record {
                    let attempt = self.latest_attempt(step) + 1;
                    self.steps.push(StepExecution {
                        step_name: step.to_string(),
                        attempt,
                        status: StepStatus::Running,
                        started_at_ms: at_ms,
                        completed_at_ms: None,
                        input: payload.clone(),
                        output: None,
                        error: None,
                        reported: true,
                    });
                } else if let Some(record) = self.latest_step_mut(step) {
                    if record.status == StepStatus::Pending {
                        record.status = StepStatus::Running;
                        record.started_at_ms = at_ms;
                    }
                }
                if !self.is_terminal() {
                    self.state = WorkflowState::Running;
                    self.current_step = Some(step.to_string());
                }
            }
            ReportPhase::Completed => {
                self.ensure_reported_record(step, at_ms);
                if let Some(record) = self.latest_step_mut(step) {
                    if record.completed_at_ms.is_none() {
                        record.output = Some(payload.clone());
                        record.finalize(StepStatus::Completed, at_ms);
                    }
                }
            }
            ReportPhase::Failed => {
                self.ensure_reported_record(step, at_ms);
                if let Some(record) = self.latest_step_mut(step) {
                    if record.completed_at_ms.is_none() {
                        record.error = payload.as_utf8().map(str::to_string);
                        record.finalize(StepStatus::Failed, at_ms);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "action_tests.rs"]
mod tests;
