// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client-plane handlers: start, status, await, cancel.

use aether_core::{
    Clock, CoreError, LifecycleEvent, Payload, Workflow, WorkflowAction, WorkflowId,
    WorkflowState,
};
use aether_storage::StoreError;
use tokio::sync::oneshot;

use super::{AwaitWait, CancelOutcome, Counters, Runtime, StatusView, StreamPush};

impl<C: Clock> Runtime<C> {
    pub(super) fn handle_start(
        &mut self,
        workflow_type: String,
        input: Payload,
    ) -> Result<WorkflowId, CoreError> {
        self.reject_if_read_only()?;
        let now = self.clock.epoch_ms();
        let workflow_id = WorkflowId::new();
        let workflow = Workflow::new(workflow_id, workflow_type.clone(), input.clone(), now);

        match self.store.create(workflow) {
            Ok(()) => {}
            Err(e @ StoreError::Duplicate(_)) => return Err(e.into()),
            Err(e) => {
                tracing::error!(error = %e, "workflow create failed, degrading to read-only");
                self.read_only = true;
                return Err(CoreError::PersistenceFailure(e.to_string()));
            }
        }

        self.emit(LifecycleEvent::WorkflowStarted {
            workflow_id,
            workflow_type: workflow_type.clone(),
            at_ms: now,
            input: input.clone(),
        });
        Counters::bump(&self.counters.workflows_started);

        // First dispatchable step: the declared program's head, or the
        // single driving task for auto and body-in-worker types.
        let first_step = self
            .registry
            .program(&workflow_type)
            .and_then(|p| p.first().cloned())
            .unwrap_or_else(|| "start".to_string());
        self.enqueue_step(workflow_id, &workflow_type, first_step, 1, input)?;

        tracing::info!(workflow_id = %workflow_id, workflow_type, "workflow started");
        Ok(workflow_id)
    }

    pub(super) fn handle_status(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<StatusView, CoreError> {
        let workflow = self.store.get(workflow_id)?;
        Ok(StatusView::from(&workflow))
    }

    pub(super) fn handle_await(
        &mut self,
        workflow_id: &WorkflowId,
    ) -> Result<AwaitWait, CoreError> {
        let workflow = self.store.get(workflow_id)?;
        if workflow.is_terminal() {
            return Ok(AwaitWait::Ready(Self::outcome_of(&workflow)));
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.entry(*workflow_id).or_default().push(tx);
        Ok(AwaitWait::Pending(rx))
    }

    pub(super) fn handle_cancel(
        &mut self,
        workflow_id: &WorkflowId,
    ) -> Result<CancelOutcome, CoreError> {
        let workflow = self.store.get(workflow_id)?;
        if workflow.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        self.reject_if_read_only()?;
        let now = self.clock.epoch_ms();

        // A step is in flight: set the flag, notify the claiming worker
        // over its task stream, and bound the wait with a deadline.
        if let Some((task_id, session)) = self.queue.claim_for_workflow(workflow_id) {
            self.persist(workflow_id, WorkflowAction::CancelRequested { at_ms: now })?;
            if let Some(stream) = self.streams.get(&session) {
                let _ = stream.try_send(StreamPush::Cancel {
                    workflow_id: *workflow_id,
                    task_id,
                });
            }
            self.cancel_deadlines
                .insert(*workflow_id, now + self.cfg.cancel_deadline_ms);
            tracing::info!(workflow_id = %workflow_id, "cancel requested, waiting for worker");
            return Ok(CancelOutcome::Accepted);
        }

        // Nothing running: cancel immediately.
        self.queue.drop_workflow(workflow_id);
        if let Some(record) = workflow.last_task_step().filter(|r| !r.is_terminal()) {
            self.persist(
                workflow_id,
                WorkflowAction::StepCancelled {
                    step: record.step_name.clone(),
                    attempt: record.attempt,
                    at_ms: now,
                },
            )?;
        }
        let cancelled = self.persist(workflow_id, WorkflowAction::Cancelled { at_ms: now })?;
        self.finalized(&cancelled);
        Ok(CancelOutcome::Accepted)
    }

    /// Post-terminal bookkeeping: emit the workflow event, wake waiters,
    /// drop queued work, and clear deadlines.
    pub(super) fn finalized(&mut self, workflow: &Workflow) {
        let at_ms = workflow
            .completed_at_ms
            .unwrap_or_else(|| self.clock.epoch_ms());
        match workflow.state {
            WorkflowState::Completed => {
                self.emit(LifecycleEvent::WorkflowCompleted {
                    workflow_id: workflow.id,
                    workflow_type: workflow.workflow_type.clone(),
                    at_ms,
                    result: workflow.result.clone().unwrap_or_default(),
                });
                Counters::bump(&self.counters.workflows_completed);
            }
            WorkflowState::Failed => {
                self.emit(LifecycleEvent::WorkflowFailed {
                    workflow_id: workflow.id,
                    workflow_type: workflow.workflow_type.clone(),
                    at_ms,
                    error: workflow.error.clone().unwrap_or_default(),
                });
                Counters::bump(&self.counters.workflows_failed);
            }
            WorkflowState::Cancelled => {
                self.emit(LifecycleEvent::WorkflowCancelled {
                    workflow_id: workflow.id,
                    workflow_type: workflow.workflow_type.clone(),
                    at_ms,
                });
                Counters::bump(&self.counters.workflows_cancelled);
            }
            WorkflowState::Pending | WorkflowState::Running => return,
        }

        self.queue.drop_workflow(&workflow.id);
        self.cancel_deadlines.remove(&workflow.id);
        self.parked.remove(&workflow.id);
        self.notify_waiters(workflow);
        tracing::info!(
            workflow_id = %workflow.id,
            state = %workflow.state,
            "workflow finalized"
        );
    }
}
