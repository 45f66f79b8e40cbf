// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic sweep: liveness, visibility, cancel deadlines, retention.

use aether_core::{Clock, LifecycleEvent, TaskSpec, WorkflowAction, WorkflowId};
use aether_storage::ListFilter;

use super::{Counters, Runtime};
use crate::queue::Claim;

impl<C: Clock> Runtime<C> {
    pub(super) fn handle_tick(&mut self) {
        let now = self.clock.epoch_ms();

        // Backoff-delayed retries that are now due.
        for workflow_type in self.queue.promote_delayed(now) {
            self.dispatch_streams(&workflow_type);
        }

        // Workers without a recent heartbeat: mark dead, free their claims.
        for (worker_id, session) in self.registry.expire(now, self.cfg.heartbeat_ms) {
            tracing::warn!(%worker_id, "worker heartbeat timed out, releasing claims");
            self.streams.remove(&session);
            for claim in self.queue.release_session(&session) {
                self.handle_lost(claim, "worker lost");
            }
        }

        // Claims whose visibility window elapsed without completion.
        for claim in self.queue.expire(now) {
            self.handle_lost(claim, "visibility timeout expired");
        }

        // Cancellations the worker never acknowledged.
        let due: Vec<WorkflowId> = self
            .cancel_deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| *id)
            .collect();
        for workflow_id in due {
            self.cancel_deadlines.remove(&workflow_id);
            self.force_cancel(&workflow_id);
        }

        if let Some(keep_ms) = self.cfg.retention_ms {
            self.prune_terminal(now, keep_ms);
        }

        if let Err(e) = self.store.checkpoint(now) {
            tracing::error!(error = %e, "store checkpoint failed, degrading to read-only");
            self.read_only = true;
        }
    }

    /// A claimed attempt was lost (dead session, visibility timeout, or
    /// explicit return): finalize it as failed with the loss reason and
    /// redeliver at the next attempt number. Lost attempts never count
    /// against the retry budget.
    pub(super) fn handle_lost(&mut self, claim: Claim, reason: &str) {
        let task = claim.task;
        let workflow = match self.store.get(&task.workflow_id) {
            Ok(w) => w,
            Err(_) => return,
        };
        if workflow.is_terminal() {
            return;
        }
        let now = self.clock.epoch_ms();

        let updated = match self.persist(
            &task.workflow_id,
            WorkflowAction::StepFailed {
                step: task.step_name.clone(),
                attempt: task.attempt,
                error: reason.to_string(),
                worker_lost: true,
                at_ms: now,
            },
        ) {
            Ok(w) => w,
            Err(_) => return,
        };
        self.emit(LifecycleEvent::StepFailed {
            workflow_id: task.workflow_id,
            workflow_type: task.workflow_type.clone(),
            step: task.step_name.clone(),
            attempt: task.attempt,
            at_ms: now,
            error: reason.to_string(),
        });

        // With the claiming worker gone there is nobody left to
        // acknowledge a pending cancel.
        if workflow.cancel_requested {
            if let Ok(cancelled) =
                self.persist(&task.workflow_id, WorkflowAction::Cancelled { at_ms: now })
            {
                self.finalized(&cancelled);
            }
            return;
        }

        let attempt = updated.latest_attempt(&task.step_name) + 1;
        if self
            .persist(
                &task.workflow_id,
                WorkflowAction::StepEnqueued {
                    step: task.step_name.clone(),
                    attempt,
                    input: task.input.clone(),
                    at_ms: now,
                },
            )
            .is_err()
        {
            return;
        }
        let workflow_type = task.workflow_type.clone();
        let spec = TaskSpec {
            workflow_id: task.workflow_id,
            workflow_type: workflow_type.clone(),
            step_name: task.step_name.clone(),
            attempt,
            input: task.input,
            retry: task.retry,
        };
        // Head of the queue: redelivery preserves per-workflow FIFO order.
        self.queue.enqueue_front(spec);
        Counters::bump(&self.counters.tasks_redelivered);
        tracing::warn!(
            workflow_id = %task.workflow_id,
            step = %task.step_name,
            attempt,
            reason,
            "task redelivered"
        );
        self.dispatch_streams(&workflow_type);
    }

    /// Cancellation deadline elapsed: force the transition. The abandoned
    /// step record stays Running until the worker eventually reports it.
    fn force_cancel(&mut self, workflow_id: &WorkflowId) {
        let workflow = match self.store.get(workflow_id) {
            Ok(w) => w,
            Err(_) => return,
        };
        if workflow.is_terminal() || !workflow.cancel_requested {
            return;
        }
        let now = self.clock.epoch_ms();
        if let Ok(cancelled) = self.persist(workflow_id, WorkflowAction::Cancelled { at_ms: now }) {
            tracing::info!(workflow_id = %workflow_id, "cancellation deadline elapsed, forcing");
            self.finalized(&cancelled);
        }
    }

    /// Delete terminal workflows older than the retention window.
    fn prune_terminal(&mut self, now_ms: u64, keep_ms: u64) {
        let expired: Vec<WorkflowId> = match self.store.list(&ListFilter::all()) {
            Ok(workflows) => workflows
                .iter()
                .filter(|w| {
                    w.is_terminal()
                        && w.completed_at_ms
                            .is_some_and(|done| done.saturating_add(keep_ms) <= now_ms)
                })
                .map(|w| w.id)
                .collect(),
            Err(_) => return,
        };
        for workflow_id in expired {
            match self.store.remove(&workflow_id) {
                Ok(()) => {
                    tracing::info!(workflow_id = %workflow_id, "pruned by retention policy")
                }
                Err(e) => tracing::warn!(workflow_id = %workflow_id, error = %e, "prune failed"),
            }
        }
    }
}
