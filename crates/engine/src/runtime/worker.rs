// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker-plane handlers: register, poll, stream, complete, report.

use aether_core::{
    Capability, Clock, CoreError, LifecycleEvent, Payload, ReportPhase, SessionState,
    SessionToken, Task, TaskId, TaskSpec, WorkerId, Workflow, WorkflowAction, WorkflowId,
};
use tokio::sync::mpsc;

use super::{Counters, Runtime, StepOutcome, StreamPush, STREAM_BUFFER};
use crate::queue::CompletedTask;
use crate::registry::Registration;

impl<C: Clock> Runtime<C> {
    pub(super) fn handle_register(
        &mut self,
        worker_id: Option<WorkerId>,
        service_name: String,
        group: String,
        capabilities: Vec<Capability>,
        workflow_types: Vec<String>,
    ) -> Result<Registration, CoreError> {
        let now = self.clock.epoch_ms();
        let registration = self.registry.register(
            worker_id,
            service_name,
            group,
            capabilities,
            workflow_types.clone(),
            now,
        )?;
        tracing::info!(
            worker_id = %registration.worker_id,
            workflow_types = ?workflow_types,
            "worker registered"
        );
        // Recovered workflows may have been waiting for this type's
        // dispatch metadata.
        self.advance_parked(&workflow_types);
        Ok(registration)
    }

    pub(super) fn handle_poll(
        &mut self,
        session: &SessionToken,
        max: usize,
    ) -> Result<Vec<Task>, CoreError> {
        let info = self.registry.resolve(session)?;
        if info.state != SessionState::Active {
            // Draining workers get no new tasks.
            return Ok(Vec::new());
        }
        let types = info.workflow_types.clone();
        let now = self.clock.epoch_ms();
        let claimed = self
            .queue
            .claim_batch(session, &types, max.max(1), now, self.cfg.visibility_ms);

        let mut tasks = Vec::with_capacity(claimed.len());
        for task in claimed {
            match self.note_dispatch(&task) {
                Ok(()) => tasks.push(task),
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        task_id = %task.id,
                        "dispatch bookkeeping failed, requeueing"
                    );
                    if let Some(claim) = self.queue.take_claim(&task.id) {
                        self.queue.enqueue_front(claim.task.spec());
                    }
                }
            }
        }
        Ok(tasks)
    }

    pub(super) fn handle_open_stream(
        &mut self,
        session: &SessionToken,
    ) -> Result<mpsc::Receiver<StreamPush>, CoreError> {
        let info = self.registry.resolve(session)?;
        let types = info.workflow_types.clone();
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        // Sessions are single-owner: a newer stream replaces the older.
        self.streams.insert(*session, tx);
        for workflow_type in &types {
            self.dispatch_streams(workflow_type);
        }
        Ok(rx)
    }

    pub(super) fn handle_complete(
        &mut self,
        session: &SessionToken,
        task_id: &TaskId,
        outcome: StepOutcome,
    ) -> Result<(), CoreError> {
        self.registry.resolve(session)?;

        // Duplicate completion: ok, no side effects, no events.
        if self.queue.completed(task_id).is_some() {
            return Ok(());
        }

        let claim = self
            .queue
            .claim(task_id)
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        if claim.session != *session {
            return Err(CoreError::ProtocolViolation(
                "task is claimed by another session".into(),
            ));
        }
        self.reject_if_read_only()?;

        let task = claim.task.clone();
        let workflow = self.store.get(&task.workflow_id)?;
        let now = self.clock.epoch_ms();

        // Terminal workflow (e.g. force-cancelled past the deadline): the
        // report is accepted for audit but never changes workflow state.
        if workflow.is_terminal() {
            return self.complete_for_audit(&workflow, &task, outcome, now);
        }

        // The completion must reference the authoritative current step.
        // Body-in-worker workflows are exempt: report-step moves the
        // current step while the single driving task stays claimed.
        let driven = self.registry.is_driven(&task.workflow_type)
            || workflow.steps.iter().any(|s| s.reported);
        if !driven && workflow.current_step.as_deref() != Some(task.step_name.as_str()) {
            return Err(CoreError::ProtocolViolation(format!(
                "completion for step '{}' but current step is '{}'",
                task.step_name,
                workflow.current_step.as_deref().unwrap_or("none"),
            )));
        }

        // Validation passed: consume the claim.
        self.queue.take_claim(task_id);
        self.queue.mark_completed(
            *task_id,
            CompletedTask {
                workflow_id: task.workflow_id,
                step_name: task.step_name.clone(),
                attempt: task.attempt,
            },
        );

        match outcome {
            StepOutcome::Completed(result) => {
                let updated = self.persist(
                    &task.workflow_id,
                    WorkflowAction::StepCompleted {
                        step: task.step_name.clone(),
                        attempt: task.attempt,
                        output: result.clone(),
                        at_ms: now,
                    },
                )?;
                if updated.step(&task.step_name, task.attempt).is_none() {
                    // The claim referenced an attempt the record set does
                    // not contain: quarantine the workflow, keep the state.
                    return self.quarantine(
                        &task.workflow_id,
                        format!(
                            "no record for step '{}' attempt {}",
                            task.step_name, task.attempt
                        ),
                        now,
                    );
                }
                self.emit(LifecycleEvent::StepCompleted {
                    workflow_id: task.workflow_id,
                    workflow_type: task.workflow_type.clone(),
                    step: task.step_name.clone(),
                    attempt: task.attempt,
                    at_ms: now,
                    output: result.clone(),
                });
                Counters::bump(&self.counters.tasks_completed);
                self.advance_after_completion(&updated, &task, result)
            }
            StepOutcome::Failed(error) => {
                let updated = self.persist(
                    &task.workflow_id,
                    WorkflowAction::StepFailed {
                        step: task.step_name.clone(),
                        attempt: task.attempt,
                        error: error.clone(),
                        worker_lost: false,
                        at_ms: now,
                    },
                )?;
                self.emit(LifecycleEvent::StepFailed {
                    workflow_id: task.workflow_id,
                    workflow_type: task.workflow_type.clone(),
                    step: task.step_name.clone(),
                    attempt: task.attempt,
                    at_ms: now,
                    error: error.clone(),
                });
                Counters::bump(&self.counters.tasks_completed);
                self.retry_or_fail(&updated, &task, error)
            }
            StepOutcome::Cancelled => {
                self.persist(
                    &task.workflow_id,
                    WorkflowAction::StepCancelled {
                        step: task.step_name.clone(),
                        attempt: task.attempt,
                        at_ms: now,
                    },
                )?;
                let cancelled = self
                    .persist(&task.workflow_id, WorkflowAction::Cancelled { at_ms: now })?;
                Counters::bump(&self.counters.tasks_completed);
                self.finalized(&cancelled);
                Ok(())
            }
        }
    }

    /// Invariant violation: mark the workflow Failed with a diagnostic and
    /// surface `internal` to the caller. State is preserved for inspection.
    fn quarantine(
        &mut self,
        workflow_id: &WorkflowId,
        diagnostic: String,
        now: u64,
    ) -> Result<(), CoreError> {
        tracing::error!(workflow_id = %workflow_id, %diagnostic, "invariant violation, quarantining");
        let failed = self.persist(
            workflow_id,
            WorkflowAction::Failed { error: format!("internal error: {diagnostic}"), at_ms: now },
        )?;
        self.finalized(&failed);
        Err(CoreError::Internal(diagnostic))
    }

    /// Record-only completion on a terminal workflow.
    fn complete_for_audit(
        &mut self,
        workflow: &Workflow,
        task: &Task,
        outcome: StepOutcome,
        now: u64,
    ) -> Result<(), CoreError> {
        let action = match outcome {
            StepOutcome::Completed(result) => WorkflowAction::StepCompleted {
                step: task.step_name.clone(),
                attempt: task.attempt,
                output: result,
                at_ms: now,
            },
            StepOutcome::Failed(error) => WorkflowAction::StepFailed {
                step: task.step_name.clone(),
                attempt: task.attempt,
                error,
                worker_lost: false,
                at_ms: now,
            },
            StepOutcome::Cancelled => WorkflowAction::StepCancelled {
                step: task.step_name.clone(),
                attempt: task.attempt,
                at_ms: now,
            },
        };
        self.persist(&workflow.id, action)?;
        self.queue.take_claim(&task.id);
        self.queue.mark_completed(
            task.id,
            CompletedTask {
                workflow_id: task.workflow_id,
                step_name: task.step_name.clone(),
                attempt: task.attempt,
            },
        );
        tracing::debug!(
            workflow_id = %workflow.id,
            step = %task.step_name,
            "completion on terminal workflow recorded for audit"
        );
        Ok(())
    }

    /// After a successful step: enqueue the declared next step or finalize.
    fn advance_after_completion(
        &mut self,
        workflow: &Workflow,
        task: &Task,
        result: Payload,
    ) -> Result<(), CoreError> {
        let now = self.clock.epoch_ms();
        let next = self.next_program_step(workflow, &task.step_name);

        if workflow.cancel_requested {
            if next.is_some() {
                // The running step was allowed to finish; the rest of the
                // program is abandoned.
                let cancelled =
                    self.persist(&workflow.id, WorkflowAction::Cancelled { at_ms: now })?;
                self.finalized(&cancelled);
                return Ok(());
            }
            // The completion finished the whole workflow anyway; the
            // result exists, so Completed wins over a late cancel.
        }

        match next {
            Some(step) => {
                let attempt = workflow.latest_attempt(&step) + 1;
                self.enqueue_step(workflow.id, &workflow.workflow_type, step, attempt, result)
            }
            None => {
                let completed = self.persist(
                    &workflow.id,
                    WorkflowAction::Completed { result, at_ms: now },
                )?;
                self.finalized(&completed);
                Ok(())
            }
        }
    }

    /// After an explicit failure: retry with backoff or fail the workflow.
    fn retry_or_fail(
        &mut self,
        workflow: &Workflow,
        task: &Task,
        error: String,
    ) -> Result<(), CoreError> {
        let now = self.clock.epoch_ms();

        if workflow.cancel_requested {
            let cancelled = self.persist(&workflow.id, WorkflowAction::Cancelled { at_ms: now })?;
            self.finalized(&cancelled);
            return Ok(());
        }

        let failures = workflow.error_attempts(&task.step_name);
        if failures < task.retry.max_retries {
            let attempt = workflow.latest_attempt(&task.step_name) + 1;
            let delay_ms = task.retry.backoff.delay_ms(failures);
            self.persist(
                &workflow.id,
                WorkflowAction::StepEnqueued {
                    step: task.step_name.clone(),
                    attempt,
                    input: task.input.clone(),
                    at_ms: now,
                },
            )?;
            let spec = TaskSpec {
                workflow_id: task.workflow_id,
                workflow_type: task.workflow_type.clone(),
                step_name: task.step_name.clone(),
                attempt,
                input: task.input.clone(),
                retry: task.retry,
            };
            tracing::info!(
                workflow_id = %workflow.id,
                step = %task.step_name,
                attempt,
                delay_ms,
                "step failed, retrying"
            );
            if delay_ms == 0 {
                self.queue.enqueue_front(spec);
                self.dispatch_streams(&task.workflow_type);
            } else {
                self.queue.enqueue_delayed(spec, now + delay_ms);
            }
            Ok(())
        } else {
            let failed = self.persist(&workflow.id, WorkflowAction::Failed { error, at_ms: now })?;
            self.finalized(&failed);
            Ok(())
        }
    }

    pub(super) fn handle_report(
        &mut self,
        session: &SessionToken,
        workflow_id: &WorkflowId,
        step: String,
        phase: ReportPhase,
        payload: Payload,
    ) -> Result<(), CoreError> {
        self.registry.resolve(session)?;
        let before = self.store.get(workflow_id)?;
        self.reject_if_read_only()?;

        let now = self.clock.epoch_ms();
        let after = self.persist(
            workflow_id,
            WorkflowAction::StepReported {
                step: step.clone(),
                phase,
                payload: payload.clone(),
                at_ms: now,
            },
        )?;

        // Reports on a terminal workflow are audit-only: no events.
        if before.is_terminal() {
            return Ok(());
        }

        // Emit only when the record actually transitioned, so replays and
        // duplicate reports never produce duplicate terminal events.
        let transition = {
            let prior = before.latest_step(&step).map(|r| (r.attempt, r.status));
            let current = after.latest_step(&step).map(|r| (r.attempt, r.status));
            prior != current
        };
        if !transition {
            return Ok(());
        }

        let attempt = after.latest_attempt(&step);
        let event = match phase {
            ReportPhase::Started => LifecycleEvent::StepStarted {
                workflow_id: *workflow_id,
                workflow_type: before.workflow_type.clone(),
                step,
                attempt,
                at_ms: now,
                input: payload,
            },
            ReportPhase::Completed => LifecycleEvent::StepCompleted {
                workflow_id: *workflow_id,
                workflow_type: before.workflow_type.clone(),
                step,
                attempt,
                at_ms: now,
                output: payload,
            },
            ReportPhase::Failed => LifecycleEvent::StepFailed {
                workflow_id: *workflow_id,
                workflow_type: before.workflow_type.clone(),
                step,
                attempt,
                at_ms: now,
                error: payload.as_utf8().unwrap_or_default().to_string(),
            },
        };
        self.emit(event);
        Ok(())
    }

    pub(super) fn handle_return(
        &mut self,
        session: &SessionToken,
        task_id: &TaskId,
    ) -> Result<(), CoreError> {
        self.registry.resolve(session)?;
        let claim = self
            .queue
            .claim(task_id)
            .ok_or_else(|| CoreError::NotFound(format!("task {task_id}")))?;
        if claim.session != *session {
            return Err(CoreError::ProtocolViolation(
                "task is claimed by another session".into(),
            ));
        }
        if let Some(claim) = self.queue.take_claim(task_id) {
            self.handle_lost(claim, "returned by worker");
        }
        Ok(())
    }

    /// Persist the enqueue, queue the task, and push to live streams.
    pub(super) fn enqueue_step(
        &mut self,
        workflow_id: WorkflowId,
        workflow_type: &str,
        step: String,
        attempt: u32,
        input: Payload,
    ) -> Result<(), CoreError> {
        let at_ms = self.clock.epoch_ms();
        self.persist(
            &workflow_id,
            WorkflowAction::StepEnqueued {
                step: step.clone(),
                attempt,
                input: input.clone(),
                at_ms,
            },
        )?;
        let spec = TaskSpec {
            workflow_id,
            workflow_type: workflow_type.to_string(),
            step_name: step,
            attempt,
            input,
            retry: self.cfg.retry,
        };
        self.queue.enqueue(spec);
        self.dispatch_streams(workflow_type);
        Ok(())
    }

    /// Persist Running and emit step:started; the attempt is then owned by
    /// the claiming worker.
    pub(super) fn note_dispatch(&mut self, task: &Task) -> Result<(), CoreError> {
        let at_ms = self.clock.epoch_ms();
        self.persist(
            &task.workflow_id,
            WorkflowAction::StepStarted {
                step: task.step_name.clone(),
                attempt: task.attempt,
                at_ms,
            },
        )?;
        self.emit(LifecycleEvent::StepStarted {
            workflow_id: task.workflow_id,
            workflow_type: task.workflow_type.clone(),
            step: task.step_name.clone(),
            attempt: task.attempt,
            at_ms,
            input: task.input.clone(),
        });
        Counters::bump(&self.counters.tasks_dispatched);
        Ok(())
    }

    /// Push queued tasks of one type to workers with open streams.
    pub(super) fn dispatch_streams(&mut self, workflow_type: &str) {
        let now = self.clock.epoch_ms();
        loop {
            if self.queue.queued_len(workflow_type) == 0 {
                return;
            }
            let sessions: Vec<SessionToken> = self
                .registry
                .lookup_for(workflow_type)
                .into_iter()
                .filter(|s| self.streams.contains_key(s))
                .collect();
            if sessions.is_empty() {
                return;
            }

            let mut sent = false;
            for session in sessions {
                if self.queue.queued_len(workflow_type) == 0 {
                    return;
                }
                let Some(task) =
                    self.queue
                        .claim_one(&session, workflow_type, now, self.cfg.visibility_ms)
                else {
                    return;
                };

                // Persist Running before the task reaches the worker; a
                // failed push re-queues and the re-dispatch is idempotent.
                if let Err(e) = self.note_dispatch(&task) {
                    tracing::error!(error = %e, task_id = %task.id, "stream dispatch bookkeeping failed");
                    if let Some(claim) = self.queue.take_claim(&task.id) {
                        self.queue.enqueue_front(claim.task.spec());
                    }
                    return;
                }

                let pushed = match self.streams.get(&session) {
                    Some(stream) => stream.try_send(StreamPush::Task(task.clone())).is_ok(),
                    None => false,
                };
                if pushed {
                    sent = true;
                } else {
                    if self.streams.get(&session).is_some_and(|tx| tx.is_closed()) {
                        self.streams.remove(&session);
                    }
                    if let Some(claim) = self.queue.take_claim(&task.id) {
                        self.queue.enqueue_front(claim.task.spec());
                    }
                }
            }
            if !sent {
                return;
            }
        }
    }

    /// Next step after `completed_step` in the type's declared program.
    fn next_program_step(&self, workflow: &Workflow, completed_step: &str) -> Option<String> {
        let program = self.registry.program(&workflow.workflow_type)?;
        let idx = program.iter().position(|s| s == completed_step)?;
        program.get(idx + 1).cloned()
    }
}
