// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Startup recovery.
//!
//! Non-terminal workflows are re-enqueued for their current step so they
//! make progress as soon as workers reconnect. A workflow whose next step
//! cannot be derived without dispatch metadata (the type's program or
//! driving mode, learned from registrations) is parked and re-examined on
//! every registration that advertises its type.

use aether_core::{Clock, CoreError, StepStatus, TaskSpec, Workflow, WorkflowAction, WorkflowId};
use aether_storage::ListFilter;

use super::Runtime;

impl<C: Clock> Runtime<C> {
    pub(super) fn recover(&mut self) {
        let workflows = match self.store.list(&ListFilter::all()) {
            Ok(w) => w,
            Err(e) => {
                tracing::error!(error = %e, "recovery listing failed, starting read-only");
                self.read_only = true;
                return;
            }
        };

        let now = self.clock.epoch_ms();
        let mut requeued = 0usize;
        let mut parked = 0usize;

        for workflow in workflows {
            if workflow.is_terminal() {
                continue;
            }
            if workflow.cancel_requested {
                self.cancel_deadlines
                    .insert(workflow.id, now + self.cfg.cancel_deadline_ms);
            }
            match workflow.last_task_step() {
                // The in-flight attempt survived in the record; queue it
                // again (its old claim died with the process).
                Some(record) if !record.is_terminal() => {
                    let spec = TaskSpec {
                        workflow_id: workflow.id,
                        workflow_type: workflow.workflow_type.clone(),
                        step_name: record.step_name.clone(),
                        attempt: record.attempt,
                        input: record.input.clone(),
                        retry: self.cfg.retry,
                    };
                    self.queue.enqueue(spec);
                    requeued += 1;
                }
                // Crash landed between a step transition and the next
                // enqueue; the next step needs dispatch metadata.
                _ => {
                    self.parked.insert(workflow.id);
                    parked += 1;
                }
            }
        }

        if requeued + parked > 0 {
            tracing::info!(requeued, parked, "recovered non-terminal workflows");
        }
    }

    /// Re-examine parked workflows once a registration brought dispatch
    /// metadata for their type.
    pub(super) fn advance_parked(&mut self, workflow_types: &[String]) {
        let candidates: Vec<WorkflowId> = self.parked.iter().copied().collect();
        for workflow_id in candidates {
            let workflow = match self.store.get(&workflow_id) {
                Ok(w) => w,
                Err(_) => {
                    self.parked.remove(&workflow_id);
                    continue;
                }
            };
            if workflow.is_terminal() {
                self.parked.remove(&workflow_id);
                continue;
            }
            if !workflow_types.contains(&workflow.workflow_type) {
                continue;
            }
            self.parked.remove(&workflow_id);
            if let Err(e) = self.advance_recovered(&workflow) {
                tracing::error!(
                    workflow_id = %workflow_id,
                    error = %e,
                    "failed to advance recovered workflow"
                );
            }
        }
    }

    fn advance_recovered(&mut self, workflow: &Workflow) -> Result<(), CoreError> {
        let now = self.clock.epoch_ms();

        if let Some(program) = self
            .registry
            .program(&workflow.workflow_type)
            .map(<[String]>::to_vec)
        {
            let mut input = workflow.input.clone();
            for step in &program {
                match workflow.latest_step(step) {
                    None => {
                        return self.enqueue_step(
                            workflow.id,
                            &workflow.workflow_type,
                            step.clone(),
                            1,
                            input,
                        );
                    }
                    Some(r) if r.status == StepStatus::Completed => {
                        input = r.output.clone().unwrap_or_default();
                    }
                    Some(r) if !r.is_terminal() => {
                        let spec = TaskSpec {
                            workflow_id: workflow.id,
                            workflow_type: workflow.workflow_type.clone(),
                            step_name: r.step_name.clone(),
                            attempt: r.attempt,
                            input: r.input.clone(),
                            retry: self.cfg.retry,
                        };
                        self.queue.enqueue(spec);
                        self.dispatch_streams(&workflow.workflow_type);
                        return Ok(());
                    }
                    Some(r) if r.status == StepStatus::Failed => {
                        return self.resume_failed_step(workflow, step, r.error.clone(), now);
                    }
                    Some(_) => {
                        // A cancelled record on a live workflow: the
                        // cancel transition itself was lost.
                        let cancelled = self
                            .persist(&workflow.id, WorkflowAction::Cancelled { at_ms: now })?;
                        self.finalized(&cancelled);
                        return Ok(());
                    }
                }
            }
            // Every declared step completed: the final transition was lost.
            let completed = self
                .persist(&workflow.id, WorkflowAction::Completed { result: input, at_ms: now })?;
            self.finalized(&completed);
            return Ok(());
        }

        // Auto / body-in-worker types: a single driving task.
        match workflow.last_task_step() {
            None => self.enqueue_step(
                workflow.id,
                &workflow.workflow_type,
                "start".to_string(),
                1,
                workflow.input.clone(),
            ),
            Some(r) if !r.is_terminal() => {
                let spec = TaskSpec {
                    workflow_id: workflow.id,
                    workflow_type: workflow.workflow_type.clone(),
                    step_name: r.step_name.clone(),
                    attempt: r.attempt,
                    input: r.input.clone(),
                    retry: self.cfg.retry,
                };
                self.queue.enqueue(spec);
                self.dispatch_streams(&workflow.workflow_type);
                Ok(())
            }
            Some(r) if r.status == StepStatus::Completed => {
                let result = r.output.clone().unwrap_or_default();
                let completed = self
                    .persist(&workflow.id, WorkflowAction::Completed { result, at_ms: now })?;
                self.finalized(&completed);
                Ok(())
            }
            Some(r) if r.status == StepStatus::Failed => {
                let step = r.step_name.clone();
                let error = r.error.clone();
                self.resume_failed_step(workflow, &step, error, now)
            }
            Some(_) => {
                let cancelled =
                    self.persist(&workflow.id, WorkflowAction::Cancelled { at_ms: now })?;
                self.finalized(&cancelled);
                Ok(())
            }
        }
    }

    /// A recovered step had failed: resume its retry budget where it was.
    fn resume_failed_step(
        &mut self,
        workflow: &Workflow,
        step: &str,
        error: Option<String>,
        now: u64,
    ) -> Result<(), CoreError> {
        let failures = workflow.error_attempts(step);
        if failures < self.cfg.retry.max_retries {
            let attempt = workflow.latest_attempt(step) + 1;
            let input = workflow
                .latest_step(step)
                .map(|r| r.input.clone())
                .unwrap_or_else(|| workflow.input.clone());
            return self.enqueue_step(
                workflow.id,
                &workflow.workflow_type,
                step.to_string(),
                attempt,
                input,
            );
        }
        let failed = self.persist(
            &workflow.id,
            WorkflowAction::Failed { error: error.unwrap_or_default(), at_ms: now },
        )?;
        self.finalized(&failed);
        Ok(())
    }
}
