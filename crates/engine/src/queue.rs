// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-workflow-type FIFO task queues with claim semantics.
//!
//! A task is claimed at dispatch: a fresh task id is minted, the claiming
//! session recorded, and a visibility deadline set. While claimed the task
//! is offered to no one else. Releasing a claim (dead session, visibility
//! timeout, explicit return) puts the work back at the head of its queue so
//! per-workflow FIFO order survives redelivery.

use std::collections::{HashMap, VecDeque};

use aether_core::{SessionToken, Task, TaskId, TaskSpec, WorkflowId};

/// Completed task ids kept for duplicate-completion detection.
const COMPLETED_CAP: usize = 8192;

/// A dispatched task held by one worker session until completion,
/// heartbeat expiry, or release.
#[derive(Debug, Clone, PartialEq)]
pub struct Claim {
    pub task: Task,
    pub session: SessionToken,
    pub deadline_ms: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTask {
    pub workflow_id: WorkflowId,
    pub step_name: String,
    pub attempt: u32,
}

#[derive(Default)]
pub struct TaskQueue {
    queues: HashMap<String, VecDeque<TaskSpec>>,
    /// Backoff-delayed retries, promoted into their queue when due.
    delayed: Vec<(u64, TaskSpec)>,
    claims: HashMap<TaskId, Claim>,
    completed: HashMap<TaskId, CompletedTask>,
    completed_order: VecDeque<TaskId>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn holds(&self, spec: &TaskSpec) -> bool {
        let key = spec.key();
        self.queues
            .get(&spec.workflow_type)
            .is_some_and(|q| q.iter().any(|s| s.key() == key))
            || self.delayed.iter().any(|(_, s)| s.key() == key)
            || self.claims.values().any(|c| c.task.spec().key() == key)
    }

    /// Enqueue at the tail. Idempotent keyed (workflow, step, attempt):
    /// returns false when the attempt is already queued, delayed, or
    /// claimed.
    pub fn enqueue(&mut self, spec: TaskSpec) -> bool {
        if self.holds(&spec) {
            return false;
        }
        self.queues
            .entry(spec.workflow_type.clone())
            .or_default()
            .push_back(spec);
        true
    }

    /// Enqueue at the head (redelivery path).
    pub fn enqueue_front(&mut self, spec: TaskSpec) -> bool {
        if self.holds(&spec) {
            return false;
        }
        self.queues
            .entry(spec.workflow_type.clone())
            .or_default()
            .push_front(spec);
        true
    }

    /// Hold a retry until its backoff delay elapses.
    pub fn enqueue_delayed(&mut self, spec: TaskSpec, ready_at_ms: u64) -> bool {
        if self.holds(&spec) {
            return false;
        }
        self.delayed.push((ready_at_ms, spec));
        true
    }

    /// Move due retries into their queues; returns the affected types.
    pub fn promote_delayed(&mut self, now_ms: u64) -> Vec<String> {
        let mut due: Vec<TaskSpec> = Vec::new();
        self.delayed.retain(|(ready_at, spec)| {
            if *ready_at <= now_ms {
                due.push(spec.clone());
                false
            } else {
                true
            }
        });
        // Due retries were failures of the workflow's current step; they
        // go to the head so redelivery preserves FIFO order.
        due.sort_by_key(|s| std::cmp::Reverse(s.attempt));
        let mut types: Vec<String> = Vec::new();
        for spec in due {
            if !types.contains(&spec.workflow_type) {
                types.push(spec.workflow_type.clone());
            }
            let t = spec.workflow_type.clone();
            if !self.holds(&spec) {
                self.queues.entry(t).or_default().push_front(spec);
            }
        }
        types
    }

    /// Claim the head task of one type for a session.
    pub fn claim_one(
        &mut self,
        session: &SessionToken,
        workflow_type: &str,
        now_ms: u64,
        visibility_ms: u64,
    ) -> Option<Task> {
        let queue = self.queues.get_mut(workflow_type)?;
        let spec = queue.pop_front()?;
        let task = Task::from_spec(TaskId::new(), spec);
        self.claims.insert(
            task.id,
            Claim {
                task: task.clone(),
                session: *session,
                deadline_ms: now_ms + visibility_ms,
            },
        );
        Some(task)
    }

    /// Claim up to `max` tasks across the given types, round-robin.
    pub fn claim_batch(
        &mut self,
        session: &SessionToken,
        types: &[String],
        max: usize,
        now_ms: u64,
        visibility_ms: u64,
    ) -> Vec<Task> {
        let mut tasks = Vec::new();
        'outer: loop {
            let mut progressed = false;
            for workflow_type in types {
                if tasks.len() >= max {
                    break 'outer;
                }
                if let Some(task) = self.claim_one(session, workflow_type, now_ms, visibility_ms) {
                    tasks.push(task);
                    progressed = true;
                }
            }
            if !progressed {
                break;
            }
        }
        tasks
    }

    /// Refresh a claim's visibility deadline.
    pub fn heartbeat_task(&mut self, task_id: &TaskId, now_ms: u64, visibility_ms: u64) -> bool {
        match self.claims.get_mut(task_id) {
            Some(claim) => {
                claim.deadline_ms = now_ms + visibility_ms;
                true
            }
            None => false,
        }
    }

    pub fn claim(&self, task_id: &TaskId) -> Option<&Claim> {
        self.claims.get(task_id)
    }

    /// Remove and return a claim (completion path).
    pub fn take_claim(&mut self, task_id: &TaskId) -> Option<Claim> {
        self.claims.remove(task_id)
    }

    /// Put a claim back untouched (completion rejected).
    pub fn restore_claim(&mut self, claim: Claim) {
        self.claims.insert(claim.task.id, claim);
    }

    /// Remember a completed task id so duplicate completions are no-ops.
    pub fn mark_completed(&mut self, task_id: TaskId, done: CompletedTask) {
        if self.completed.insert(task_id, done).is_none() {
            self.completed_order.push_back(task_id);
        }
        while self.completed_order.len() > COMPLETED_CAP {
            if let Some(old) = self.completed_order.pop_front() {
                self.completed.remove(&old);
            }
        }
    }

    pub fn completed(&self, task_id: &TaskId) -> Option<&CompletedTask> {
        self.completed.get(task_id)
    }

    /// Remove every claim held by a session (dead worker path).
    pub fn release_session(&mut self, session: &SessionToken) -> Vec<Claim> {
        let ids: Vec<TaskId> = self
            .claims
            .iter()
            .filter(|(_, c)| c.session == *session)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.claims.remove(&id))
            .collect()
    }

    /// Remove claims whose visibility deadline has passed.
    pub fn expire(&mut self, now_ms: u64) -> Vec<Claim> {
        let ids: Vec<TaskId> = self
            .claims
            .iter()
            .filter(|(_, c)| c.deadline_ms <= now_ms)
            .map(|(id, _)| *id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.claims.remove(&id))
            .collect()
    }

    /// The claim currently covering a workflow, if any.
    pub fn claim_for_workflow(&self, workflow_id: &WorkflowId) -> Option<(TaskId, SessionToken)> {
        self.claims
            .iter()
            .find(|(_, c)| c.task.workflow_id == *workflow_id)
            .map(|(id, c)| (*id, c.session))
    }

    /// Remove queued and delayed work for a workflow (cancellation).
    /// Claims are left alone; the running worker is notified separately.
    pub fn drop_workflow(&mut self, workflow_id: &WorkflowId) -> usize {
        let mut removed = 0;
        for queue in self.queues.values_mut() {
            let before = queue.len();
            queue.retain(|s| s.workflow_id != *workflow_id);
            removed += before - queue.len();
        }
        let before = self.delayed.len();
        self.delayed.retain(|(_, s)| s.workflow_id != *workflow_id);
        removed + before - self.delayed.len()
    }

    pub fn queued_len(&self, workflow_type: &str) -> usize {
        self.queues.get(workflow_type).map_or(0, VecDeque::len)
    }

    pub fn total_queued(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn claimed_len(&self) -> usize {
        self.claims.len()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
