// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! L2: state + write-ahead action log.
//!
//! Layout: `<db>/workflows/<workflow-id>/` holds `state.json` (a versioned
//! per-workflow snapshot) and `actions.log` (the append-only action log).
//! Every mutation appends to the log before the in-memory state mutates
//! and before the caller is acknowledged. Recovery loads the snapshot and
//! replays log entries with a higher sequence.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aether_core::{Workflow, WorkflowAction, WorkflowId};

use crate::log::{ActionLog, LogEntry, CURRENT_LOG_VERSION};
use crate::snapshot::{load_snapshot, write_snapshot, Snapshot};
use crate::store::{ListFilter, StoreError, WorkflowStore};

const WORKFLOWS_DIR: &str = "workflows";
const STATE_FILE: &str = "state.json";
const LOG_FILE: &str = "actions.log";

/// Checkpoint cadence: rewrite the snapshot and truncate the log every
/// this many appended actions.
const CHECKPOINT_EVERY: u64 = 256;

pub struct DurableStore {
    root: PathBuf,
    workflows: HashMap<String, Workflow>,
    logs: HashMap<String, ActionLog>,
}

impl DurableStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let root = db_path.join(WORKFLOWS_DIR);
        std::fs::create_dir_all(&root)?;

        let mut workflows = HashMap::new();
        let mut logs = HashMap::new();

        for dir_entry in std::fs::read_dir(&root)? {
            let dir = dir_entry?.path();
            if !dir.is_dir() {
                continue;
            }

            let snapshot = load_snapshot::<Workflow>(&dir.join(STATE_FILE))?;
            let (log, entries) = ActionLog::open(&dir.join(LOG_FILE))?;

            let mut workflow = match snapshot {
                Some(s) => s.state,
                None => {
                    // Crash between directory creation and the first
                    // snapshot write; nothing recoverable lives here.
                    tracing::warn!(dir = %dir.display(), "workflow directory without state file, skipping");
                    continue;
                }
            };

            let mut replayed = 0usize;
            for entry in &entries {
                if entry.seq > workflow.seq {
                    workflow.apply(&entry.action);
                    workflow.seq = entry.seq;
                    replayed += 1;
                }
            }
            if replayed > 0 {
                tracing::debug!(
                    workflow_id = %workflow.id,
                    replayed,
                    seq = workflow.seq,
                    "replayed action log"
                );
            }

            let key = workflow.id.as_str().to_string();
            workflows.insert(key.clone(), workflow);
            logs.insert(key, log);
        }

        tracing::info!(workflows = workflows.len(), root = %root.display(), "opened durable store");
        Ok(Self { root, workflows, logs })
    }

    fn dir_for(&self, id: &str) -> PathBuf {
        self.root.join(id)
    }

    fn checkpoint_workflow(&mut self, id: &str) -> Result<(), StoreError> {
        let workflow = match self.workflows.get(id) {
            Some(w) => w.clone(),
            None => return Ok(()),
        };
        let seq = workflow.seq;
        write_snapshot(
            &self.dir_for(id).join(STATE_FILE),
            &Snapshot::new(seq, workflow),
        )?;
        if let Some(log) = self.logs.get_mut(id) {
            log.truncate_through(seq)?;
        }
        Ok(())
    }
}

impl WorkflowStore for DurableStore {
    fn create(&mut self, workflow: Workflow) -> Result<(), StoreError> {
        let id = workflow.id.as_str().to_string();
        if self.workflows.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        let dir = self.dir_for(&id);
        if dir.exists() {
            return Err(StoreError::Duplicate(id));
        }

        std::fs::create_dir_all(&dir)?;
        write_snapshot(&dir.join(STATE_FILE), &Snapshot::new(0, workflow.clone()))?;
        let (log, _) = ActionLog::open(&dir.join(LOG_FILE))?;

        self.workflows.insert(id.clone(), workflow);
        self.logs.insert(id, log);
        Ok(())
    }

    fn get(&self, id: &WorkflowId) -> Result<Workflow, StoreError> {
        self.workflows
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn update(&mut self, id: &WorkflowId, action: WorkflowAction) -> Result<Workflow, StoreError> {
        let workflow = self
            .workflows
            .get(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        // Apply to a scratch copy so the log records the real transition
        // and a failed append leaves the in-memory state untouched.
        let mut next = workflow.clone();
        next.seq += 1;
        next.apply(&action);

        let at_ms = match &action {
            WorkflowAction::StepEnqueued { at_ms, .. }
            | WorkflowAction::StepStarted { at_ms, .. }
            | WorkflowAction::StepCompleted { at_ms, .. }
            | WorkflowAction::StepFailed { at_ms, .. }
            | WorkflowAction::StepCancelled { at_ms, .. }
            | WorkflowAction::StepReported { at_ms, .. }
            | WorkflowAction::CancelRequested { at_ms }
            | WorkflowAction::Completed { at_ms, .. }
            | WorkflowAction::Failed { at_ms, .. }
            | WorkflowAction::Cancelled { at_ms } => *at_ms,
        };

        let entry = LogEntry {
            version: CURRENT_LOG_VERSION,
            seq: next.seq,
            at_ms,
            kind: action.name().to_string(),
            before: workflow.state.to_string(),
            after: next.state.to_string(),
            action,
        };

        let log = self
            .logs
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        log.append(&entry)?;

        let seq = next.seq;
        self.workflows.insert(id.as_str().to_string(), next.clone());

        // The append above already made the action durable; a failed
        // snapshot rewrite must not turn a committed update into an
        // error. The log is simply retained until the next checkpoint.
        if seq % CHECKPOINT_EVERY == 0 {
            if let Err(e) = self.checkpoint_workflow(id.as_str()) {
                tracing::warn!(workflow_id = %id, error = %e, "checkpoint failed, log retained");
            }
        }

        Ok(next)
    }

    fn list(&self, filter: &ListFilter) -> Result<Vec<Workflow>, StoreError> {
        let mut matched: Vec<Workflow> = self
            .workflows
            .values()
            .filter(|w| filter.matches(w))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            (a.created_at_ms, a.id.as_str()).cmp(&(b.created_at_ms, b.id.as_str()))
        });
        Ok(matched)
    }

    fn remove(&mut self, id: &WorkflowId) -> Result<(), StoreError> {
        self.workflows
            .remove(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        self.logs.remove(id.as_str());
        let dir = self.dir_for(id.as_str());
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    fn checkpoint(&mut self, _now_ms: u64) -> Result<(), StoreError> {
        // Per-workflow checkpoints happen inline every CHECKPOINT_EVERY
        // actions; nothing is time-driven here.
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        let ids: Vec<String> = self.workflows.keys().cloned().collect();
        for id in ids {
            self.checkpoint_workflow(&id)?;
        }
        Ok(())
    }
}
