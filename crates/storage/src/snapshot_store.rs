// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! L1: in-memory state with periodic whole-state snapshots.
//!
//! Recovery replays the latest snapshot only; data loss is bounded by the
//! inter-snapshot interval.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use aether_core::{Workflow, WorkflowAction, WorkflowId};

use crate::snapshot::{load_snapshot, write_snapshot, Snapshot};
use crate::store::{ListFilter, StoreError, WorkflowStore};

const SNAPSHOT_FILE: &str = "snapshot.json";

pub struct SnapshotStore {
    workflows: HashMap<String, Workflow>,
    path: PathBuf,
    interval_ms: u64,
    last_written_ms: u64,
    dirty: bool,
}

impl SnapshotStore {
    pub fn open(db_path: &Path, interval_ms: u64) -> Result<Self, StoreError> {
        std::fs::create_dir_all(db_path)?;
        let path = db_path.join(SNAPSHOT_FILE);

        let workflows = match load_snapshot::<Vec<Workflow>>(&path)? {
            Some(snapshot) => {
                tracing::info!(
                    workflows = snapshot.state.len(),
                    created_at = %snapshot.created_at,
                    "loaded snapshot"
                );
                snapshot
                    .state
                    .into_iter()
                    .map(|w| (w.id.as_str().to_string(), w))
                    .collect()
            }
            None => HashMap::new(),
        };

        Ok(Self {
            workflows,
            path,
            interval_ms,
            last_written_ms: 0,
            dirty: false,
        })
    }

    fn write(&mut self, now_ms: u64) -> Result<(), StoreError> {
        let state: Vec<Workflow> = self.workflows.values().cloned().collect();
        write_snapshot(&self.path, &Snapshot::new(0, state))?;
        self.last_written_ms = now_ms;
        self.dirty = false;
        Ok(())
    }
}

impl WorkflowStore for SnapshotStore {
    fn create(&mut self, workflow: Workflow) -> Result<(), StoreError> {
        let id = workflow.id.as_str().to_string();
        if self.workflows.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        self.workflows.insert(id, workflow);
        self.dirty = true;
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
            .get_mut(id.as_str())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        workflow.seq += 1;
        workflow.apply(&action);
        self.dirty = true;
        Ok(workflow.clone())
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
        self.dirty = true;
        Ok(())
    }

    fn checkpoint(&mut self, now_ms: u64) -> Result<(), StoreError> {
        if self.dirty && now_ms.saturating_sub(self.last_written_ms) >= self.interval_ms {
            self.write(now_ms)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.dirty {
            self.write(self.last_written_ms)?;
        }
        Ok(())
    }
}
