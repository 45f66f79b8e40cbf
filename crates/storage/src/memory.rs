// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! L0: in-process state, lost on restart.

use std::collections::HashMap;

use aether_core::{Workflow, WorkflowAction, WorkflowId};

use crate::store::{ListFilter, StoreError, WorkflowStore};

/// Development/test tier; everything lives in one map.
#[derive(Default)]
pub struct MemoryStore {
    workflows: HashMap<String, Workflow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.is_empty()
    }
}

impl WorkflowStore for MemoryStore {
    fn create(&mut self, workflow: Workflow) -> Result<(), StoreError> {
        let id = workflow.id.as_str().to_string();
        if self.workflows.contains_key(&id) {
            return Err(StoreError::Duplicate(id));
        }
        self.workflows.insert(id, workflow);
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
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn checkpoint(&mut self, _now_ms: u64) -> Result<(), StoreError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}
