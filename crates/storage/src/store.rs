// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store interface and tier selection.

use std::path::Path;

use aether_core::{
    CoreError, PersistenceMode, Workflow, WorkflowAction, WorkflowId, WorkflowState,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::durable::DurableStore;
use crate::memory::MemoryStore;
use crate::snapshot_store::SnapshotStore;

/// Errors from the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("workflow not found: {0}")]
    NotFound(String),

    #[error("duplicate workflow id: {0}")]
    Duplicate(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<StoreError> for CoreError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => CoreError::NotFound(id),
            StoreError::Duplicate(id) => CoreError::Duplicate(id),
            other => CoreError::PersistenceFailure(other.to_string()),
        }
    }
}

/// Filter for workflow listings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    pub active_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<WorkflowState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since_ms: Option<u64>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn active() -> Self {
        Self { active_only: true, ..Self::default() }
    }

    pub fn matches(&self, workflow: &Workflow) -> bool {
        if self.active_only && workflow.is_terminal() {
            return false;
        }
        if let Some(t) = &self.workflow_type {
            if workflow.workflow_type != *t {
                return false;
            }
        }
        if let Some(state) = self.state {
            if workflow.state != state {
                return false;
            }
        }
        if let Some(since) = self.since_ms {
            if workflow.created_at_ms < since {
                return false;
            }
        }
        true
    }
}

/// Uniform interface over the persistence tiers.
///
/// All operations are atomic with respect to a single workflow id; the
/// engine serializes mutations per workflow before they reach the store.
/// On startup every implementation presents a consistent snapshot of its
/// contents before any mutation is accepted.
pub trait WorkflowStore: Send {
    fn create(&mut self, workflow: Workflow) -> Result<(), StoreError>;

    fn get(&self, id: &WorkflowId) -> Result<Workflow, StoreError>;

    /// Apply a replayable action to one workflow and return the new state.
    ///
    /// For the durable tier the action record reaches the log before the
    /// in-memory state mutates and before this returns.
    fn update(&mut self, id: &WorkflowId, action: WorkflowAction) -> Result<Workflow, StoreError>;

    fn list(&self, filter: &ListFilter) -> Result<Vec<Workflow>, StoreError>;

    /// Retention prune; also removes on-disk artifacts where present.
    fn remove(&mut self, id: &WorkflowId) -> Result<(), StoreError>;

    /// Periodic maintenance: snapshot flush / log checkpointing.
    fn checkpoint(&mut self, now_ms: u64) -> Result<(), StoreError>;

    /// Flush everything; called at clean shutdown.
    fn flush(&mut self) -> Result<(), StoreError>;
}

/// Open the store for the configured durability tier.
pub fn open_store(
    mode: PersistenceMode,
    db_path: &Path,
    snapshot_interval_ms: u64,
) -> Result<Box<dyn WorkflowStore>, StoreError> {
    match mode {
        PersistenceMode::Memory => Ok(Box::new(MemoryStore::new())),
        PersistenceMode::Snapshot => Ok(Box::new(SnapshotStore::open(
            db_path,
            snapshot_interval_ms,
        )?)),
        PersistenceMode::StateActionLog => Ok(Box::new(DurableStore::open(db_path)?)),
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
