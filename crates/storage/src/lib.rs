// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aether-storage: tiered persistence for workflow state
//!
//! Three durability tiers behind one [`WorkflowStore`] interface:
//!
//! - **memory** - in-process only; development and tests.
//! - **snapshot** - in-memory state with periodic whole-state snapshots;
//!   loss bounded by the snapshot interval.
//! - **state-action-log** - per-workflow directory holding a snapshot file
//!   plus an append-only action log; every mutation reaches the log before
//!   the caller is acknowledged.

mod durable;
mod log;
mod memory;
mod snapshot;
mod snapshot_store;
mod store;

pub use durable::DurableStore;
pub use log::{ActionLog, LogEntry, CURRENT_LOG_VERSION};
pub use memory::MemoryStore;
pub use snapshot::{load_snapshot, write_snapshot, Snapshot, CURRENT_SNAPSHOT_VERSION};
pub use snapshot_store::SnapshotStore;
pub use store::{open_store, ListFilter, StoreError, WorkflowStore};
