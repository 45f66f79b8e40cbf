// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Aether coordinator daemon.
//!
//! Hosts the coordinator API (framed JSON over TCP, client plane and
//! worker plane), the monitor WebSocket channel with a health endpoint,
//! and the optional metrics exposition port.

mod listener;

pub mod lifecycle;
pub mod metrics;
pub mod monitor;
pub mod protocol;

pub use lifecycle::{run_until_shutdown, Server, ServerError};
pub use protocol::{
    read_message, write_message, AwaitOutcomeDto, CancelOutcomeDto, CompletionDto,
    ProtocolError, Request, Response, StepRecordDetail, TaskDto, WorkerSummary, WorkflowDetail,
    WorkflowStatusDto, WorkflowSummary, PROTOCOL_VERSION,
};
