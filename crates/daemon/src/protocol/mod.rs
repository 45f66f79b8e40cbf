// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coordinator wire protocol.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! One logical transport carries both planes: clients
//! (start/status/await/cancel) and workers (register/poll/complete/
//! report/heartbeat). A worker's streaming claim runs over a dedicated
//! connection switched into push mode by `OpenTaskStream`.

mod request;
mod response;
mod types;
mod wire;

pub use request::Request;
pub use response::Response;
pub use types::{
    AwaitOutcomeDto, CancelOutcomeDto, CompletionDto, StepRecordDetail, TaskDto, WorkerSummary,
    WorkflowDetail, WorkflowStatusDto, WorkflowSummary,
};
pub use wire::{decode, encode, read_message, write_message, ProtocolError, MAX_FRAME_BYTES};

/// Protocol version exchanged in the Hello handshake.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");
