// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! aether-engine: event bus, worker registry, task queue, and the
//! coordinator runtime for the Aether control plane.
//!
//! The runtime serializes every mutation through one loop, so per-workflow
//! transition atomicity (validate → persist → emit → enqueue → ack) holds
//! without any locking in the handlers themselves.

pub mod bus;
pub mod queue;
pub mod registry;
pub mod runtime;

pub use bus::{BusItem, EventBus, Subscription};
pub use queue::{Claim, TaskQueue};
pub use registry::{Registration, WorkerRegistry};
pub use runtime::{
    AwaitOutcome, CancelOutcome, Counters, CounterSnapshot, HealthView, Runtime, RuntimeConfig,
    RuntimeHandle, StatusView, StepOutcome, StreamPush,
};
