// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Runtime behavior tests over a memory store and a fake clock.

mod cancel;
mod client;
mod recovery;
mod retry;
mod worker;

use std::time::Duration;

use aether_core::{
    Backoff, Capability, FakeClock, Payload, RetryPolicy, SessionToken, Task,
};
use aether_storage::MemoryStore;

use super::*;
use crate::bus::{BusItem, EventBus, Subscription};
use crate::registry::Registration;

pub(crate) struct TestCtx {
    pub handle: RuntimeHandle,
    pub clock: FakeClock,
    pub bus: EventBus,
}

/// Fast-feedback defaults: no backoff, short deadlines, fake time.
fn test_config() -> RuntimeConfig {
    RuntimeConfig {
        heartbeat_ms: 30_000,
        visibility_ms: 60_000,
        cancel_deadline_ms: 10_000,
        retention_ms: None,
        retry: RetryPolicy { max_retries: 3, backoff: Backoff::None },
    }
}

fn setup() -> TestCtx {
    setup_with(test_config())
}

fn setup_with(cfg: RuntimeConfig) -> TestCtx {
    let clock = FakeClock::new();
    let bus = EventBus::new(256);
    let handle = Runtime::spawn(Box::new(MemoryStore::new()), bus.clone(), clock.clone(), cfg);
    TestCtx { handle, clock, bus }
}

async fn register(ctx: &TestCtx, types: &[&str]) -> Registration {
    ctx.handle
        .register(
            None,
            "test-svc",
            "default",
            vec![],
            types.iter().map(|t| t.to_string()).collect(),
        )
        .await
        .unwrap()
}

async fn register_with_caps(
    ctx: &TestCtx,
    types: &[&str],
    capabilities: Vec<Capability>,
) -> Registration {
    ctx.handle
        .register(
            None,
            "test-svc",
            "default",
            capabilities,
            types.iter().map(|t| t.to_string()).collect(),
        )
        .await
        .unwrap()
}

async fn poll_one(ctx: &TestCtx, session: SessionToken) -> Task {
    let tasks = ctx.handle.poll_tasks(session, 1).await.unwrap();
    assert_eq!(tasks.len(), 1, "expected exactly one task");
    tasks.into_iter().next().unwrap()
}

/// Drain every event currently in the subscription, returning the tags.
fn drain_kinds(sub: &mut Subscription) -> Vec<String> {
    let mut kinds = Vec::new();
    while let Some(item) = sub.try_recv() {
        if let BusItem::Event(event) = item {
            kinds.push(event.kind().to_string());
        }
    }
    kinds
}

async fn advance_and_tick(ctx: &TestCtx, ms: u64) {
    ctx.clock.advance(Duration::from_millis(ms));
    ctx.handle.tick().await;
}
