// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process lifecycle event broadcast.
//!
//! Non-blocking: a slow subscriber never stalls the emitter. The broadcast
//! ring drops the oldest events for a laggard, surfaced to that subscriber
//! as a gap marker; after a gap the subscriber is expected to re-read
//! authoritative state through the monitor queries. Events for one
//! workflow are published in commit order by the single runtime loop, so
//! per-workflow ordering holds for all non-dropped events.

use aether_core::{EventFilter, LifecycleEvent};
use tokio::sync::broadcast;

pub const DEFAULT_CAPACITY: usize = 1024;

/// Broadcast handle; cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LifecycleEvent>,
}

/// What a subscriber receives next.
#[derive(Debug, Clone, PartialEq)]
pub enum BusItem {
    Event(LifecycleEvent),
    /// The subscriber fell behind; `missed` oldest events were dropped.
    Gap { missed: u64 },
}

pub struct Subscription {
    rx: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to all current subscribers; a bus with no subscribers
    /// swallows the event (delivery is best-effort by contract).
    pub fn publish(&self, event: LifecycleEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription { rx: self.tx.subscribe(), filter }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Subscription {
    /// Next matching event or a gap marker; `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusItem> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(BusItem::Event(event)),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    return Some(BusItem::Gap { missed })
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant for tests and drain loops.
    pub fn try_recv(&mut self) -> Option<BusItem> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if self.filter.matches(&event) => return Some(BusItem::Event(event)),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    return Some(BusItem::Gap { missed })
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
