// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Time sources for the coordination plane.
//!
//! Everything time-dependent (heartbeat expiry, visibility deadlines,
//! retention) reads through [`Clock`] so tests can drive the timeline
//! explicitly instead of sleeping.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant, UNIX_EPOCH};

/// Monotonic instants for interval math plus wall-clock epoch
/// milliseconds for persisted timestamps.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn epoch_ms(&self) -> u64;
}

/// Process clock backed by the operating system.
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_ms(&self) -> u64 {
        UNIX_EPOCH
            .elapsed()
            .map(|since| since.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Test clock that only moves when told to.
///
/// Clones share one timeline: a handle given to the runtime and a handle
/// kept by the test advance together.
#[derive(Clone)]
pub struct FakeClock {
    origin: Instant,
    timeline: Arc<Mutex<Timeline>>,
}

struct Timeline {
    elapsed: Duration,
    epoch_ms: u64,
}

impl FakeClock {
    /// Arbitrary nonzero starting point so saturating subtractions in
    /// expiry math behave like they do on a real clock.
    const START_EPOCH_MS: u64 = 1_000_000;

    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            timeline: Arc::new(Mutex::new(Timeline {
                elapsed: Duration::ZERO,
                epoch_ms: Self::START_EPOCH_MS,
            })),
        }
    }

    /// Move both the instant and the epoch forward.
    pub fn advance(&self, by: Duration) {
        let mut timeline = self.timeline.lock();
        timeline.elapsed += by;
        timeline.epoch_ms += by.as_millis() as u64;
    }

    /// Pin the epoch to an exact value; the instant is unaffected.
    pub fn set_epoch_ms(&self, ms: u64) {
        self.timeline.lock().epoch_ms = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.origin + self.timeline.lock().elapsed
    }

    fn epoch_ms(&self) -> u64 {
        self.timeline.lock().epoch_ms
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
