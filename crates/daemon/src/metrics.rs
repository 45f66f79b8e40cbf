// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Counter exposition in Prometheus text format.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use aether_engine::Counters;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub struct Metrics {
    counters: Arc<Counters>,
    events_dropped: AtomicU64,
    started_at: Instant,
}

impl Metrics {
    pub fn new(counters: Arc<Counters>) -> Self {
        Self {
            counters,
            events_dropped: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn note_dropped_events(&self, missed: u64) {
        self.events_dropped.fetch_add(missed, Ordering::Relaxed);
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> String {
        let c = self.counters.snapshot();
        let dropped = self.events_dropped.load(Ordering::Relaxed);
        let mut out = String::new();
        let mut counter = |name: &str, help: &str, value: u64| {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {value}\n"
            ));
        };
        counter(
            "aether_workflows_started_total",
            "Workflows accepted by start-workflow.",
            c.workflows_started,
        );
        counter(
            "aether_workflows_completed_total",
            "Workflows that reached Completed.",
            c.workflows_completed,
        );
        counter(
            "aether_workflows_failed_total",
            "Workflows that reached Failed.",
            c.workflows_failed,
        );
        counter(
            "aether_workflows_cancelled_total",
            "Workflows that reached Cancelled.",
            c.workflows_cancelled,
        );
        counter(
            "aether_tasks_dispatched_total",
            "Tasks claimed by workers.",
            c.tasks_dispatched,
        );
        counter(
            "aether_tasks_completed_total",
            "Task completions accepted.",
            c.tasks_completed,
        );
        counter(
            "aether_tasks_redelivered_total",
            "Tasks redelivered after a lost claim.",
            c.tasks_redelivered,
        );
        counter(
            "aether_events_dropped_total",
            "Lifecycle events dropped for lagging subscribers.",
            dropped,
        );
        out.push_str(&format!(
            "# HELP aether_uptime_seconds Seconds since the coordinator started.\n# TYPE aether_uptime_seconds gauge\naether_uptime_seconds {}\n",
            self.uptime_secs(),
        ));
        out
    }
}

/// Minimal scrape endpoint: every request gets the current exposition.
pub(crate) async fn serve(tcp: TcpListener, metrics: Arc<Metrics>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("metrics listener stopping");
                return;
            }
            accepted = tcp.accept() => {
                match accepted {
                    Ok((mut stream, _)) => {
                        let metrics = Arc::clone(&metrics);
                        tokio::spawn(async move {
                            let mut discard = [0u8; 1024];
                            let _ = stream.read(&mut discard).await;
                            let body = metrics.render();
                            let response = format!(
                                "HTTP/1.1 200 OK\r\ncontent-type: text/plain; version=0.0.4\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                                body.len(),
                            );
                            if let Err(e) = stream.write_all(response.as_bytes()).await {
                                debug!(error = %e, "metrics write failed");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "metrics accept error"),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod tests;
