// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server startup and shutdown.
//!
//! Startup order matters: acquire the db lock first (one coordinator per
//! state directory), recover the store, spawn the runtime, and bind the
//! listeners last so no request arrives before state is consistent.

use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aether_core::{Config, SystemClock};
use aether_engine::{EventBus, Runtime, RuntimeConfig, RuntimeHandle};
use aether_storage::{open_store, StoreError};
use fs2::FileExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::listener::{ListenCtx, Listener};
use crate::metrics::{self, Metrics};
use crate::monitor::{MonitorCtx, MonitorServer};

const LOCK_FILE: &str = "aetherd.lock";
const VERSION_FILE: &str = "VERSION";

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("another coordinator holds the lock on {0}")]
    Locked(std::path::PathBuf),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("failed to bind {0}: {1}")]
    Bind(SocketAddr, std::io::Error),
}

/// A running coordinator. Dropping it leaks the background tasks; call
/// [`Server::shutdown`] for a clean stop or [`Server::abort`] to simulate
/// a crash (no flush).
pub struct Server {
    pub handle: RuntimeHandle,
    pub bus: EventBus,
    /// Actual coordinator-plane address (useful with port 0).
    pub grpc_addr: SocketAddr,
    /// Actual monitor/health address.
    pub http_addr: SocketAddr,
    pub metrics_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    _lock: std::fs::File,
}

impl Server {
    pub async fn start(config: Config) -> Result<Self, ServerError> {
        let db_path = &config.server.db_path;
        std::fs::create_dir_all(db_path)?;

        let lock = acquire_lock(db_path)?;
        std::fs::write(db_path.join(VERSION_FILE), env!("CARGO_PKG_VERSION"))?;

        let store = open_store(
            config.persistence.mode,
            db_path,
            config.timeouts.snapshot_interval_ms,
        )?;
        info!(
            mode = %config.persistence.mode,
            db_path = %db_path.display(),
            "store opened"
        );

        let bus = EventBus::default();
        let handle = Runtime::spawn(
            store,
            bus.clone(),
            SystemClock,
            RuntimeConfig::from_config(&config),
        );

        let shutdown = CancellationToken::new();
        let metrics = Arc::new(Metrics::new(Arc::clone(handle.counters())));
        let mut tasks = Vec::new();

        // Coordinator plane.
        let grpc_listener = bind(config.server.grpc_port).await?;
        let grpc_addr = grpc_listener.local_addr()?;
        let listen_ctx = Arc::new(ListenCtx {
            runtime: handle.clone(),
            shutdown: shutdown.clone(),
        });
        tasks.push(tokio::spawn(
            Listener::new(grpc_listener, listen_ctx).run(),
        ));

        // Monitor plane + health.
        let http_listener = bind(config.server.http_port).await?;
        let http_addr = http_listener.local_addr()?;
        let monitor_ctx = Arc::new(MonitorCtx {
            runtime: handle.clone(),
            bus: bus.clone(),
            metrics: Arc::clone(&metrics),
            shutdown: shutdown.clone(),
        });
        tasks.push(tokio::spawn(
            MonitorServer::new(http_listener, monitor_ctx).run(),
        ));

        // Metrics exposition, when enabled.
        let metrics_addr = if config.metrics.enabled {
            let metrics_listener = bind(config.metrics.port).await?;
            let addr = metrics_listener.local_addr()?;
            tasks.push(tokio::spawn(metrics::serve(
                metrics_listener,
                Arc::clone(&metrics),
                shutdown.clone(),
            )));
            Some(addr)
        } else {
            None
        };

        // Periodic sweep: liveness, visibility, deadlines, retention.
        {
            let handle = handle.clone();
            let shutdown = shutdown.clone();
            let interval = Duration::from_millis(config.timeouts.sweep_interval_ms.max(10));
            tasks.push(tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => return,
                        _ = ticker.tick() => handle.tick().await,
                    }
                }
            }));
        }

        info!(
            grpc = %grpc_addr,
            http = %http_addr,
            metrics = ?metrics_addr,
            "coordinator listening"
        );

        Ok(Server {
            handle,
            bus,
            grpc_addr,
            http_addr,
            metrics_addr,
            shutdown,
            tasks,
            _lock: lock,
        })
    }

    /// Drain listeners, flush the store, stop the runtime.
    pub async fn shutdown(self) {
        info!("coordinator shutting down");
        self.shutdown.cancel();
        self.handle.shutdown().await;
        for task in self.tasks {
            if tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .is_err()
            {
                warn!("background task did not stop within the drain window");
            }
        }
    }

    /// Stop without flushing, as a crash would. Durable tiers must
    /// recover from whatever already reached disk.
    pub fn abort(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            task.abort();
        }
    }
}

fn acquire_lock(db_path: &Path) -> Result<std::fs::File, ServerError> {
    let lock_path = db_path.join(LOCK_FILE);
    // Avoid truncating before the lock is held: the file may carry the
    // pid of a live coordinator.
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)?;
    file.try_lock_exclusive()
        .map_err(|_| ServerError::Locked(lock_path))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

async fn bind(port: u16) -> Result<TcpListener, ServerError> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(addr, e))
}

/// Run until ctrl-c, then drain.
pub async fn run_until_shutdown(config: Config) -> Result<(), ServerError> {
    let server = Server::start(config).await?;
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("ctrl-c received"),
        Err(e) => warn!(error = %e, "ctrl-c handler failed, shutting down"),
    }
    server.shutdown().await;
    Ok(())
}
