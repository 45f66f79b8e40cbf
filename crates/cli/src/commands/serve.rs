// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `aether serve`: run the coordinator in-process.

use std::path::PathBuf;

use aether_core::{Config, PersistenceMode};
use anyhow::Context;
use clap::Args;
use tracing_subscriber::EnvFilter;

#[derive(Args)]
pub struct ServeArgs {
    /// Config file (TOML); flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// State directory
    #[arg(long)]
    db: Option<PathBuf>,

    /// Coordinator API port
    #[arg(long)]
    grpc_port: Option<u16>,

    /// Monitor/health port
    #[arg(long)]
    http_port: Option<u16>,

    /// Durability tier: memory | snapshot | state-action-log
    #[arg(long)]
    persistence: Option<String>,
}

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_env("AETHER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &args.config {
        Some(path) => {
            Config::load(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };

    if let Some(db) = args.db {
        config.server.db_path = db;
    }
    if let Some(port) = args.grpc_port {
        config.server.grpc_port = port;
    }
    if let Some(port) = args.http_port {
        config.server.http_port = port;
    }
    if let Some(mode) = args.persistence {
        config.persistence.mode = mode
            .parse::<PersistenceMode>()
            .map_err(anyhow::Error::msg)?;
    }

    aether_daemon::run_until_shutdown(config)
        .await
        .context("coordinator failed")
}
