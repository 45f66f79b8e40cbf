// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! aetherd: the Aether coordinator daemon.
//!
//! Usage: `aetherd [config.toml]`. Without an argument the config path is
//! read from `AETHER_CONFIG`; with neither, built-in defaults apply.
//! Logging is controlled by `AETHER_LOG` (env-filter syntax) and goes to
//! stderr, or to daily-rotated files when `AETHER_LOG_DIR` is set.

use std::process::ExitCode;

use aether_core::Config;
use tracing_subscriber::EnvFilter;

fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_env("AETHER_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if let Ok(dir) = std::env::var("AETHER_LOG_DIR") {
        let appender = tracing_appender::rolling::daily(dir, "aetherd.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
        None
    }
}

fn load_config() -> Result<Config, String> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("AETHER_CONFIG").ok());
    match path {
        Some(path) => Config::load(std::path::Path::new(&path)).map_err(|e| e.to_string()),
        None => Ok(Config::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _guard = init_tracing();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("aetherd: {e}");
            return ExitCode::FAILURE;
        }
    };

    match aether_daemon::run_until_shutdown(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("aetherd: {e}");
            ExitCode::FAILURE
        }
    }
}
