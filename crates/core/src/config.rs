// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Server configuration (TOML).
//!
//! ```toml
//! [server]
//! grpc_port = 7070
//! http_port = 7071
//! db_path = "/var/lib/aether"
//!
//! [persistence]
//! mode = "state-action-log"
//!
//! [metrics]
//! enabled = true
//! port = 9464
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Durability tier, selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistenceMode {
    /// L0: in-process only; lost on restart.
    Memory,
    /// L1: periodic whole-state snapshots; loss bounded by the interval.
    Snapshot,
    /// L2: write-ahead action log per workflow plus checkpoints.
    StateActionLog,
}

crate::simple_display! {
    PersistenceMode {
        Memory => "memory",
        Snapshot => "snapshot",
        StateActionLog => "state-action-log",
    }
}

impl std::str::FromStr for PersistenceMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "memory" => Ok(PersistenceMode::Memory),
            "snapshot" => Ok(PersistenceMode::Snapshot),
            "state-action-log" => Ok(PersistenceMode::StateActionLog),
            other => Err(format!(
                "unknown persistence mode '{other}' (expected memory, snapshot, or state-action-log)"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub grpc_port: u16,
    pub http_port: u16,
    pub db_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_port: 7070,
            http_port: 7071,
            db_path: PathBuf::from("./aether-data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub mode: PersistenceMode,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { mode: PersistenceMode::Memory }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: false, port: 9464 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Worker marked Dead after this long without a heartbeat.
    pub heartbeat_ms: u64,
    /// Claimed task redelivered after this long without completion or
    /// task heartbeat.
    pub visibility_ms: u64,
    /// How long a cancel waits for the worker before force-transitioning.
    pub cancel_deadline_ms: u64,
    /// L1 snapshot cadence.
    pub snapshot_interval_ms: u64,
    /// Engine sweep cadence (heartbeats, visibility, deadlines, retention).
    pub sweep_interval_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            heartbeat_ms: 30_000,
            visibility_ms: 60_000,
            cancel_deadline_ms: 30_000,
            snapshot_interval_ms: 10_000,
            sweep_interval_ms: 1_000,
        }
    }
}

/// Step retry defaults stamped onto every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub strategy: BackoffStrategy,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffStrategy {
    None,
    Fixed,
    Exponential,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> crate::task::RetryPolicy {
        let backoff = match self.strategy {
            BackoffStrategy::None => crate::task::Backoff::None,
            BackoffStrategy::Fixed => crate::task::Backoff::Fixed { delay_ms: self.base_delay_ms },
            BackoffStrategy::Exponential => crate::task::Backoff::Exponential {
                base_ms: self.base_delay_ms,
                cap_ms: self.max_delay_ms,
            },
        };
        crate::task::RetryPolicy { max_retries: self.max_retries, backoff }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Terminal workflows older than this are pruned. Absent means
    /// indefinite retention.
    pub keep_terminal_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub persistence: PersistenceConfig,
    pub metrics: MetricsConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub retention: RetentionConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Commented starter config written by `aether init`.
    pub fn starter_toml() -> String {
        let defaults = Self::default();
        format!(
            r#"[server]
grpc_port = {grpc}
http_port = {http}
db_path = "aether-data"

[persistence]
# memory | snapshot | state-action-log
mode = "memory"

[metrics]
enabled = false
port = {metrics}
"#,
            grpc = defaults.server.grpc_port,
            http = defaults.server.http_port,
            metrics = defaults.metrics.port,
        )
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
