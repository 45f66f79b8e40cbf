// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Versioned snapshot files.
//!
//! A snapshot stores serialized state at a point in time together with the
//! action sequence it covers. Written atomically (temp file + rename); a
//! corrupt snapshot found at load time rotates to `.bak` so recovery can
//! continue from the action log alone.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::StoreError;

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const MAX_BAK_FILES: u32 = 3;

/// A point-in-time snapshot of serialized state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    /// Action sequence covered by this snapshot; log entries at or below
    /// this sequence are already folded in.
    pub seq: u64,
    pub state: T,
    pub created_at: DateTime<Utc>,
}

impl<T> Snapshot<T> {
    pub fn new(seq: u64, state: T) -> Self {
        Self {
            version: CURRENT_SNAPSHOT_VERSION,
            seq,
            state,
            created_at: Utc::now(),
        }
    }
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
pub(crate) fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

/// Write a snapshot atomically: serialize to `<path>.tmp`, then rename.
pub fn write_snapshot<T: Serialize>(path: &Path, snapshot: &Snapshot<T>) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec(snapshot)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a snapshot. Missing file yields `None`; a corrupt or
/// newer-versioned file is rotated to `.bak` and also yields `None`.
pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<Snapshot<T>>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice::<Snapshot<T>>(&bytes) {
        Ok(snapshot) if snapshot.version <= CURRENT_SNAPSHOT_VERSION => Ok(Some(snapshot)),
        Ok(snapshot) => {
            tracing::warn!(
                path = %path.display(),
                version = snapshot.version,
                "snapshot from a newer version, rotating to .bak"
            );
            let _ = fs::rename(path, rotate_bak_path(path));
            Ok(None)
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt snapshot, rotating to .bak");
            let _ = fs::rename(path, rotate_bak_path(path));
            Ok(None)
        }
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
