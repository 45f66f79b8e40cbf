// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only action log, one per workflow.
//!
//! Format: one JSON document per line, each carrying a version prefix and a
//! per-workflow monotonic sequence number. Appends are flushed before the
//! caller is acknowledged. A corrupt tail (torn write, binary garbage)
//! rotates the damaged file to `.bak` and keeps every entry that parsed.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use aether_core::WorkflowAction;
use serde::{Deserialize, Serialize};

use crate::snapshot::rotate_bak_path;
use crate::store::StoreError;

/// Current log record version
pub const CURRENT_LOG_VERSION: u32 = 1;

/// One logged action with its state-transition summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(rename = "v")]
    pub version: u32,
    /// Monotonic per workflow.
    pub seq: u64,
    pub at_ms: u64,
    /// Action kind tag (duplicates the action's own tag for grepability).
    pub kind: String,
    /// Workflow state before the action applied.
    pub before: String,
    /// Workflow state after the action applied.
    pub after: String,
    pub action: WorkflowAction,
}

/// Append-only action log for one workflow.
pub struct ActionLog {
    path: PathBuf,
    writer: BufWriter<File>,
    write_seq: u64,
}

impl ActionLog {
    /// Open (or create) the log, returning the handle plus every valid
    /// entry for replay. Corruption is handled by rotating the damaged
    /// file to `.bak` and rewriting the clean prefix.
    pub fn open(path: &Path) -> Result<(Self, Vec<LogEntry>), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let (entries, corrupt) = read_entries(path)?;
        if corrupt {
            let bak = rotate_bak_path(path);
            tracing::warn!(
                path = %path.display(),
                kept = entries.len(),
                bak = %bak.display(),
                "corrupt action log tail, rotating"
            );
            std::fs::rename(path, &bak)?;
            let mut clean = BufWriter::new(File::create(path)?);
            for entry in &entries {
                serde_json::to_writer(&mut clean, entry)?;
                clean.write_all(b"\n")?;
            }
            clean.flush()?;
        }

        let write_seq = entries.last().map(|e| e.seq).unwrap_or(0);
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let log = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            write_seq,
        };
        Ok((log, entries))
    }

    /// Last sequence present in the log.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Append one entry and flush it to the OS before returning.
    pub fn append(&mut self, entry: &LogEntry) -> Result<(), StoreError> {
        serde_json::to_writer(&mut self.writer, entry)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.write_seq = entry.seq;
        Ok(())
    }

    /// Drop entries at or below `seq` (they are folded into a snapshot).
    pub fn truncate_through(&mut self, seq: u64) -> Result<(), StoreError> {
        self.writer.flush()?;
        let (entries, _) = read_entries(&self.path)?;
        let keep: Vec<&LogEntry> = entries.iter().filter(|e| e.seq > seq).collect();

        let tmp = self.path.with_extension("log.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            for entry in &keep {
                serde_json::to_writer(&mut out, entry)?;
                out.write_all(b"\n")?;
            }
            out.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

/// Read all parseable entries; the bool reports whether garbage was found.
fn read_entries(path: &Path) -> Result<(Vec<LogEntry>, bool), StoreError> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok((Vec::new(), false)),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    let mut corrupt = false;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            break;
        }
        let line = buf.strip_suffix(b"\n").unwrap_or(&buf);
        if line.is_empty() {
            continue;
        }
        match serde_json::from_slice::<LogEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(_) => {
                // Stop at the first unparseable record; everything after a
                // torn write is suspect.
                corrupt = true;
                break;
            }
        }
    }
    Ok((entries, corrupt))
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
