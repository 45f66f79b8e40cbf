// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use aether_core::Payload;
use std::io::Write as _;
use tempfile::tempdir;

fn entry(seq: u64) -> LogEntry {
    LogEntry {
        version: CURRENT_LOG_VERSION,
        seq,
        at_ms: 1_000 + seq,
        kind: "cancel_requested".into(),
        before: "running".into(),
        after: "running".into(),
        action: WorkflowAction::CancelRequested { at_ms: 1_000 + seq },
    }
}

fn step_entry(seq: u64, step: &str) -> LogEntry {
    LogEntry {
        version: CURRENT_LOG_VERSION,
        seq,
        at_ms: 1_000 + seq,
        kind: "step_enqueued".into(),
        before: "pending".into(),
        after: "pending".into(),
        action: WorkflowAction::StepEnqueued {
            step: step.into(),
            attempt: 1,
            input: Payload::empty(),
            at_ms: 1_000 + seq,
        },
    }
}

#[test]
fn open_creates_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("actions.log");

    let (log, entries) = ActionLog::open(&path).unwrap();

    assert!(path.exists());
    assert_eq!(log.write_seq(), 0);
    assert!(entries.is_empty());
}

#[test]
fn append_then_reopen_replays() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("actions.log");

    {
        let (mut log, _) = ActionLog::open(&path).unwrap();
        log.append(&step_entry(1, "extract")).unwrap();
        log.append(&step_entry(2, "transform")).unwrap();
        assert_eq!(log.write_seq(), 2);
    }

    let (log, entries) = ActionLog::open(&path).unwrap();
    assert_eq!(log.write_seq(), 2);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
    assert_eq!(entries[1].kind, "step_enqueued");
}

#[test]
fn truncate_through_drops_checkpointed_entries() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("actions.log");

    let (mut log, _) = ActionLog::open(&path).unwrap();
    log.append(&entry(1)).unwrap();
    log.append(&entry(2)).unwrap();
    log.append(&entry(3)).unwrap();

    log.truncate_through(2).unwrap();

    // Appends still work after truncation.
    log.append(&entry(4)).unwrap();
    drop(log);

    let (_, entries) = ActionLog::open(&path).unwrap();
    let seqs: Vec<u64> = entries.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![3, 4]);
}

#[test]
fn corrupt_tail_rotates_to_bak_and_keeps_valid_prefix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("actions.log");

    {
        let (mut log, _) = ActionLog::open(&path).unwrap();
        log.append(&entry(1)).unwrap();
        log.append(&entry(2)).unwrap();
    }
    {
        let mut f = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(b"not-valid-json\n").unwrap();
    }

    let (log, entries) = ActionLog::open(&path).unwrap();

    assert_eq!(log.write_seq(), 2);
    assert_eq!(entries.len(), 2);
    assert!(path.with_extension("bak").exists());

    // The rewritten file is clean: reopening finds no corruption.
    drop(log);
    let (_, entries) = ActionLog::open(&path).unwrap();
    assert_eq!(entries.len(), 2);
}

#[test]
fn binary_garbage_is_treated_as_corruption() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("actions.log");

    std::fs::write(&path, b"\x80\x81\x82\xff\xfe\n").unwrap();

    let (log, entries) = ActionLog::open(&path).unwrap();
    assert_eq!(log.write_seq(), 0);
    assert!(entries.is_empty());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn repeated_corruption_rotates_bak_files() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("actions.log");

    // Four corrupt opens keep at most three backups.
    for i in 1..=4u8 {
        std::fs::write(&path, [i; 8]).unwrap();
        let (log, _) = ActionLog::open(&path).unwrap();
        assert_eq!(log.write_seq(), 0);
    }

    assert_eq!(std::fs::read(path.with_extension("bak")).unwrap(), vec![4u8; 8]);
    assert_eq!(std::fs::read(path.with_extension("bak.2")).unwrap(), vec![3u8; 8]);
    assert_eq!(std::fs::read(path.with_extension("bak.3")).unwrap(), vec![2u8; 8]);
    assert!(!path.with_extension("bak.4").exists());
}

#[test]
fn entries_carry_version_prefix() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("actions.log");

    let (mut log, _) = ActionLog::open(&path).unwrap();
    log.append(&entry(1)).unwrap();
    drop(log);

    let line = std::fs::read_to_string(&path).unwrap();
    let json: serde_json::Value = serde_json::from_str(line.lines().next().unwrap()).unwrap();
    assert_eq!(json["v"], CURRENT_LOG_VERSION);
    assert_eq!(json["seq"], 1);
    assert_eq!(json["kind"], "cancel_requested");
}
