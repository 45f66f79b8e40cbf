// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn write_then_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    write_snapshot(&path, &Snapshot::new(7, vec!["a".to_string(), "b".to_string()])).unwrap();

    let snapshot = load_snapshot::<Vec<String>>(&path).unwrap().unwrap();
    assert_eq!(snapshot.version, CURRENT_SNAPSHOT_VERSION);
    assert_eq!(snapshot.seq, 7);
    assert_eq!(snapshot.state, vec!["a", "b"]);
}

#[test]
fn missing_file_is_none() {
    let dir = tempdir().unwrap();
    let loaded = load_snapshot::<Vec<String>>(&dir.path().join("absent.json")).unwrap();
    assert!(loaded.is_none());
}

#[test]
fn corrupt_snapshot_rotates_to_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{ truncated").unwrap();

    let loaded = load_snapshot::<Vec<String>>(&path).unwrap();
    assert!(loaded.is_none());
    assert!(path.with_extension("bak").exists());
    assert!(!path.exists());
}

#[test]
fn newer_version_rotates_to_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    let mut snapshot = Snapshot::new(1, vec!["x".to_string()]);
    snapshot.version = CURRENT_SNAPSHOT_VERSION + 1;
    write_snapshot(&path, &snapshot).unwrap();

    let loaded = load_snapshot::<Vec<String>>(&path).unwrap();
    assert!(loaded.is_none());
    assert!(path.with_extension("bak").exists());
}

#[test]
fn write_is_atomic_no_tmp_left_behind() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    write_snapshot(&path, &Snapshot::new(1, 42u32)).unwrap();

    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}

#[test]
fn overwrite_replaces_contents() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state.json");

    write_snapshot(&path, &Snapshot::new(1, 1u32)).unwrap();
    write_snapshot(&path, &Snapshot::new(2, 2u32)).unwrap();

    let snapshot = load_snapshot::<u32>(&path).unwrap().unwrap();
    assert_eq!(snapshot.seq, 2);
    assert_eq!(snapshot.state, 2);
}
