// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn scaffolds_a_project_directory() {
    let dir = tempdir().unwrap();

    run("my-flows", Some(dir.path())).unwrap();

    let config_path = dir.path().join("my-flows").join("aether.toml");
    assert!(config_path.exists());

    // The generated config parses back with defaults.
    let config = Config::load(&config_path).unwrap();
    assert_eq!(config.server.grpc_port, 7070);
}

#[test]
fn refuses_to_overwrite() {
    let dir = tempdir().unwrap();
    std::fs::create_dir(dir.path().join("taken")).unwrap();

    let err = run("taken", Some(dir.path())).unwrap_err();
    assert!(err.to_string().contains("already exists"));
}
