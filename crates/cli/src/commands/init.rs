// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `aether init <name>`: scaffold a project directory with a starter
//! config.

use std::path::Path;

use aether_core::Config;
use anyhow::{bail, Context};

pub fn run(name: &str, output: Option<&Path>) -> anyhow::Result<()> {
    let parent = output.unwrap_or_else(|| Path::new("."));
    let dir = parent.join(name);
    if dir.exists() {
        bail!("{} already exists", dir.display());
    }

    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let config_path = dir.join("aether.toml");
    std::fs::write(&config_path, Config::starter_toml())
        .with_context(|| format!("writing {}", config_path.display()))?;

    println!("created {}", dir.display());
    println!("  aether.toml - coordinator configuration");
    println!();
    println!("next: aether serve --config {}", config_path.display());
    Ok(())
}

#[cfg(test)]
#[path = "init_tests.rs"]
mod tests;
