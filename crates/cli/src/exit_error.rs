// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exit-code mapping: 0 on success, nonzero for transport or protocol
//! failures.

use std::process::ExitCode;

use crate::client::ClientError;

pub fn report(error: &anyhow::Error) -> ExitCode {
    eprintln!("aether: {error:#}");

    // Distinguish "couldn't reach the coordinator" from protocol-level
    // failures for scripts that care.
    match error.downcast_ref::<ClientError>() {
        Some(ClientError::Connect { .. }) => ExitCode::from(2),
        _ => ExitCode::FAILURE,
    }
}
