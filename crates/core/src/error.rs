// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy shared across the coordination plane.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the coordination plane.
///
/// `still-running` is deliberately absent: an await that has not reached a
/// terminal state is a recoverable signal, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Unknown workflow-id, task-id, or session-token.
    #[error("not found: {0}")]
    NotFound(String),

    /// Register with an existing worker-id; start with a colliding id.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Completion for the wrong step, operation on a terminal workflow,
    /// or an unauthorized session token.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// I/O failure in the persistence layer; in-memory state is stale.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// A blocking API exceeded its bound.
    #[error("timed out")]
    Timeout,

    /// Operation aborted by explicit cancellation.
    #[error("cancelled")]
    Cancelled,

    /// Invariant violation; the workflow is quarantined.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Duplicate(_) => ErrorKind::Duplicate,
            CoreError::ProtocolViolation(_) => ErrorKind::ProtocolViolation,
            CoreError::PersistenceFailure(_) => ErrorKind::PersistenceFailure,
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::Cancelled => ErrorKind::Cancelled,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Rebuild from a wire (kind, message) pair.
    pub fn from_wire(kind: ErrorKind, message: String) -> Self {
        match kind {
            ErrorKind::NotFound => CoreError::NotFound(message),
            ErrorKind::Duplicate => CoreError::Duplicate(message),
            ErrorKind::ProtocolViolation => CoreError::ProtocolViolation(message),
            ErrorKind::PersistenceFailure => CoreError::PersistenceFailure(message),
            ErrorKind::Timeout => CoreError::Timeout,
            ErrorKind::Cancelled => CoreError::Cancelled,
            ErrorKind::Internal => CoreError::Internal(message),
        }
    }
}

/// Stable wire tag for [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NotFound,
    Duplicate,
    ProtocolViolation,
    PersistenceFailure,
    Timeout,
    Cancelled,
    Internal,
}

crate::simple_display! {
    ErrorKind {
        NotFound => "not-found",
        Duplicate => "duplicate",
        ProtocolViolation => "protocol-violation",
        PersistenceFailure => "persistence-failure",
        Timeout => "timeout",
        Cancelled => "cancelled",
        Internal => "internal",
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
