/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 *
 * This software may be used and distributed according to the terms of the
 * GNU General Public License version 2.
 */

use thiserror::Error;

/// The error taxonomy from spec §7. Every crate in the workspace uses
/// `anyhow::Error` for ad hoc internal propagation and converts to one of
/// these kinds at its public API boundary, so that the RPC surface can
/// report a stable kind plus a human message end-to-end.
#[derive(Debug, Error)]
pub enum PogoError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("ambiguous revision: {0}")]
    Ambiguous(String),

    #[error("change is readonly: {0}")]
    Readonly(String),

    #[error("merge conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transient error, safe to retry: {0}")]
    Transient(String),
}

impl PogoError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        PogoError::NotFound(msg.into())
    }

    pub fn ambiguous(msg: impl Into<String>) -> Self {
        PogoError::Ambiguous(msg.into())
    }

    pub fn readonly(msg: impl Into<String>) -> Self {
        PogoError::Readonly(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        PogoError::Conflict(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        PogoError::InvalidInput(msg.into())
    }

    pub fn access_denied(msg: impl Into<String>) -> Self {
        PogoError::AccessDenied(msg.into())
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        PogoError::Auth(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        PogoError::Transient(msg.into())
    }

    /// Short machine-readable kind, used by the RPC layer to set a status
    /// code independent of the (free-form) message.
    pub fn kind(&self) -> &'static str {
        match self {
            PogoError::Auth(_) => "AuthError",
            PogoError::AccessDenied(_) => "AccessDenied",
            PogoError::NotFound(_) => "NotFound",
            PogoError::Ambiguous(_) => "Ambiguous",
            PogoError::Readonly(_) => "Readonly",
            PogoError::Conflict(_) => "Conflict",
            PogoError::InvalidInput(_) => "InvalidInput",
            PogoError::Io(_) => "IOError",
            PogoError::Transient(_) => "Transient",
        }
    }
}
