//! Error types for labctl

use std::time::Duration;

use thiserror::Error;

/// Failure of a single remote command.
///
/// Produced by the remote executor and never retried there; the caller
/// decides what is worth another attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("host {address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    #[error("remote command exited with code {code}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("remote command timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl ExecError {
    /// True when the command never started on the remote side.
    pub fn is_connect_failure(&self) -> bool {
        matches!(self, ExecError::Unreachable { .. })
    }

    /// Whether the host should still be considered reachable after this error.
    pub fn host_answered(&self) -> bool {
        matches!(self, ExecError::NonZeroExit { .. })
    }
}

/// Main error type for labctl
#[derive(Error, Debug)]
pub enum OrchError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("Role conflict: {0}")]
    RoleConflict(String),

    #[error("Credential missing: no {0} credential has been issued")]
    CredentialMissing(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for OrchError {
    fn from(err: anyhow::Error) -> Self {
        OrchError::Internal(err.to_string())
    }
}
