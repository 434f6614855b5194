//! Error types for hyperos-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hyperos-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors that can occur while provisioning, loading or running a machine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// An expected bundle file or directory is missing
    #[error("{what} not found: {}", .path.display())]
    NotFound {
        /// What was being looked up
        what: &'static str,
        /// Where it was expected
        path: PathBuf,
    },

    /// The bundle directory already exists
    #[error("bundle already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// A bundle file exists but could not be parsed
    #[error("corrupt {what} at {}: {reason}", .path.display())]
    CorruptData {
        /// Which file
        what: &'static str,
        /// Where it lives
        path: PathBuf,
        /// Parser diagnostic
        reason: String,
    },

    /// A filesystem operation failed
    #[error("failed to {op} {}: {source}", .path.display())]
    Io {
        /// The operation that failed
        op: &'static str,
        /// The path it was applied to
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A precondition for the requested stage does not hold
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Machine is not in the expected lifecycle state
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState {
        /// Expected state
        expected: String,
        /// Actual state
        actual: String,
    },

    /// Error from hyperos-vm (configuration rejected, runtime failure)
    #[error("VM error: {0}")]
    Vm(#[from] hyperos_vm::VmError),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of a [`CoreError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    CorruptData,
    Io,
    Config,
    Runtime,
    Precondition,
}

impl CoreError {
    pub(crate) fn io(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::CorruptData { .. } => ErrorKind::CorruptData,
            Self::Io { .. } | Self::Json(_) => ErrorKind::Io,
            Self::Precondition(_) | Self::InvalidState { .. } => ErrorKind::Precondition,
            Self::Vm(e) if e.is_config() => ErrorKind::Config,
            Self::Vm(_) => ErrorKind::Runtime,
        }
    }
}
