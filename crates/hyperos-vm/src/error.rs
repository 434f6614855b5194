//! Error types for hyperos-vm.

use thiserror::Error;

/// Result type alias for hyperos-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// Errors that can occur while assembling or running a VM configuration.
#[derive(Debug, Error)]
pub enum VmError {
    /// The assembled configuration was rejected by a validator
    #[error("configuration error: {0}")]
    Config(String),

    /// The runtime failed to start the VM
    #[error("failed to start VM: {0}")]
    Start(String),

    /// The runtime reported a guest-level or hypervisor failure
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl VmError {
    /// Whether this error came from configuration validation.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Whether this error was reported by the runtime (start or run).
    pub fn is_runtime(&self) -> bool {
        matches!(self, Self::Start(_) | Self::Runtime(_))
    }
}
