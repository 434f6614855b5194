//! Boundary to the hypervisor that executes a guest.
//!
//! The hypervisor itself lives outside this workspace. A [`VmRuntime`]
//! validates a [`VmConfiguration`], starts it once, and reports what happens
//! afterwards as [`RuntimeEvent`]s on a [`RuntimeSession`].

use crate::config::VmConfiguration;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt;
use tokio::sync::mpsc;

/// Notification delivered by a running runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// The guest shut itself down cleanly
    GuestStopped,
    /// The runtime stopped the VM because of an unrecoverable error
    StoppedWithError(String),
    /// A peripheral attachment went away; the VM keeps running
    PeripheralDisconnected { device: String, error: String },
}

/// Why a VM stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Clean guest shutdown
    GuestShutdown,
    /// Runtime error exit
    Error(String),
}

impl StopReason {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::GuestShutdown)
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::GuestShutdown => write!(f, "guest shutdown"),
            StopReason::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Sending half of a session's event stream, held by the runtime.
pub type RuntimeEventSender = mpsc::Sender<RuntimeEvent>;

/// Event stream of one started VM.
#[derive(Debug)]
pub struct RuntimeSession {
    events: mpsc::Receiver<RuntimeEvent>,
}

impl RuntimeSession {
    pub fn new(events: mpsc::Receiver<RuntimeEvent>) -> Self {
        Self { events }
    }

    /// Create a session together with the sender a runtime reports through.
    pub fn channel(capacity: usize) -> (RuntimeEventSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    /// Wait for the next event.
    ///
    /// Returns `None` once the runtime has dropped its sender.
    pub async fn next_event(&mut self) -> Option<RuntimeEvent> {
        self.events.recv().await
    }
}

/// A hypervisor able to run a [`VmConfiguration`].
#[async_trait]
pub trait VmRuntime: Send + Sync {
    /// Check the configuration against the runtime's own rules.
    ///
    /// # Errors
    /// Returns [`VmError::Config`](crate::VmError::Config) if the
    /// configuration cannot be run.
    fn validate(&self, config: &VmConfiguration) -> Result<()>;

    /// Start the VM. Completes exactly once.
    ///
    /// # Errors
    /// Returns [`VmError::Start`](crate::VmError::Start) if the VM could not
    /// be started.
    async fn start(&self, config: &VmConfiguration) -> Result<RuntimeSession>;
}
