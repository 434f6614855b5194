//! Opaque handles passed through to the runtime.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Durable token binding a bundle to one guest instance across reboots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineIdentity(Uuid);

impl MachineIdentity {
    /// Generate a fresh random identity.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for MachineIdentity {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Handle to the persisted EFI variable store of a bundle.
///
/// The contents belong to the runtime; only the location is tracked here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareHandle {
    path: PathBuf,
}

impl FirmwareHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_display() {
        let uuid = Uuid::new_v4();
        let identity = MachineIdentity::from(uuid);
        assert_eq!(identity.to_string(), uuid.to_string());
        assert_eq!(identity.as_uuid(), uuid);
    }

    #[test]
    fn test_generated_identities_differ() {
        assert_ne!(MachineIdentity::generate(), MachineIdentity::generate());
    }
}
