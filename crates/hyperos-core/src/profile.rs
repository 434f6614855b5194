//! Machine profiles and per-kind presets.

use crate::error::{CoreError, Result};
use hyperos_vm::GIB;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Guest operating system family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MachineKind {
    Windows,
    Linux,
    MacOS,
    BSD,
}

/// Resource floors and defaults for one [`MachineKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPreset {
    pub cpu_count: usize,
    pub memory_bytes: u64,
    pub primary_disk_bytes: u64,
}

impl MachineKind {
    /// Minimum requirements of the guest family, used as defaults.
    pub fn preset(self) -> KindPreset {
        match self {
            MachineKind::Windows => KindPreset {
                cpu_count: 2,
                memory_bytes: 4 * GIB,
                primary_disk_bytes: 64 * GIB,
            },
            MachineKind::Linux => KindPreset {
                cpu_count: 8,
                memory_bytes: 16 * GIB,
                primary_disk_bytes: 15 * GIB,
            },
            MachineKind::MacOS => KindPreset {
                cpu_count: 2,
                memory_bytes: 4 * GIB,
                primary_disk_bytes: 64 * GIB,
            },
            MachineKind::BSD => KindPreset {
                cpu_count: 2,
                memory_bytes: 2 * GIB,
                primary_disk_bytes: 10 * GIB,
            },
        }
    }
}

impl fmt::Display for MachineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineKind::Windows => write!(f, "windows"),
            MachineKind::Linux => write!(f, "linux"),
            MachineKind::MacOS => write!(f, "macos"),
            MachineKind::BSD => write!(f, "bsd"),
        }
    }
}

impl FromStr for MachineKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "windows" => Ok(Self::Windows),
            "linux" => Ok(Self::Linux),
            "macos" => Ok(Self::MacOS),
            "bsd" => Ok(Self::BSD),
            other => Err(CoreError::Precondition(format!(
                "unknown machine kind: {other}"
            ))),
        }
    }
}

/// Locator of an installer image, with an optional SHA-256 content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerImage {
    /// Local path of the image
    pub path: PathBuf,
    /// Expected lowercase hex SHA-256 digest
    pub sha256: Option<String>,
}

impl InstallerImage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, digest: impl Into<String>) -> Self {
        self.sha256 = Some(digest.into().to_lowercase());
        self
    }
}

/// Overrides applied on top of a kind preset.
#[derive(Debug, Clone, Default)]
pub struct ProfileRequest {
    pub cpu_count: Option<usize>,
    pub memory_bytes: Option<u64>,
    pub primary_disk_bytes: Option<u64>,
    /// Already-existing disk images, relative to the bundle or absolute
    pub auxiliary_disks: Vec<PathBuf>,
}

/// Declarative description of one virtual machine.
///
/// Constructed once through [`MachineProfile::new`]; the only later change
/// is recording the installer chosen during provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineProfile {
    kind: MachineKind,
    bundle_name: String,
    cpu_count: usize,
    memory_bytes: u64,
    primary_disk_bytes: u64,
    installer: Option<InstallerImage>,
    auxiliary_disks: Vec<PathBuf>,
}

impl MachineProfile {
    /// Build a profile from the preset of `kind` and the given overrides.
    ///
    /// # Errors
    /// Returns [`CoreError::Precondition`] if the bundle name is not a plain
    /// directory name or an override is below the kind's floor.
    pub fn new(kind: MachineKind, bundle_name: &str, request: ProfileRequest) -> Result<Self> {
        validate_bundle_name(bundle_name)?;

        let preset = kind.preset();
        let cpu_count = at_least(
            "cpu_count",
            request.cpu_count.map(|c| c as u64),
            preset.cpu_count as u64,
            kind,
        )?;
        let memory_bytes = at_least("memory_bytes", request.memory_bytes, preset.memory_bytes, kind)?;
        let primary_disk_bytes = at_least(
            "primary_disk_bytes",
            request.primary_disk_bytes,
            preset.primary_disk_bytes,
            kind,
        )?;

        Ok(Self {
            kind,
            bundle_name: bundle_name.to_owned(),
            cpu_count: cpu_count as usize,
            memory_bytes,
            primary_disk_bytes,
            installer: None,
            auxiliary_disks: request.auxiliary_disks,
        })
    }

    /// Build a profile using only the preset of `kind`.
    pub fn preset(kind: MachineKind, bundle_name: &str) -> Result<Self> {
        Self::new(kind, bundle_name, ProfileRequest::default())
    }

    /// Record the installer image selected for this machine.
    pub fn with_installer(mut self, installer: InstallerImage) -> Self {
        self.installer = Some(installer);
        self
    }

    pub fn kind(&self) -> MachineKind {
        self.kind
    }

    pub fn bundle_name(&self) -> &str {
        &self.bundle_name
    }

    /// Requested vCPU count, before budgeting.
    pub fn cpu_count(&self) -> usize {
        self.cpu_count
    }

    /// Requested memory in bytes, before budgeting.
    pub fn memory_bytes(&self) -> u64 {
        self.memory_bytes
    }

    pub fn primary_disk_bytes(&self) -> u64 {
        self.primary_disk_bytes
    }

    pub fn installer(&self) -> Option<&InstallerImage> {
        self.installer.as_ref()
    }

    pub fn auxiliary_disks(&self) -> &[PathBuf] {
        &self.auxiliary_disks
    }
}

fn at_least(field: &str, requested: Option<u64>, floor: u64, kind: MachineKind) -> Result<u64> {
    match requested {
        None => Ok(floor),
        Some(value) if value >= floor => Ok(value),
        Some(value) => Err(CoreError::Precondition(format!(
            "{field} {value} is below the {kind} minimum of {floor}"
        ))),
    }
}

fn validate_bundle_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CoreError::Precondition("bundle name is empty".into()));
    }
    if name == "." || name == ".." {
        return Err(CoreError::Precondition(format!(
            "bundle name {name:?} is reserved"
        )));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(CoreError::Precondition(format!(
            "bundle name {name:?} must not contain path separators"
        )));
    }
    Ok(())
}
