//! The complete configuration handed to a runtime.

use crate::budget::{Budget, PlatformLimits};
use crate::error::{Result, VmError};
use crate::handles::{FirmwareHandle, MachineIdentity};
use crate::topology::{AudioStream, BootMode, DeviceTopology, INSTALL_MEDIA_ID};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Budgeted resources, boot handles and devices for one start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfiguration {
    /// Number of virtual CPUs
    pub cpu_count: usize,
    /// Guest memory in bytes
    pub memory_bytes: u64,
    /// Machine identity of the bundle
    pub identity: MachineIdentity,
    /// EFI variable store of the bundle
    pub firmware: FirmwareHandle,
    /// Devices for this boot
    pub topology: DeviceTopology,
}

impl VmConfiguration {
    pub fn new(
        budget: Budget,
        identity: MachineIdentity,
        firmware: FirmwareHandle,
        topology: DeviceTopology,
    ) -> Self {
        Self {
            cpu_count: budget.cpu_count,
            memory_bytes: budget.memory_bytes,
            identity,
            firmware,
            topology,
        }
    }

    /// Validate the configuration against the platform limits and the
    /// device-shape rules every runtime expects.
    ///
    /// # Errors
    /// Returns [`VmError::Config`] describing the first violation found.
    pub fn validate(&self, limits: &PlatformLimits) -> Result<()> {
        if self.cpu_count < limits.min_cpus || self.cpu_count > limits.max_cpus {
            return Err(VmError::Config(format!(
                "cpu_count must be {}-{}, got {}",
                limits.min_cpus, limits.max_cpus, self.cpu_count
            )));
        }

        if self.memory_bytes < limits.min_memory_bytes
            || self.memory_bytes > limits.max_memory_bytes
        {
            return Err(VmError::Config(format!(
                "memory_bytes must be {}-{}, got {}",
                limits.min_memory_bytes, limits.max_memory_bytes, self.memory_bytes
            )));
        }

        let topology = &self.topology;

        if topology.primary_disk().is_none() {
            return Err(VmError::Config("no primary disk attached".into()));
        }

        let mut ids = HashSet::new();
        let mut paths = HashSet::new();
        for device in &topology.storage {
            if !ids.insert(device.id.as_str()) {
                return Err(VmError::Config(format!(
                    "duplicate storage id: {}",
                    device.id
                )));
            }
            if !paths.insert(device.path.as_path()) {
                return Err(VmError::Config(format!(
                    "{} attached more than once",
                    device.path.display()
                )));
            }
        }

        match topology.mode {
            BootMode::Install => {
                let first = topology.storage.first();
                if !first.is_some_and(|d| d.id == INSTALL_MEDIA_ID && d.read_only) {
                    return Err(VmError::Config(
                        "install mode must attach read-only installer media first".into(),
                    ));
                }
            }
            BootMode::Boot => {
                if topology.install_media().is_some() {
                    return Err(VmError::Config(
                        "boot mode must not attach installer media".into(),
                    ));
                }
            }
        }

        expect_count("network", topology.network.len(), 1)?;
        expect_count("graphics", topology.graphics.len(), 1)?;
        expect_count("scanout", topology.graphics[0].scanouts.len(), 1)?;
        expect_count("audio", topology.audio.len(), 2)?;
        expect_count("keyboard", topology.keyboards.len(), 1)?;
        expect_count("pointing", topology.pointing_devices.len(), 1)?;
        expect_count("console", topology.consoles.len(), 1)?;
        expect_count("console port", topology.consoles[0].ports.len(), 1)?;

        let scanout = topology.graphics[0].scanouts[0];
        if scanout.width == 0 || scanout.height == 0 {
            return Err(VmError::Config(format!(
                "scanout must be non-empty, got {}x{}",
                scanout.width, scanout.height
            )));
        }

        for device in &topology.audio {
            expect_count("audio stream", device.streams.len(), 1)?;
        }
        let directions: HashSet<AudioStream> = topology
            .audio
            .iter()
            .flat_map(|d| d.streams.iter().copied())
            .collect();
        if directions.len() != 2 {
            return Err(VmError::Config(
                "audio must carry one input and one output device".into(),
            ));
        }

        if topology.consoles[0].ports[0].name.is_empty() {
            return Err(VmError::Config("console port name is empty".into()));
        }

        Ok(())
    }
}

fn expect_count(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(VmError::Config(format!(
            "expected {expected} {what} device(s), got {actual}"
        )));
    }
    Ok(())
}
