//! Virtual device topology for a single boot.
//!
//! A [`DeviceTopology`] is assembled fresh on every start by
//! [`DeviceTopologyBuilder`] and handed to the runtime by value. Nothing here
//! is persisted.

use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Fixed scanout width in pixels.
pub const SCANOUT_WIDTH: u32 = 1280;

/// Fixed scanout height in pixels.
pub const SCANOUT_HEIGHT: u32 = 720;

/// Well-known name of the console port carrying the SPICE agent protocol.
pub const SPICE_AGENT_PORT_NAME: &str = "com.redhat.spice.0";

/// Storage device id of the primary disk.
pub const PRIMARY_DISK_ID: &str = "disk0";

/// Storage device id of the installer media.
pub const INSTALL_MEDIA_ID: &str = "installer";

/// Whether this start installs a new guest or boots an installed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMode {
    /// Fresh guest, installer media attached
    Install,
    /// Guest already installed on the primary disk
    Boot,
}

impl fmt::Display for BootMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootMode::Install => write!(f, "install"),
            BootMode::Boot => write!(f, "boot"),
        }
    }
}

/// Bus a storage device is exposed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBus {
    /// Removable USB mass storage
    UsbMassStorage,
    /// Virtio block device
    VirtioBlock,
}

/// A disk image attached to the guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageDevice {
    /// Unique device identifier
    pub id: String,
    pub bus: StorageBus,
    /// Path to the image on the host
    pub path: PathBuf,
    pub read_only: bool,
}

/// How a network device reaches the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkAttachment {
    /// Host NAT; forwarding policy belongs to the runtime
    Nat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkDevice {
    pub id: String,
    pub attachment: NetworkAttachment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scanout {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsDevice {
    pub scanouts: Vec<Scanout>,
}

/// A single-direction audio stream bound to host audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioStream {
    /// Sourced from the host microphone
    HostInput,
    /// Sunk to the host speakers
    HostOutput,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDevice {
    pub streams: Vec<AudioStream>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyboardDevice {
    Usb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointingDevice {
    /// Absolute screen-coordinate pointer
    UsbScreenCoordinate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortAttachment {
    SpiceAgent,
}

/// A named port on a console device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolePort {
    pub name: String,
    pub attachment: PortAttachment,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleDevice {
    pub ports: Vec<ConsolePort>,
}

/// The resolved, ordered device set presented to the runtime for one boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTopology {
    pub mode: BootMode,
    pub storage: Vec<StorageDevice>,
    pub network: Vec<NetworkDevice>,
    pub graphics: Vec<GraphicsDevice>,
    pub audio: Vec<AudioDevice>,
    pub keyboards: Vec<KeyboardDevice>,
    pub pointing_devices: Vec<PointingDevice>,
    pub consoles: Vec<ConsoleDevice>,
}

impl DeviceTopology {
    /// The primary disk, if present.
    pub fn primary_disk(&self) -> Option<&StorageDevice> {
        self.storage.iter().find(|d| d.id == PRIMARY_DISK_ID)
    }

    /// The installer media, if present.
    pub fn install_media(&self) -> Option<&StorageDevice> {
        self.storage.iter().find(|d| d.id == INSTALL_MEDIA_ID)
    }
}

/// Builder for a [`DeviceTopology`].
///
/// # Example
///
/// ```
/// use hyperos_vm::{BootMode, DeviceTopologyBuilder};
///
/// let topology = DeviceTopologyBuilder::new(BootMode::Install)
///     .primary_disk("/vms/demo.bundle/Disk.img")
///     .install_media("/isos/fedora.iso")
///     .build()
///     .unwrap();
///
/// assert_eq!(topology.storage.len(), 2);
/// assert!(topology.storage[0].read_only);
/// ```
#[derive(Debug, Clone)]
pub struct DeviceTopologyBuilder {
    mode: BootMode,
    primary_disk: Option<PathBuf>,
    install_media: Option<PathBuf>,
    auxiliary_disks: Vec<PathBuf>,
}

impl DeviceTopologyBuilder {
    /// Create a new builder for the given boot mode.
    pub fn new(mode: BootMode) -> Self {
        Self {
            mode,
            primary_disk: None,
            install_media: None,
            auxiliary_disks: Vec::new(),
        }
    }

    /// Set the primary disk image, attached read-write.
    pub fn primary_disk(mut self, path: impl Into<PathBuf>) -> Self {
        self.primary_disk = Some(path.into());
        self
    }

    /// Set the installer image, attached read-only ahead of the primary disk.
    pub fn install_media(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_media = Some(path.into());
        self
    }

    /// Add an auxiliary disk image, attached read-write after the primary disk.
    pub fn auxiliary_disk(mut self, path: impl Into<PathBuf>) -> Self {
        self.auxiliary_disks.push(path.into());
        self
    }

    /// Assemble the topology.
    ///
    /// # Errors
    /// Returns an error if the primary disk is missing, if install mode has
    /// no installer media, or if boot mode was given installer media.
    pub fn build(self) -> Result<DeviceTopology> {
        let primary = self
            .primary_disk
            .ok_or_else(|| VmError::Config("primary disk is required".into()))?;

        let mut storage = Vec::with_capacity(2 + self.auxiliary_disks.len());

        match (self.mode, self.install_media) {
            (BootMode::Install, Some(media)) => storage.push(StorageDevice {
                id: INSTALL_MEDIA_ID.into(),
                bus: StorageBus::UsbMassStorage,
                path: media,
                read_only: true,
            }),
            (BootMode::Install, None) => {
                return Err(VmError::Config(
                    "install mode requires installer media".into(),
                ));
            }
            (BootMode::Boot, Some(media)) => {
                return Err(VmError::Config(format!(
                    "installer media {} given in boot mode",
                    media.display()
                )));
            }
            (BootMode::Boot, None) => {}
        }

        storage.push(StorageDevice {
            id: PRIMARY_DISK_ID.into(),
            bus: StorageBus::VirtioBlock,
            path: primary,
            read_only: false,
        });

        for (index, path) in self.auxiliary_disks.into_iter().enumerate() {
            storage.push(StorageDevice {
                id: format!("disk{}", index + 1),
                bus: StorageBus::VirtioBlock,
                path,
                read_only: false,
            });
        }

        tracing::debug!(mode = %self.mode, storage = storage.len(), "Assembled device topology");

        Ok(DeviceTopology {
            mode: self.mode,
            storage,
            network: vec![NetworkDevice {
                id: "net0".into(),
                attachment: NetworkAttachment::Nat,
            }],
            graphics: vec![GraphicsDevice {
                scanouts: vec![Scanout {
                    width: SCANOUT_WIDTH,
                    height: SCANOUT_HEIGHT,
                }],
            }],
            // Input and output stay on separate devices.
            audio: vec![
                AudioDevice {
                    streams: vec![AudioStream::HostInput],
                },
                AudioDevice {
                    streams: vec![AudioStream::HostOutput],
                },
            ],
            keyboards: vec![KeyboardDevice::Usb],
            pointing_devices: vec![PointingDevice::UsbScreenCoordinate],
            consoles: vec![ConsoleDevice {
                ports: vec![ConsolePort {
                    name: SPICE_AGENT_PORT_NAME.into(),
                    attachment: PortAttachment::SpiceAgent,
                }],
            }],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_mode_storage_order() {
        let topology = DeviceTopologyBuilder::new(BootMode::Install)
            .primary_disk("/vm/Disk.img")
            .install_media("/iso/install.iso")
            .build()
            .unwrap();

        assert_eq!(topology.storage.len(), 2);

        let media = &topology.storage[0];
        assert_eq!(media.id, INSTALL_MEDIA_ID);
        assert_eq!(media.bus, StorageBus::UsbMassStorage);
        assert_eq!(media.path, PathBuf::from("/iso/install.iso"));
        assert!(media.read_only);

        let disk = &topology.storage[1];
        assert_eq!(disk.id, PRIMARY_DISK_ID);
        assert_eq!(disk.path, PathBuf::from("/vm/Disk.img"));
        assert!(!disk.read_only);
    }

    #[test]
    fn test_boot_mode_storage() {
        let topology = DeviceTopologyBuilder::new(BootMode::Boot)
            .primary_disk("/vm/Disk.img")
            .build()
            .unwrap();

        assert_eq!(topology.storage.len(), 1);
        assert_eq!(topology.storage[0].id, PRIMARY_DISK_ID);
        assert!(topology.install_media().is_none());
    }

    #[test]
    fn test_install_mode_requires_media() {
        let result = DeviceTopologyBuilder::new(BootMode::Install)
            .primary_disk("/vm/Disk.img")
            .build();
        assert!(matches!(result, Err(VmError::Config(_))));
    }

    #[test]
    fn test_boot_mode_rejects_media() {
        let result = DeviceTopologyBuilder::new(BootMode::Boot)
            .primary_disk("/vm/Disk.img")
            .install_media("/iso/install.iso")
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_primary_disk_required() {
        assert!(DeviceTopologyBuilder::new(BootMode::Boot).build().is_err());
    }

    #[test]
    fn test_auxiliary_disks_follow_primary() {
        let topology = DeviceTopologyBuilder::new(BootMode::Boot)
            .primary_disk("/vm/Disk.img")
            .auxiliary_disk("/vm/data.img")
            .auxiliary_disk("/vm/scratch.img")
            .build()
            .unwrap();

        let ids: Vec<_> = topology.storage.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["disk0", "disk1", "disk2"]);
        assert_eq!(topology.storage[2].path, PathBuf::from("/vm/scratch.img"));
    }

    #[test]
    fn test_fixed_devices() {
        let topology = DeviceTopologyBuilder::new(BootMode::Boot)
            .primary_disk("/vm/Disk.img")
            .build()
            .unwrap();

        assert_eq!(topology.network.len(), 1);
        assert_eq!(topology.network[0].attachment, NetworkAttachment::Nat);

        assert_eq!(topology.graphics.len(), 1);
        assert_eq!(
            topology.graphics[0].scanouts,
            vec![Scanout {
                width: 1280,
                height: 720
            }]
        );

        assert_eq!(topology.audio.len(), 2);
        assert_eq!(topology.audio[0].streams, vec![AudioStream::HostInput]);
        assert_eq!(topology.audio[1].streams, vec![AudioStream::HostOutput]);

        assert_eq!(topology.keyboards, vec![KeyboardDevice::Usb]);
        assert_eq!(
            topology.pointing_devices,
            vec![PointingDevice::UsbScreenCoordinate]
        );

        assert_eq!(topology.consoles.len(), 1);
        assert_eq!(topology.consoles[0].ports.len(), 1);
        assert_eq!(topology.consoles[0].ports[0].name, SPICE_AGENT_PORT_NAME);
    }

    #[test]
    fn test_boot_mode_display() {
        assert_eq!(BootMode::Install.to_string(), "install");
        assert_eq!(BootMode::Boot.to_string(), "boot");
    }
}
