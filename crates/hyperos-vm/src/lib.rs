//! # hyperos-vm
//!
//! Configuration layer between a hyperos machine bundle and the hypervisor
//! that runs it.
//!
//! ## Quick Start
//!
//! ```
//! use hyperos_vm::{
//!     BootMode, DeviceTopologyBuilder, FirmwareHandle, MachineIdentity, PlatformLimits,
//!     ResourceBudgeter, VmConfiguration, GIB,
//! };
//!
//! let limits = PlatformLimits::default();
//! let budgeter = ResourceBudgeter::new(8, limits);
//!
//! let topology = DeviceTopologyBuilder::new(BootMode::Boot)
//!     .primary_disk("/vms/demo.bundle/Disk.img")
//!     .build()?;
//!
//! let config = VmConfiguration::new(
//!     budgeter.budget(16, 8 * GIB),
//!     MachineIdentity::generate(),
//!     FirmwareHandle::new("/vms/demo.bundle/NVRAM"),
//!     topology,
//! );
//!
//! config.validate(&limits)?;
//! assert_eq!(config.cpu_count, 7);
//! # Ok::<(), hyperos_vm::VmError>(())
//! ```
//!
//! ## Features
//!
//! - **Resource Budgeting**: Clamp CPU and memory into platform-legal ranges
//! - **Device Topology**: Storage, network, graphics, audio, input and console devices
//! - **Validation**: Shape checks shared by every runtime
//! - **Runtime Boundary**: `VmRuntime` trait with a single-shot start and an event stream

mod budget;
mod config;
mod error;
mod handles;
mod runtime;
mod topology;

pub use budget::{Budget, PlatformLimits, ResourceBudgeter, GIB, MIB};
pub use config::VmConfiguration;
pub use error::{Result, VmError};
pub use handles::{FirmwareHandle, MachineIdentity};
pub use runtime::{RuntimeEvent, RuntimeEventSender, RuntimeSession, StopReason, VmRuntime};
pub use topology::{
    AudioDevice, AudioStream, BootMode, ConsoleDevice, ConsolePort, DeviceTopology,
    DeviceTopologyBuilder, GraphicsDevice, KeyboardDevice, NetworkAttachment, NetworkDevice,
    PointingDevice, PortAttachment, Scanout, StorageBus, StorageDevice, INSTALL_MEDIA_ID,
    PRIMARY_DISK_ID, SCANOUT_HEIGHT, SCANOUT_WIDTH, SPICE_AGENT_PORT_NAME,
};
