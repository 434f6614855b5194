//! # hyperos-core
//!
//! Machine bundle lifecycle for hyperos virtual machines.
//!
//! A machine lives in a bundle directory under the storage root. The first
//! start of a name provisions the bundle and boots the installer; every
//! later start loads the bundle and boots the installed disk.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   hyperos-core (host)                    │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐    │
//! │  │ BundleManager   │────▶│  <root>/<name>.bundle/   │    │
//! │  │ - ensure_bundle │     │    MachineIdentifier     │    │
//! │  │ - provision()   │     │    NVRAM                 │    │
//! │  │ - load()        │     │    Disk.img              │    │
//! │  └─────────────────┘     └──────────────────────────┘    │
//! │           │                                              │
//! │           ▼                                              │
//! │  ┌─────────────────┐     ┌──────────────────────────┐    │
//! │  │    Machine      │────▶│   VmConfiguration        │    │
//! │  │  - start()      │     │   (from hyperos-vm)      │    │
//! │  │  - wait()       │     └──────────────────────────┘    │
//! │  └─────────────────┘                │                    │
//! │                                     ▼                    │
//! │                          ┌──────────────────────────┐    │
//! │                          │  VmRuntime (hypervisor)  │    │
//! │                          └──────────────────────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use hyperos_core::{
//!     BundleManager, InstallerImage, MachineKind, MachineProfile, ManagerConfig, StaticInstaller,
//! };
//!
//! # async fn example(runtime: &dyn hyperos_vm::VmRuntime) -> hyperos_core::Result<()> {
//! let manager = BundleManager::new(ManagerConfig::from_env())?;
//!
//! let profile = MachineProfile::preset(MachineKind::Linux, "ubuntu")?;
//! let installer = StaticInstaller::new(InstallerImage::new("/isos/ubuntu.iso"));
//!
//! // First run installs, later runs boot the installed disk
//! let mut machine = manager.start_machine(profile, &installer, runtime).await?;
//! let reason = machine.wait().await?;
//! println!("stopped: {reason}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Kind Presets**: CPU, memory and disk defaults per guest operating system
//! - **Atomic Provisioning**: One winner per bundle name, existing data never overwritten
//! - **Fail-Closed Loading**: Partial bundles report what is missing instead of booting
//! - **Runtime Events**: Peripheral disconnects logged, stops reported with their reason

mod bundle;
mod config;
mod disk;
mod error;
mod firmware;
mod identity;
mod installer;
mod machine;
mod manager;
mod peripherals;
mod profile;

pub use bundle::{BundleLayout, BUNDLE_EXTENSION, DISK_IMAGE_FILE, FIRMWARE_STORE_FILE, IDENTITY_FILE};
pub use config::{ManagerConfig, DEFAULT_ROOT_DIR_NAME};
pub use disk::{create_primary_disk, resolve_auxiliary_disks};
pub use error::{CoreError, ErrorKind, Result};
pub use firmware::{create_store, open_store};
pub use identity::{create_identity, load_identity};
pub use installer::{verify_installer, InstallerSource, StaticInstaller};
pub use machine::{build_topology, Machine, MachineState};
pub use manager::BundleManager;
pub use peripherals::{watch_peripherals, PeripheralEvent, UsbDevice, USB_CLASS_HUB};
pub use profile::{InstallerImage, KindPreset, MachineKind, MachineProfile, ProfileRequest};
