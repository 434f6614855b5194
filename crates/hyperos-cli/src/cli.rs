//! Command line arguments.

use clap::{Args, Parser, Subcommand};
use hyperos_core::{CoreError, InstallerImage, MachineKind, MachineProfile, ProfileRequest};
use hyperos_vm::{GIB, MIB};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hyperos", version, about = "Provision and inspect virtual machine bundles")]
pub struct Cli {
    /// Storage root holding the machine bundles
    #[arg(long, global = true, env = "HYPEROS_ROOT")]
    pub root: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Provision the bundle if it is absent, otherwise load it
    Ensure(EnsureCommand),
    /// Print the configuration an existing bundle would boot with
    Inspect(InspectCommand),
}

#[derive(Debug, Args)]
pub struct EnsureCommand {
    #[command(flatten)]
    pub machine: MachineArgs,

    /// Installer image, required when the bundle is provisioned
    #[arg(long)]
    pub installer: Option<PathBuf>,

    /// Expected SHA-256 of the installer image (hex)
    #[arg(long, requires = "installer")]
    pub installer_sha256: Option<String>,
}

#[derive(Debug, Args)]
pub struct InspectCommand {
    #[command(flatten)]
    pub machine: MachineArgs,
}

#[derive(Debug, Args)]
pub struct MachineArgs {
    /// Bundle name
    pub name: String,

    /// Guest operating system family
    #[arg(long, default_value = "linux")]
    pub kind: MachineKind,

    /// Virtual CPUs; at least the kind's default
    #[arg(long)]
    pub cpus: Option<usize>,

    /// Guest memory in MiB; at least the kind's default
    #[arg(long)]
    pub memory_mib: Option<u64>,

    /// Primary disk size in GiB; at least the kind's default
    #[arg(long)]
    pub disk_gib: Option<u64>,

    /// Existing disk image to attach after the primary disk (repeatable)
    #[arg(long = "disk")]
    pub auxiliary_disks: Vec<PathBuf>,
}

impl MachineArgs {
    pub fn profile(&self) -> hyperos_core::Result<MachineProfile> {
        let request = ProfileRequest {
            cpu_count: self.cpus,
            memory_bytes: scale(self.memory_mib, MIB, "--memory-mib")?,
            primary_disk_bytes: scale(self.disk_gib, GIB, "--disk-gib")?,
            auxiliary_disks: self.auxiliary_disks.clone(),
        };
        MachineProfile::new(self.kind, &self.name, request)
    }
}

/// Convert a size flag to bytes, rejecting values that do not fit in `u64`.
fn scale(value: Option<u64>, unit: u64, flag: &str) -> hyperos_core::Result<Option<u64>> {
    value
        .map(|v| {
            v.checked_mul(unit)
                .ok_or_else(|| CoreError::Precondition(format!("{flag} {v} is too large")))
        })
        .transpose()
}

impl EnsureCommand {
    pub fn installer_image(&self) -> Option<InstallerImage> {
        let image = InstallerImage::new(self.installer.as_ref()?);
        Some(match &self.installer_sha256 {
            Some(digest) => image.with_sha256(digest),
            None => image,
        })
    }
}
