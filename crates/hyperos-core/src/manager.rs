//! Bundle manager: decides between provisioning and loading, then starts.

use crate::bundle::BundleLayout;
use crate::config::ManagerConfig;
use crate::disk::create_primary_disk;
use crate::error::{CoreError, Result};
use crate::firmware::{create_store, open_store};
use crate::identity::{create_identity, load_identity};
use crate::installer::{verify_installer, InstallerSource};
use crate::machine::{Machine, MachineState};
use crate::profile::MachineProfile;
use hyperos_vm::{BootMode, ResourceBudgeter, VmRuntime};
use std::io::ErrorKind;

/// Provisions, loads and starts machine bundles under one storage root.
///
/// The manager holds no registry. Every call goes to the filesystem, and
/// the bundle directory itself is the only record of whether a machine has
/// been installed.
///
/// # Thread Safety
///
/// `BundleManager` is `Send + Sync` and can be shared across tasks. Two
/// tasks provisioning the same name race on creating the bundle directory;
/// exactly one wins and the other gets [`CoreError::AlreadyExists`].
pub struct BundleManager {
    config: ManagerConfig,
    budgeter: ResourceBudgeter,
}

impl BundleManager {
    /// Create a new bundle manager.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        let budgeter = config.budgeter();

        tracing::info!(
            root = %config.root_dir.display(),
            host_cpus = budgeter.host_cpus(),
            "Creating bundle manager"
        );
        Ok(Self { config, budgeter })
    }

    /// Get the manager configuration.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn budgeter(&self) -> &ResourceBudgeter {
        &self.budgeter
    }

    /// Paths of the bundle named `name`.
    pub fn layout(&self, name: &str) -> BundleLayout {
        BundleLayout::new(&self.config.root_dir, name)
    }

    /// Whether the bundle for `profile` still has to be provisioned.
    ///
    /// Only the bundle directory is consulted; a partial bundle counts as
    /// installed and fails later when it is loaded.
    pub async fn needs_install(&self, profile: &MachineProfile) -> Result<bool> {
        let layout = self.layout(profile.bundle_name());
        let exists = layout
            .exists()
            .await
            .map_err(|e| CoreError::io("inspect bundle", layout.dir(), e))?;
        Ok(!exists)
    }

    /// Bring the bundle for `profile` to `Ready`.
    ///
    /// A missing bundle is provisioned, acquiring an installer from
    /// `installer`, and comes back `Ready(install)`. An existing bundle is
    /// loaded without any writes and comes back `Ready(boot)`.
    ///
    /// # Errors
    /// Returns an error if provisioning or loading fails. Nothing written
    /// before the failure is removed.
    pub async fn ensure_bundle(
        &self,
        profile: MachineProfile,
        installer: &dyn InstallerSource,
    ) -> Result<Machine> {
        let bundle = profile.bundle_name().to_owned();

        if self.needs_install(&profile).await? {
            tracing::info!(bundle = %bundle, state = %MachineState::Uninitialized, "Bundle absent");
            self.provision(profile, installer)
                .await
                .inspect_err(|e| {
                    tracing::error!(bundle = %bundle, stage = "provision", error = %e, "Provisioning failed");
                })
        } else {
            self.load(profile).await.inspect_err(|e| {
                tracing::error!(bundle = %bundle, stage = "load", error = %e, "Loading bundle failed");
            })
        }
    }

    /// Create a new bundle for `profile`.
    ///
    /// Steps run in order: bundle directory, primary disk, installer
    /// selection and verification, identity, firmware store. The identity
    /// and firmware store are written last, so a bundle interrupted before
    /// them fails to load instead of booting without an installed guest.
    ///
    /// # Errors
    /// Returns [`CoreError::AlreadyExists`] if the bundle directory exists,
    /// [`CoreError::Precondition`] if no usable installer is supplied, and
    /// [`CoreError::Io`] for filesystem failures.
    pub async fn provision(
        &self,
        profile: MachineProfile,
        installer: &dyn InstallerSource,
    ) -> Result<Machine> {
        let layout = self.layout(profile.bundle_name());
        tracing::info!(
            bundle = %profile.bundle_name(),
            kind = %profile.kind(),
            dir = %layout.dir().display(),
            state = %MachineState::Provisioning,
            "Provisioning bundle"
        );

        tokio::fs::create_dir_all(&self.config.root_dir)
            .await
            .map_err(|e| CoreError::io("create storage root", &self.config.root_dir, e))?;

        // The non-recursive create is the claim on this name.
        match tokio::fs::create_dir(layout.dir()).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CoreError::AlreadyExists(layout.dir().to_path_buf()));
            }
            Err(e) => return Err(CoreError::io("create bundle directory", layout.dir(), e)),
        }

        create_primary_disk(&layout.disk_image_path(), profile.primary_disk_bytes()).await?;

        let image = installer.select_installer(&profile).await.ok_or_else(|| {
            CoreError::Precondition(format!(
                "no installer image selected for {}",
                profile.bundle_name()
            ))
        })?;
        verify_installer(&image).await?;
        tracing::info!(
            bundle = %profile.bundle_name(),
            installer = %image.path.display(),
            "Installer selected"
        );

        let identity = create_identity(&layout.identity_path()).await?;
        let firmware = create_store(&layout.firmware_store_path()).await?;

        Ok(Machine::ready(
            profile.with_installer(image),
            layout,
            BootMode::Install,
            identity,
            firmware,
        ))
    }

    /// Load the existing bundle for `profile`. Performs no writes.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] if the bundle or any of its boot
    /// files is missing and [`CoreError::CorruptData`] if the identity
    /// cannot be parsed.
    pub async fn load(&self, profile: MachineProfile) -> Result<Machine> {
        let layout = self.layout(profile.bundle_name());
        tracing::debug!(bundle = %profile.bundle_name(), dir = %layout.dir().display(), "Loading bundle");

        let identity = load_identity(&layout.identity_path()).await?;
        let firmware = open_store(&layout.firmware_store_path()).await?;

        let disk = layout.disk_image_path();
        match tokio::fs::try_exists(&disk).await {
            Ok(true) => {}
            Ok(false) => {
                return Err(CoreError::NotFound {
                    what: "disk image",
                    path: disk,
                });
            }
            Err(e) => return Err(CoreError::io("inspect disk image", disk, e)),
        }

        Ok(Machine::ready(
            profile,
            layout,
            BootMode::Boot,
            identity,
            firmware,
        ))
    }

    /// Start a `Ready` machine on `runtime`.
    ///
    /// # Errors
    /// Returns an error if the machine is not `Ready`, if its configuration
    /// is rejected, or if the runtime fails to start it.
    pub async fn start<R>(&self, machine: &mut Machine, runtime: &R) -> Result<()>
    where
        R: VmRuntime + ?Sized,
    {
        machine.start(runtime, &self.budgeter).await
    }

    /// Ensure the bundle for `profile` and start it.
    ///
    /// # Errors
    /// Returns the first error from [`ensure_bundle`](Self::ensure_bundle)
    /// or [`start`](Self::start). The runtime is never invoked when the
    /// bundle could not be brought to `Ready`.
    pub async fn start_machine<R>(
        &self,
        profile: MachineProfile,
        installer: &dyn InstallerSource,
        runtime: &R,
    ) -> Result<Machine>
    where
        R: VmRuntime + ?Sized,
    {
        let mut machine = self.ensure_bundle(profile, installer).await?;
        self.start(&mut machine, runtime).await?;
        Ok(machine)
    }
}
