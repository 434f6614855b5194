//! Machine type - one bundle driven through startup and run.

use crate::bundle::BundleLayout;
use crate::disk::resolve_auxiliary_disks;
use crate::error::{CoreError, Result};
use crate::profile::MachineProfile;
use hyperos_vm::{
    BootMode, DeviceTopology, DeviceTopologyBuilder, FirmwareHandle, MachineIdentity,
    ResourceBudgeter, RuntimeEvent, RuntimeSession, StopReason, VmConfiguration, VmRuntime,
};
use std::fmt;

/// Lifecycle state of a machine.
///
/// `Uninitialized` and `Provisioning` are passed through inside
/// [`BundleManager`](crate::BundleManager); a [`Machine`] handed to callers
/// starts in `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineState {
    /// Bundle directory absent
    Uninitialized,
    /// Bundle being created
    Provisioning,
    /// Boot resources in place, ready to start in the given mode
    Ready(BootMode),
    /// Handed to the runtime
    Running,
    /// Terminal
    Stopped,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uninitialized => write!(f, "Uninitialized"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::Ready(mode) => write!(f, "Ready({mode})"),
            Self::Running => write!(f, "Running"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Assemble the devices of `profile` for one boot in `mode`.
///
/// Auxiliary disks are checked on every call, so a disk removed between
/// boots is reported instead of handed to the runtime.
///
/// # Errors
/// Returns [`CoreError::Precondition`] if install mode has no installer and
/// [`CoreError::NotFound`] if an auxiliary disk is missing.
pub async fn build_topology(
    profile: &MachineProfile,
    layout: &BundleLayout,
    mode: BootMode,
) -> Result<DeviceTopology> {
    let mut builder = DeviceTopologyBuilder::new(mode).primary_disk(layout.disk_image_path());

    if mode == BootMode::Install {
        let installer = profile.installer().ok_or_else(|| {
            CoreError::Precondition(format!(
                "bundle {} needs install but has no installer image",
                profile.bundle_name()
            ))
        })?;
        builder = builder.install_media(&installer.path);
    }

    for disk in resolve_auxiliary_disks(layout, profile.auxiliary_disks()).await? {
        builder = builder.auxiliary_disk(disk);
    }

    Ok(builder.build()?)
}

/// A provisioned or loaded machine bundle.
///
/// Created by [`BundleManager`](crate::BundleManager). Holds the identity and
/// firmware handles of its bundle and the runtime session once started.
pub struct Machine {
    profile: MachineProfile,
    layout: BundleLayout,
    state: MachineState,
    identity: MachineIdentity,
    firmware: FirmwareHandle,
    session: Option<RuntimeSession>,
    stop_reason: Option<StopReason>,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("bundle", &self.profile.bundle_name())
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish_non_exhaustive()
    }
}

impl Machine {
    pub(crate) fn ready(
        profile: MachineProfile,
        layout: BundleLayout,
        mode: BootMode,
        identity: MachineIdentity,
        firmware: FirmwareHandle,
    ) -> Self {
        tracing::info!(
            bundle = %profile.bundle_name(),
            identity = %identity,
            state = %MachineState::Ready(mode),
            "Machine ready"
        );

        Self {
            profile,
            layout,
            state: MachineState::Ready(mode),
            identity,
            firmware,
            session: None,
            stop_reason: None,
        }
    }

    pub fn profile(&self) -> &MachineProfile {
        &self.profile
    }

    pub fn layout(&self) -> &BundleLayout {
        &self.layout
    }

    /// Get the current state.
    pub fn state(&self) -> MachineState {
        self.state
    }

    pub fn identity(&self) -> MachineIdentity {
        self.identity
    }

    pub fn firmware(&self) -> &FirmwareHandle {
        &self.firmware
    }

    /// Why the machine stopped, once it has.
    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stop_reason.as_ref()
    }

    /// Whether this start installs the guest. Only meaningful while `Ready`.
    pub fn needs_install(&self) -> bool {
        self.state == MachineState::Ready(BootMode::Install)
    }

    /// Build and validate the configuration this machine would start with.
    ///
    /// # Errors
    /// Returns an error if the machine is not `Ready`, if the topology
    /// cannot be assembled, or if the configuration fails validation.
    pub async fn configuration(&self, budgeter: &ResourceBudgeter) -> Result<VmConfiguration> {
        let MachineState::Ready(mode) = self.state else {
            return Err(self.invalid_state("Ready"));
        };

        let topology = build_topology(&self.profile, &self.layout, mode).await?;
        let budget = budgeter.budget(self.profile.cpu_count(), self.profile.memory_bytes());

        let config = VmConfiguration::new(budget, self.identity, self.firmware.clone(), topology);
        config.validate(budgeter.limits())?;

        tracing::debug!(
            bundle = %self.profile.bundle_name(),
            mode = %mode,
            cpu_count = config.cpu_count,
            memory_bytes = config.memory_bytes,
            storage = config.topology.storage.len(),
            "Configuration assembled"
        );
        Ok(config)
    }

    /// Validate the configuration with the runtime and start it.
    ///
    /// Any failure leaves the machine `Stopped`; nothing is retried.
    ///
    /// # Errors
    /// Returns an error if the machine is not `Ready`, if the configuration
    /// is rejected, or if the runtime fails to start.
    pub async fn start<R>(&mut self, runtime: &R, budgeter: &ResourceBudgeter) -> Result<()>
    where
        R: VmRuntime + ?Sized,
    {
        if !matches!(self.state, MachineState::Ready(_)) {
            return Err(self.invalid_state("Ready"));
        }

        let bundle = self.profile.bundle_name().to_owned();
        let start = std::time::Instant::now();
        tracing::info!(bundle = %bundle, state = %self.state, "Starting machine");

        let result = async {
            let config = self.configuration(budgeter).await?;
            runtime.validate(&config)?;
            Ok::<_, CoreError>(runtime.start(&config).await?)
        }
        .await;

        match result {
            Ok(session) => {
                self.session = Some(session);
                self.state = MachineState::Running;
                tracing::info!(
                    bundle = %bundle,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Machine running"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(bundle = %bundle, stage = "start", error = %e, "Machine failed to start");
                self.state = MachineState::Stopped;
                self.stop_reason = Some(StopReason::Error(e.to_string()));
                Err(e)
            }
        }
    }

    /// Follow runtime notifications until the machine stops.
    ///
    /// Peripheral disconnects are logged and the machine keeps running.
    ///
    /// # Errors
    /// Returns an error if the machine is not `Running`.
    pub async fn wait(&mut self) -> Result<StopReason> {
        let Some(session) = self.session.as_mut() else {
            return Err(self.invalid_state("Running"));
        };
        let bundle = self.profile.bundle_name();

        let reason = loop {
            match session.next_event().await {
                Some(RuntimeEvent::PeripheralDisconnected { device, error }) => {
                    tracing::warn!(bundle = %bundle, device = %device, error = %error, "Peripheral disconnected");
                }
                Some(RuntimeEvent::GuestStopped) => break StopReason::GuestShutdown,
                Some(RuntimeEvent::StoppedWithError(error)) => break StopReason::Error(error),
                None => break StopReason::Error("runtime event stream closed".into()),
            }
        };

        if reason.is_clean() {
            tracing::info!(bundle = %bundle, "Guest stopped");
        } else {
            tracing::error!(bundle = %bundle, reason = %reason, "Machine stopped with error");
        }

        self.session = None;
        self.state = MachineState::Stopped;
        self.stop_reason = Some(reason.clone());
        Ok(reason)
    }

    fn invalid_state(&self, expected: &str) -> CoreError {
        CoreError::InvalidState {
            expected: expected.into(),
            actual: self.state.to_string(),
        }
    }
}
