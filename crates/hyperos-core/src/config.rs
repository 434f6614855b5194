//! Manager configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults
//! and threaded into [`BundleManager`](crate::BundleManager) at construction.

use crate::error::{CoreError, Result};
use hyperos_vm::{PlatformLimits, ResourceBudgeter, MIB};
use std::path::PathBuf;

/// Directory name of the default storage root under the user's home.
pub const DEFAULT_ROOT_DIR_NAME: &str = "VirtualMachines";

/// Configuration for [`BundleManager`](crate::BundleManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Storage root holding one `<name>.bundle` directory per machine.
    pub root_dir: PathBuf,
    /// Resource bounds accepted by the platform.
    pub limits: PlatformLimits,
    /// Host logical CPU count; detected when `None`.
    pub host_cpus: Option<usize>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            root_dir: home.join(DEFAULT_ROOT_DIR_NAME),
            limits: PlatformLimits::default(),
            host_cpus: None,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration rooted at `root_dir` with default limits.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    /// Override the platform limits.
    pub fn with_limits(mut self, limits: PlatformLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Override the detected host CPU count.
    pub fn with_host_cpus(mut self, cpus: usize) -> Self {
        self.host_cpus = Some(cpus);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `HYPEROS_ROOT` | `$HOME/VirtualMachines` |
    /// | `HYPEROS_MIN_CPUS` | `1` |
    /// | `HYPEROS_MAX_CPUS` | `64` |
    /// | `HYPEROS_MIN_MEMORY_MIB` | `128` |
    /// | `HYPEROS_MAX_MEMORY_MIB` | `1048576` |
    /// | `HYPEROS_HOST_CPUS` | detected |
    pub fn from_env() -> Self {
        let default = Self::default();
        let limits = default.limits;

        Self {
            root_dir: std::env::var("HYPEROS_ROOT")
                .map(PathBuf::from)
                .unwrap_or(default.root_dir),
            limits: PlatformLimits {
                min_cpus: env_parse("HYPEROS_MIN_CPUS").unwrap_or(limits.min_cpus),
                max_cpus: env_parse("HYPEROS_MAX_CPUS").unwrap_or(limits.max_cpus),
                min_memory_bytes: env_mib("HYPEROS_MIN_MEMORY_MIB")
                    .unwrap_or(limits.min_memory_bytes),
                max_memory_bytes: env_mib("HYPEROS_MAX_MEMORY_MIB")
                    .unwrap_or(limits.max_memory_bytes),
            },
            host_cpus: env_parse("HYPEROS_HOST_CPUS"),
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(CoreError::Precondition("root_dir is required".into()));
        }
        self.limits.validate()?;
        Ok(())
    }

    /// Build the resource budgeter for this configuration.
    pub fn budgeter(&self) -> ResourceBudgeter {
        match self.host_cpus {
            Some(cpus) => ResourceBudgeter::new(cpus, self.limits),
            None => ResourceBudgeter::detect(self.limits),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// A MiB count from the environment in bytes; unset if it does not fit.
fn env_mib(key: &str) -> Option<u64> {
    env_parse::<u64>(key).and_then(mib_to_bytes)
}

fn mib_to_bytes(mib: u64) -> Option<u64> {
    mib.checked_mul(MIB)
}
