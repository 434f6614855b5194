//! CPU and memory budgeting.
//!
//! Requested resources are clamped against what the host can spare and what
//! the virtualization platform accepts. Both operations are pure functions of
//! the host CPU count and the [`PlatformLimits`] captured at construction.

use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};

/// One mebibyte in bytes.
pub const MIB: u64 = 1024 * 1024;

/// One gibibyte in bytes.
pub const GIB: u64 = 1024 * MIB;

/// Resource bounds accepted by the virtualization platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformLimits {
    /// Smallest vCPU count the platform accepts
    pub min_cpus: usize,
    /// Largest vCPU count the platform accepts
    pub max_cpus: usize,
    /// Smallest guest memory size in bytes
    pub min_memory_bytes: u64,
    /// Largest guest memory size in bytes
    pub max_memory_bytes: u64,
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self {
            min_cpus: 1,
            max_cpus: 64,
            min_memory_bytes: 128 * MIB,
            max_memory_bytes: 1024 * GIB,
        }
    }
}

impl PlatformLimits {
    /// Validate the limits.
    ///
    /// # Errors
    /// Returns an error if a floor is zero or a range is inverted.
    pub fn validate(&self) -> Result<()> {
        if self.min_cpus == 0 {
            return Err(VmError::Config("min_cpus must be at least 1".into()));
        }
        if self.min_cpus > self.max_cpus {
            return Err(VmError::Config(format!(
                "min_cpus ({}) exceeds max_cpus ({})",
                self.min_cpus, self.max_cpus
            )));
        }
        if self.min_memory_bytes > self.max_memory_bytes {
            return Err(VmError::Config(format!(
                "min_memory_bytes ({}) exceeds max_memory_bytes ({})",
                self.min_memory_bytes, self.max_memory_bytes
            )));
        }
        Ok(())
    }
}

/// A CPU/memory pair that has been through [`ResourceBudgeter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub cpu_count: usize,
    pub memory_bytes: u64,
}

/// Clamps requested resources into a platform-legal range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceBudgeter {
    host_cpus: usize,
    limits: PlatformLimits,
}

impl ResourceBudgeter {
    /// Create a budgeter for a host reporting `host_cpus` logical CPUs.
    pub fn new(host_cpus: usize, limits: PlatformLimits) -> Self {
        Self { host_cpus, limits }
    }

    /// Create a budgeter using the logical CPU count of the current host.
    pub fn detect(limits: PlatformLimits) -> Self {
        Self::new(num_cpus::get(), limits)
    }

    pub fn host_cpus(&self) -> usize {
        self.host_cpus
    }

    pub fn limits(&self) -> &PlatformLimits {
        &self.limits
    }

    /// Clamp a requested vCPU count.
    ///
    /// One host core is left free when possible, the result is never below
    /// one, and the platform range is applied last so it always wins.
    pub fn clamp_cpu(&self, requested: usize) -> usize {
        let spare = self.host_cpus.saturating_sub(1);
        let cpus = requested.min(spare).max(1);

        cpus.max(self.limits.min_cpus).min(self.limits.max_cpus)
    }

    /// Clamp a requested memory size in bytes.
    pub fn clamp_memory(&self, requested: u64) -> u64 {
        requested
            .max(self.limits.min_memory_bytes)
            .min(self.limits.max_memory_bytes)
    }

    /// Clamp both resources at once.
    pub fn budget(&self, cpus: usize, memory_bytes: u64) -> Budget {
        let budget = Budget {
            cpu_count: self.clamp_cpu(cpus),
            memory_bytes: self.clamp_memory(memory_bytes),
        };

        if budget.cpu_count != cpus || budget.memory_bytes != memory_bytes {
            tracing::debug!(
                requested_cpus = cpus,
                requested_memory = memory_bytes,
                cpu_count = budget.cpu_count,
                memory_bytes = budget.memory_bytes,
                host_cpus = self.host_cpus,
                "Clamped requested resources"
            );
        }

        budget
    }
}
