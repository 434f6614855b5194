//! Installer image acquisition.
//!
//! Choosing an installer is an operator decision made outside this crate
//! (a file picker, a CLI flag). [`InstallerSource`] is the single-shot
//! boundary the manager awaits while provisioning a new bundle.

use crate::error::{CoreError, Result};
use crate::profile::{InstallerImage, MachineProfile};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Supplies the installer image for a machine that needs installing.
#[async_trait]
pub trait InstallerSource: Send + Sync {
    /// Ask for an installer. `None` means the operator made no selection.
    async fn select_installer(&self, profile: &MachineProfile) -> Option<InstallerImage>;
}

/// An installer chosen ahead of time.
#[derive(Debug, Clone, Default)]
pub struct StaticInstaller(Option<InstallerImage>);

impl StaticInstaller {
    pub fn new(image: InstallerImage) -> Self {
        Self(Some(image))
    }

    /// A source that never selects anything.
    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl InstallerSource for StaticInstaller {
    async fn select_installer(&self, _profile: &MachineProfile) -> Option<InstallerImage> {
        self.0.clone()
    }
}

/// Check that an installer image can be attached.
///
/// The path must name a regular file, and when a digest is recorded the
/// file's SHA-256 must match it.
///
/// # Errors
/// Returns [`CoreError::Precondition`] if the image is missing or does not
/// match its digest.
pub async fn verify_installer(image: &InstallerImage) -> Result<()> {
    let path = image.path.as_path();

    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => {}
        Ok(_) => {
            return Err(CoreError::Precondition(format!(
                "installer {} is not a regular file",
                path.display()
            )));
        }
        Err(e) => {
            return Err(CoreError::Precondition(format!(
                "installer {} is not readable: {e}",
                path.display()
            )));
        }
    }

    if let Some(expected) = &image.sha256 {
        let actual = sha256_file_hex(path).await?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(CoreError::Precondition(format!(
                "installer {} has sha256 {actual}, expected {expected}",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), "Installer digest verified");
    }

    Ok(())
}

async fn sha256_file_hex(path: &Path) -> Result<String> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| CoreError::io("open installer", path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];

    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| CoreError::io("read installer", path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}
