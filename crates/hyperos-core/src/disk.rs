//! Disk image provisioning.

use crate::bundle::BundleLayout;
use crate::error::{CoreError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Create an empty primary disk at `path` sized to exactly `size_bytes`.
///
/// The image is extended with `set_len`, so on filesystems that support it
/// no blocks are allocated until the guest writes them. Existence is not
/// re-checked here; the caller owns that decision.
///
/// # Errors
/// Returns [`CoreError::Io`] if the file cannot be created or extended.
pub async fn create_primary_disk(path: &Path, size_bytes: u64) -> Result<()> {
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| CoreError::io("create disk image", path, e))?;

    file.set_len(size_bytes)
        .await
        .map_err(|e| CoreError::io("truncate disk image", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| CoreError::io("sync disk image", path, e))?;

    tracing::debug!(path = %path.display(), size_bytes, "Primary disk created");
    Ok(())
}

/// Resolve the recorded auxiliary disks of a bundle, in order.
///
/// Auxiliary images are never created here; each one must already exist
/// and must not be one of the bundle's own files.
///
/// # Errors
/// Returns [`CoreError::NotFound`] for the first missing image and
/// [`CoreError::Precondition`] for one that aliases the primary disk,
/// identity or firmware store.
pub async fn resolve_auxiliary_disks(
    layout: &BundleLayout,
    disks: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    if disks.is_empty() {
        return Ok(Vec::new());
    }

    let mut resolved = Vec::with_capacity(disks.len());
    let reserved = reserved_files(layout).await?;

    for disk in disks {
        let path = layout.auxiliary_disk_path(disk);
        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {
                let canonical = tokio::fs::canonicalize(&path)
                    .await
                    .map_err(|e| CoreError::io("resolve auxiliary disk", &path, e))?;
                if reserved.contains(&canonical) {
                    return Err(CoreError::Precondition(format!(
                        "auxiliary disk {} is a bundle file",
                        path.display()
                    )));
                }
                resolved.push(path);
            }
            Ok(_) => {
                return Err(CoreError::CorruptData {
                    what: "auxiliary disk",
                    path,
                    reason: "not a regular file".into(),
                });
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CoreError::NotFound {
                    what: "auxiliary disk",
                    path,
                });
            }
            Err(e) => return Err(CoreError::io("open auxiliary disk", path, e)),
        }
    }

    Ok(resolved)
}

/// Canonical paths of the bundle files that must never be attached twice.
async fn reserved_files(layout: &BundleLayout) -> Result<Vec<PathBuf>> {
    let mut reserved = Vec::with_capacity(3);

    for path in [
        layout.disk_image_path(),
        layout.identity_path(),
        layout.firmware_store_path(),
    ] {
        match tokio::fs::canonicalize(&path).await {
            Ok(canonical) => reserved.push(canonical),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::io("resolve bundle file", path, e)),
        }
    }

    Ok(reserved)
}
