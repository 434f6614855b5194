//! EFI variable store presence.
//!
//! The store's contents belong to the runtime. This module only creates the
//! file for a new bundle and checks that it is there before a boot.

use crate::error::{CoreError, Result};
use hyperos_vm::FirmwareHandle;
use std::io::ErrorKind;
use std::path::Path;

/// Create an empty variable store at `path`.
///
/// # Errors
/// Returns [`CoreError::Io`] if the file already exists or its parent
/// directory is missing.
pub async fn create_store(path: &Path) -> Result<FirmwareHandle> {
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| CoreError::io("create firmware store", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| CoreError::io("sync firmware store", path, e))?;

    tracing::debug!(path = %path.display(), "Firmware store created");
    Ok(FirmwareHandle::new(path))
}

/// Open the existing variable store at `path`.
///
/// # Errors
/// Returns [`CoreError::NotFound`] if the file is absent.
pub async fn open_store(path: &Path) -> Result<FirmwareHandle> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CoreError::NotFound {
                what: "firmware store",
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(CoreError::io("open firmware store", path, e)),
    };

    if !metadata.is_file() {
        return Err(CoreError::CorruptData {
            what: "firmware store",
            path: path.to_path_buf(),
            reason: "not a regular file".into(),
        });
    }

    tracing::debug!(path = %path.display(), "Firmware store opened");
    Ok(FirmwareHandle::new(path))
}
