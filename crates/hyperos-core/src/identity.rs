//! Machine identity persistence.
//!
//! An identity is written exactly once per bundle. The file is opened with
//! create-new semantics so an existing identity can never be replaced.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use hyperos_vm::MachineIdentity;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;
use tokio::io::AsyncWriteExt;

const WHAT: &str = "machine identity";

#[derive(Debug, Serialize, Deserialize)]
struct IdentityRecord {
    id: MachineIdentity,
    created_at: DateTime<Utc>,
}

/// Generate a fresh identity and persist it at `path`.
///
/// # Errors
/// Returns [`CoreError::Io`] if the file already exists or cannot be written.
pub async fn create_identity(path: &Path) -> Result<MachineIdentity> {
    let record = IdentityRecord {
        id: MachineIdentity::generate(),
        created_at: Utc::now(),
    };
    let bytes = serde_json::to_vec_pretty(&record)?;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| CoreError::io("create machine identity", path, e))?;

    file.write_all(&bytes)
        .await
        .map_err(|e| CoreError::io("write machine identity", path, e))?;
    file.sync_all()
        .await
        .map_err(|e| CoreError::io("sync machine identity", path, e))?;

    tracing::debug!(identity = %record.id, path = %path.display(), "Machine identity created");
    Ok(record.id)
}

/// Read the identity stored at `path`.
///
/// # Errors
/// Returns [`CoreError::NotFound`] if the file is missing and
/// [`CoreError::CorruptData`] if its contents are not a valid identity.
pub async fn load_identity(path: &Path) -> Result<MachineIdentity> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(CoreError::NotFound {
                what: WHAT,
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(CoreError::io("read machine identity", path, e)),
    };

    let record: IdentityRecord =
        serde_json::from_slice(&bytes).map_err(|e| CoreError::CorruptData {
            what: WHAT,
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    if record.id.as_uuid().is_nil() {
        return Err(CoreError::CorruptData {
            what: WHAT,
            path: path.to_path_buf(),
            reason: "identity is nil".into(),
        });
    }

    tracing::debug!(identity = %record.id, path = %path.display(), "Machine identity loaded");
    Ok(record.id)
}
