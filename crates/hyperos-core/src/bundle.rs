//! On-disk layout of a machine bundle.
//!
//! ```text
//! <root>/<name>.bundle/
//! ├── MachineIdentifier
//! ├── NVRAM
//! ├── Disk.img
//! └── <auxiliary images>
//! ```

use std::path::{Path, PathBuf};

/// Extension appended to the bundle name to form its directory name.
pub const BUNDLE_EXTENSION: &str = "bundle";

/// File name of the machine identity.
pub const IDENTITY_FILE: &str = "MachineIdentifier";

/// File name of the EFI variable store.
pub const FIRMWARE_STORE_FILE: &str = "NVRAM";

/// File name of the primary disk image.
pub const DISK_IMAGE_FILE: &str = "Disk.img";

/// Paths of one bundle under a storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    dir: PathBuf,
}

impl BundleLayout {
    /// Layout of bundle `name` under `root`.
    pub fn new(root: &Path, name: &str) -> Self {
        Self {
            dir: root.join(format!("{name}.{BUNDLE_EXTENSION}")),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn identity_path(&self) -> PathBuf {
        self.dir.join(IDENTITY_FILE)
    }

    pub fn firmware_store_path(&self) -> PathBuf {
        self.dir.join(FIRMWARE_STORE_FILE)
    }

    pub fn disk_image_path(&self) -> PathBuf {
        self.dir.join(DISK_IMAGE_FILE)
    }

    /// Resolve an auxiliary disk path; relative paths live inside the bundle.
    pub fn auxiliary_disk_path(&self, path: &Path) -> PathBuf {
        self.dir.join(path)
    }

    /// Whether the bundle directory exists.
    ///
    /// This is the only source of truth for whether a machine still needs
    /// installing.
    pub async fn exists(&self) -> std::io::Result<bool> {
        tokio::fs::try_exists(&self.dir).await
    }
}
