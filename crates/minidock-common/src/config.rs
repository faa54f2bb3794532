//! Global configuration model for the minidock runtime.
//!
//! Every component receives a [`MinidockConfig`] instead of reading ambient
//! constants, so the whole store can be pointed at a temporary root.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{MinidockError, Result};
use crate::types::{ContainerId, ImageHash};

/// Root configuration for the minidock runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinidockConfig {
    /// Base directory holding `tar/`, `images/`, and `containers/`.
    pub root: PathBuf,
}

impl Default for MinidockConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(constants::DEFAULT_ROOT),
        }
    }
}

impl MinidockConfig {
    /// Creates a configuration rooted at the given directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Creates the top-level `tar/`, `images/`, and `containers/` directories.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn init_dirs(&self) -> Result<()> {
        for dir in [
            self.root.clone(),
            self.tar_dir(),
            self.images_dir(),
            self.containers_dir(),
        ] {
            create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Scratch space for downloaded archives.
    #[must_use]
    pub fn tar_dir(&self) -> PathBuf {
        self.root.join(constants::TAR_DIR)
    }

    /// Home of all extracted images.
    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(constants::IMAGES_DIR)
    }

    /// Home of all container working trees.
    #[must_use]
    pub fn containers_dir(&self) -> PathBuf {
        self.root.join(constants::CONTAINERS_DIR)
    }

    /// Path of the persisted image tag index.
    #[must_use]
    pub fn tag_index_path(&self) -> PathBuf {
        self.images_dir().join(constants::TAG_INDEX_FILE)
    }

    /// Path of the lock file guarding tag index updates.
    #[must_use]
    pub fn tag_index_lock_path(&self) -> PathBuf {
        self.images_dir().join(constants::TAG_INDEX_LOCK)
    }

    /// Metadata directory of a single image.
    #[must_use]
    pub fn image_dir(&self, hash: &ImageHash) -> PathBuf {
        self.images_dir().join(hash.as_str())
    }

    /// Persisted manifest of an image.
    #[must_use]
    pub fn manifest_path(&self, hash: &ImageHash) -> PathBuf {
        self.image_dir(hash).join(constants::MANIFEST_FILE)
    }

    /// Persisted config blob of an image (`<hash>.json`).
    #[must_use]
    pub fn image_config_path(&self, hash: &ImageHash) -> PathBuf {
        self.image_dir(hash).join(format!("{}.json", hash.as_str()))
    }

    /// Extracted filesystem of one layer of an image.
    #[must_use]
    pub fn layer_fs_dir(&self, hash: &ImageHash, layer_key: &str) -> PathBuf {
        self.image_dir(hash).join(layer_key).join("fs")
    }

    /// Root of a container's private tree.
    #[must_use]
    pub fn container_dir(&self, id: &ContainerId) -> PathBuf {
        self.containers_dir().join(id.as_str())
    }

    /// Filesystem home of a container (`containers/<id>/fs`).
    #[must_use]
    pub fn container_fs_dir(&self, id: &ContainerId) -> PathBuf {
        self.container_dir(id).join("fs")
    }

    /// Overlay mount point, which becomes the container's `/`.
    #[must_use]
    pub fn mount_dir(&self, id: &ContainerId) -> PathBuf {
        self.container_fs_dir(id).join("mnt")
    }

    /// Writable upper directory of the container overlay.
    #[must_use]
    pub fn upper_dir(&self, id: &ContainerId) -> PathBuf {
        self.container_fs_dir(id).join("upperdir")
    }

    /// Overlay work directory.
    #[must_use]
    pub fn work_dir(&self, id: &ContainerId) -> PathBuf {
        self.container_fs_dir(id).join("workdir")
    }
}

/// `create_dir_all` with the path attached to the error.
///
/// # Errors
///
/// Returns [`MinidockError::Io`] if the directory cannot be created.
pub fn create_dir_all(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| MinidockError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
