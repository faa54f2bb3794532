//! Per-container working directories and their teardown.

use std::path::PathBuf;

use minidock_common::config::{MinidockConfig, create_dir_all};
use minidock_common::error::Result;
use minidock_common::types::ContainerId;
use minidock_core::filesystem::mount::Mounter;
use minidock_core::filesystem::overlayfs::{self, OverlayConfig};

/// Creates `containers/<id>/fs/{mnt,upperdir,workdir}`. Existing directories
/// are kept.
///
/// # Errors
///
/// Returns an error if a directory cannot be created.
pub fn prepare(config: &MinidockConfig, id: &ContainerId) -> Result<()> {
    for dir in [
        config.mount_dir(id),
        config.upper_dir(id),
        config.work_dir(id),
    ] {
        create_dir_all(&dir)?;
    }
    tracing::debug!(id = %id, dir = %config.container_dir(id).display(), "container directories ready");
    Ok(())
}

/// Scope guard owning a container's on-disk state.
///
/// Dropping it unmounts the overlay if this guard mounted it and then
/// removes `containers/<id>`. Teardown failures are logged, never raised.
pub struct ContainerSandbox<'a> {
    config: &'a MinidockConfig,
    mounter: &'a dyn Mounter,
    id: ContainerId,
    overlay_mounted: bool,
}

impl<'a> ContainerSandbox<'a> {
    /// Takes ownership of the state of container `id`.
    #[must_use]
    pub fn new(config: &'a MinidockConfig, mounter: &'a dyn Mounter, id: ContainerId) -> Self {
        Self {
            config,
            mounter,
            id,
            overlay_mounted: false,
        }
    }

    /// Creates the container directories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn prepare(&self) -> Result<()> {
        prepare(self.config, &self.id)
    }

    /// Mounts the overlay root over `lower_dirs`, highest priority first.
    ///
    /// # Errors
    ///
    /// Returns an error if the mount fails; the guard then has nothing to
    /// unmount.
    pub fn mount_overlay(&mut self, lower_dirs: Vec<PathBuf>) -> Result<()> {
        let overlay = OverlayConfig {
            lower_dirs,
            upper_dir: self.config.upper_dir(&self.id),
            work_dir: self.config.work_dir(&self.id),
            merged_dir: self.config.mount_dir(&self.id),
        };
        overlayfs::mount_overlay(self.mounter, &overlay)?;
        self.overlay_mounted = true;
        Ok(())
    }
}

impl Drop for ContainerSandbox<'_> {
    fn drop(&mut self) {
        if self.overlay_mounted {
            let merged = self.config.mount_dir(&self.id);
            if let Err(e) = overlayfs::unmount_overlay(self.mounter, &merged) {
                tracing::warn!(id = %self.id, error = %e, "failed to unmount container root");
            }
        }

        let dir = self.config.container_dir(&self.id);
        if dir.exists() {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => tracing::info!(id = %self.id, "container removed"),
                Err(e) => {
                    tracing::warn!(id = %self.id, dir = %dir.display(), error = %e, "failed to remove container directory");
                }
            }
        }
    }
}
