//! `OverlayFS` management for layered container filesystems.
//!
//! Stacks the read-only image layers under a single writable upper layer,
//! giving every container a copy-on-write view of a shared image.

use std::path::{Path, PathBuf};

use minidock_common::error::{MinidockError, Result};

use super::mount::{MountSpec, Mounter};

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    /// Read-only lower layers, highest priority first.
    ///
    /// The kernel gives the leftmost `lowerdir` entry precedence, so callers
    /// must pass the most recently built layer first.
    pub lower_dirs: Vec<PathBuf>,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
}

impl OverlayConfig {
    /// Builds the `lowerdir=...,upperdir=...,workdir=...` option string.
    #[must_use]
    pub fn options(&self) -> String {
        let lowers = self
            .lower_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":");
        format!(
            "lowerdir={},upperdir={},workdir={}",
            lowers,
            self.upper_dir.display(),
            self.work_dir.display()
        )
    }

    /// Converts the configuration into a mount request.
    #[must_use]
    pub fn to_mount_spec(&self) -> MountSpec {
        MountSpec::new("overlay", &self.merged_dir, "overlay").data(self.options())
    }
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// The upper, work, and merged directories must already exist.
///
/// # Errors
///
/// Returns an error if no lower layer is given or the mount fails.
pub fn mount_overlay(mounter: &dyn Mounter, config: &OverlayConfig) -> Result<()> {
    if config.lower_dirs.is_empty() {
        return Err(MinidockError::Mount {
            target: config.merged_dir.clone(),
            message: "overlay requires at least one lower layer".into(),
        });
    }
    mounter.mount(&config.to_mount_spec())?;
    tracing::info!(
        merged = %config.merged_dir.display(),
        layers = config.lower_dirs.len(),
        "overlayfs mounted"
    );
    Ok(())
}

/// Unmounts an `OverlayFS` at the given path.
///
/// # Errors
///
/// Returns an error if the unmount fails.
pub fn unmount_overlay(mounter: &dyn Mounter, merged_dir: &Path) -> Result<()> {
    mounter.unmount(merged_dir)?;
    tracing::info!(path = %merged_dir.display(), "overlayfs unmounted");
    Ok(())
}
