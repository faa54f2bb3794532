//! Mount utilities for container filesystem setup.
//!
//! Every mount goes through the [`Mounter`] trait so the ordering logic of
//! [`MountStack`] can be exercised without privileges. [`SyscallMounter`] is
//! the real implementation backed by `mount(2)` and `umount2(2)`.

use std::path::{Path, PathBuf};

use minidock_common::error::{MinidockError, Result};
use minidock_common::types::ExtraMounts;
use nix::mount::{MntFlags, MsFlags};

/// A single mount request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountSpec {
    /// Device or pseudo-source name (`proc`, `sysfs`, `overlay`, ...).
    pub source: String,
    /// Mount point.
    pub target: PathBuf,
    /// Filesystem type.
    pub fstype: String,
    /// Mount flags.
    pub flags: MsFlags,
    /// Filesystem-specific options.
    pub data: Option<String>,
}

impl MountSpec {
    /// Creates a mount request without flags or options.
    #[must_use]
    pub fn new(source: &str, target: impl Into<PathBuf>, fstype: &str) -> Self {
        Self {
            source: source.to_string(),
            target: target.into(),
            fstype: fstype.to_string(),
            flags: MsFlags::empty(),
            data: None,
        }
    }

    /// Sets the mount flags.
    #[must_use]
    pub fn flags(mut self, flags: MsFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the filesystem-specific option string.
    #[must_use]
    pub fn data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }
}

/// Performs mount and unmount operations.
pub trait Mounter {
    /// Mounts the given request.
    ///
    /// # Errors
    ///
    /// Returns [`MinidockError::Mount`] if the mount fails.
    fn mount(&self, spec: &MountSpec) -> Result<()>;

    /// Unmounts whatever is mounted at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`MinidockError::Mount`] if the unmount fails.
    fn unmount(&self, target: &Path) -> Result<()>;
}

/// [`Mounter`] issuing the real system calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyscallMounter;

impl Mounter for SyscallMounter {
    fn mount(&self, spec: &MountSpec) -> Result<()> {
        nix::mount::mount(
            Some(spec.source.as_str()),
            spec.target.as_path(),
            Some(spec.fstype.as_str()),
            spec.flags,
            spec.data.as_deref(),
        )
        .map_err(|e| MinidockError::Mount {
            target: spec.target.clone(),
            message: format!("mount {} ({}) failed: {e}", spec.source, spec.fstype),
        })?;
        tracing::debug!(mount_point = %spec.target.display(), fstype = %spec.fstype, "mounted");
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        nix::mount::umount2(target, MntFlags::MNT_DETACH).map_err(|e| MinidockError::Mount {
            target: target.to_path_buf(),
            message: format!("unmount failed: {e}"),
        })?;
        tracing::debug!(mount_point = %target.display(), "unmounted");
        Ok(())
    }
}

/// Ordered record of the mounts that actually succeeded.
///
/// Teardown pops entries in reverse order of mounting. A failed mount is
/// never recorded, so it is never unmounted.
pub struct MountStack<'a> {
    mounter: &'a dyn Mounter,
    mounted: Vec<PathBuf>,
}

impl<'a> MountStack<'a> {
    /// Creates an empty stack backed by the given mounter.
    #[must_use]
    pub fn new(mounter: &'a dyn Mounter) -> Self {
        Self {
            mounter,
            mounted: Vec::new(),
        }
    }

    /// Mounts `spec` and records it on success.
    ///
    /// # Errors
    ///
    /// Propagates the mounter's error; the stack is left unchanged.
    pub fn push(&mut self, spec: &MountSpec) -> Result<()> {
        self.mounter.mount(spec)?;
        self.mounted.push(spec.target.clone());
        Ok(())
    }

    /// Currently active mount points, oldest first.
    #[must_use]
    pub fn mounted(&self) -> &[PathBuf] {
        &self.mounted
    }

    /// Unmounts every recorded mount point, newest first.
    ///
    /// # Errors
    ///
    /// Stops at the first failing unmount and returns its error. Entries below
    /// it stay recorded and are not unmounted.
    pub fn unwind(&mut self) -> Result<()> {
        while let Some(target) = self.mounted.pop() {
            if let Err(e) = self.mounter.unmount(&target) {
                tracing::error!(mount_point = %target.display(), error = %e, "unmount failed, aborting teardown");
                return Err(e);
            }
        }
        Ok(())
    }
}

/// Virtual filesystems mounted inside a freshly rooted container, in mount
/// order. `/dev/pts` is nested under `/dev` and therefore follows it.
#[must_use]
pub fn virtual_filesystems(extra: ExtraMounts) -> Vec<MountSpec> {
    let common = MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC | MsFlags::MS_NODEV;
    let mut specs = vec![
        MountSpec::new("proc", "/proc", "proc").flags(common),
        MountSpec::new("sysfs", "/sys", "sysfs").flags(common),
    ];
    if extra.dev {
        specs.push(
            MountSpec::new("tmpfs", "/dev", "tmpfs")
                .flags(MsFlags::MS_NOSUID | MsFlags::MS_STRICTATIME)
                .data("mode=755,size=65536k"),
        );
        specs.push(
            MountSpec::new("devpts", "/dev/pts", "devpts")
                .flags(MsFlags::MS_NOSUID | MsFlags::MS_NOEXEC)
                .data("newinstance,ptmxmode=0666,mode=0620"),
        );
    }
    if extra.tmp {
        specs.push(
            MountSpec::new("tmpfs", "/tmp", "tmpfs")
                .flags(MsFlags::MS_NOSUID | MsFlags::MS_NODEV)
                .data("mode=1777"),
        );
    }
    specs
}
