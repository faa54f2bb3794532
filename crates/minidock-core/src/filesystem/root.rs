//! Root filesystem switching for the container process.

use std::path::Path;

use minidock_common::error::{MinidockError, Result};
use nix::mount::MsFlags;

/// Marks every mount in the current mount namespace as private.
///
/// Without this, mounts made inside the container would propagate back to
/// shared peers in the host namespace.
///
/// # Errors
///
/// Returns [`MinidockError::Mount`] if the remount fails.
pub fn make_mounts_private() -> Result<()> {
    nix::mount::mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_PRIVATE,
        None::<&str>,
    )
    .map_err(|e| MinidockError::Mount {
        target: "/".into(),
        message: format!("making mounts private failed: {e}"),
    })?;
    tracing::debug!("mount propagation set to private");
    Ok(())
}

/// Changes the process root to `new_root` and the working directory to `/`.
///
/// # Errors
///
/// Returns [`MinidockError::Isolation`] if `chroot(2)` or `chdir(2)` fails.
pub fn change_root(new_root: &Path) -> Result<()> {
    nix::unistd::chroot(new_root).map_err(|e| MinidockError::Isolation {
        message: format!("chroot to {} failed: {e}", new_root.display()),
    })?;
    nix::unistd::chdir("/").map_err(|e| MinidockError::Isolation {
        message: format!("chdir to / failed: {e}"),
    })?;
    tracing::info!(new_root = %new_root.display(), "root changed");
    Ok(())
}
