//! UTS namespace isolation.
//!
//! Allows the container to have its own hostname.

use minidock_common::error::{MinidockError, Result};

/// Sets the hostname inside the calling process's UTS namespace.
///
/// # Errors
///
/// Returns [`MinidockError::Isolation`] if `sethostname(2)` fails.
pub fn set_hostname(hostname: &str) -> Result<()> {
    nix::unistd::sethostname(hostname).map_err(|e| MinidockError::Isolation {
        message: format!("sethostname({hostname}) failed: {e}"),
    })?;
    tracing::debug!(hostname, "container hostname set");
    Ok(())
}
