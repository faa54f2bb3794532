//! Privilege checks for operations that need root.
//!
//! Namespace creation and every mount in the container lifecycle require
//! `CAP_SYS_ADMIN`; minidock only proceeds when running as root.

use minidock_common::error::{MinidockError, Result};

/// Returns whether the effective user is root.
#[must_use]
pub fn is_privileged() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Refuses to continue unless the effective user is root.
///
/// # Errors
///
/// Returns [`MinidockError::PermissionDenied`] naming the operation when the
/// process is unprivileged.
pub fn ensure_privileged(operation: &str) -> Result<()> {
    if is_privileged() {
        return Ok(());
    }
    tracing::warn!(operation, "refusing to run without root privileges");
    Err(MinidockError::PermissionDenied {
        message: format!("{operation} requires root privileges"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_privileged_matches_effective_uid() {
        let result = ensure_privileged("test");
        assert_eq!(result.is_ok(), is_privileged());
        if let Err(e) = result {
            assert!(e.to_string().contains("test requires root"));
        }
    }
}
