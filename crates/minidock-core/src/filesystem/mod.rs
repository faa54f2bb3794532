//! Filesystem management for container isolation.
//!
//! Provides `OverlayFS` assembly of image layers, the virtual filesystems
//! mounted inside a container, and `chroot` root switching.

pub mod mount;
pub mod overlayfs;
pub mod root;
