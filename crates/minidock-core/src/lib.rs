//! # minidock-core
//!
//! Low-level Linux isolation primitives for the minidock runtime.
//!
//! This crate provides safe abstractions over:
//! - **Namespaces**: PID, mount, UTS, and IPC isolation via `clone(2)`.
//! - **Filesystem**: `OverlayFS` assembly, virtual filesystem mounts with
//!   ordered teardown, and `chroot(2)` root switching.
//! - **Privilege**: the root check guarding every privileged entry point.
//!
//! All unsafe system calls are encapsulated in safe wrappers with
//! proper error handling and `// SAFETY:` documentation.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod filesystem;
pub mod namespace;
pub mod privilege;
