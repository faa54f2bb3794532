//! Container lifecycle management for the minidock runtime.
//!
//! A container run is split across two processes. The parent ([`engine::Engine::run`])
//! resolves the image, assembles the overlay root, and re-executes itself in
//! new namespaces; the re-executed child ([`engine::Engine::child`]) switches
//! root, mounts the virtual filesystems, and runs the user command. The
//! parent tears everything down when the child exits.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod container;
pub mod engine;
pub mod launcher;
