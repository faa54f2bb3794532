//! # minidock-image
//!
//! Container image and layer management for the minidock runtime.
//!
//! Handles:
//! - **References**: `name[:tag]` parsing with the `latest` default.
//! - **Archives**: layer tarball extraction with deferred hard links.
//! - **Manifests**: legacy `manifest.json` parsing and mount-priority layer
//!   ordering.
//! - **Index**: the persisted `(name, tag) -> hash` tag index.
//! - **Store**: resolution, pulling, and on-disk image metadata.
//! - **Registry**: an [`fetcher::ImageFetcher`] backed by the registry HTTP API.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod archive;
pub mod fetcher;
pub mod hash;
pub mod index;
pub mod manifest;
pub mod reference;
pub mod registry;
pub mod store;
