//! Boundary to whatever retrieves images the store does not have yet.

use std::path::{Path, PathBuf};

use minidock_common::error::Result;
use minidock_common::types::ImageHash;

use crate::reference::ImageReference;

/// An image downloaded into scratch space, not yet installed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    /// Content hash of the image (hex digest of its config blob).
    pub hash: ImageHash,
    /// Directory holding `manifest.json`, `<hash>.json`, and the layer
    /// tarballs named by the manifest.
    pub dir: PathBuf,
}

/// Retrieves images into local scratch space.
pub trait ImageFetcher {
    /// Downloads `reference` into a new directory below `scratch`.
    ///
    /// # Errors
    ///
    /// Returns [`minidock_common::error::MinidockError::Fetch`] or an I/O
    /// error if the image cannot be retrieved.
    fn fetch(&self, reference: &ImageReference, scratch: &Path) -> Result<FetchedImage>;
}
