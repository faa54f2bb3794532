//! Local image store.
//!
//! Resolves references through the tag index, pulls missing images through
//! an [`ImageFetcher`], and installs them under `images/<hash>/`:
//!
//! ```text
//! images/
//!   images.json            tag index
//!   <hash>/manifest.json
//!   <hash>/<hash>.json     config blob
//!   <hash>/<layer12>/fs/   extracted layer
//! ```

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use minidock_common::config::{MinidockConfig, create_dir_all};
use minidock_common::constants::MANIFEST_FILE;
use minidock_common::error::{MinidockError, Result};
use minidock_common::types::ImageHash;
use nix::fcntl::{Flock, FlockArg};

use crate::archive;
use crate::fetcher::{FetchedImage, ImageFetcher};
use crate::index::TagIndex;
use crate::manifest::{self, ImageConfig};
use crate::reference::ImageReference;

/// Image store rooted at a [`MinidockConfig`].
pub struct ImageStore {
    config: MinidockConfig,
    fetcher: Box<dyn ImageFetcher>,
}

impl ImageStore {
    /// Creates a store that pulls missing images through `fetcher`.
    #[must_use]
    pub fn new(config: MinidockConfig, fetcher: Box<dyn ImageFetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &MinidockConfig {
        &self.config
    }

    /// Looks up a reference in the tag index without pulling.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn lookup(&self, reference: &ImageReference) -> Result<Option<ImageHash>> {
        let index = TagIndex::load(&self.config.tag_index_path())?;
        Ok(index.get(&reference.name, &reference.tag))
    }

    /// Resolves `name[:tag]` to a content hash, pulling the image on a miss.
    ///
    /// Pulls are serialized across processes by an exclusive lock on
    /// `images/images.lock`; the index is checked again once the lock is
    /// held, so an image pulled concurrently by another process is reused.
    ///
    /// # Errors
    ///
    /// Returns an error if the reference is invalid, the fetch fails, or the
    /// image cannot be installed. A failed pull leaves any partially
    /// extracted layers on disk.
    pub fn resolve(&self, reference: &str) -> Result<ImageHash> {
        let reference = ImageReference::parse(reference)?;
        if let Some(hash) = self.lookup(&reference)? {
            tracing::info!(image = %reference, hash = %hash, "image found in local store");
            return Ok(hash);
        }

        create_dir_all(&self.config.images_dir())?;
        create_dir_all(&self.config.tar_dir())?;
        let _lock = lock_index(&self.config.tag_index_lock_path())?;

        if let Some(hash) = self.lookup(&reference)? {
            tracing::info!(image = %reference, hash = %hash, "image pulled by another process");
            return Ok(hash);
        }
        self.pull(&reference)
    }

    fn pull(&self, reference: &ImageReference) -> Result<ImageHash> {
        tracing::info!(image = %reference, "downloading image");
        let fetched = self.fetcher.fetch(reference, &self.config.tar_dir())?;
        tracing::info!(image = %reference, hash = %fetched.hash, "image downloaded");

        let recorded = self.install(&fetched).and_then(|()| {
            let index_path = self.config.tag_index_path();
            let mut index = TagIndex::load(&index_path)?;
            index.insert(&reference.name, &reference.tag, &fetched.hash);
            index.save(&index_path)
        });

        if let Err(e) = std::fs::remove_dir_all(&fetched.dir) {
            tracing::warn!(dir = %fetched.dir.display(), error = %e, "failed to remove downloaded archives");
        }
        recorded?;
        Ok(fetched.hash)
    }

    /// Extracts every layer and copies the manifest and config blob.
    fn install(&self, fetched: &FetchedImage) -> Result<()> {
        let hash = &fetched.hash;
        let manifest_src = fetched.dir.join(MANIFEST_FILE);
        let entry = manifest::read_manifest(&manifest_src)?;

        let image_dir = self.config.image_dir(hash);
        tracing::debug!(dir = %image_dir.display(), "creating image directory");
        create_dir_all(&image_dir)?;

        for (layer, key) in entry.layers.iter().zip(entry.layer_keys(&manifest_src)?) {
            let target = self.config.layer_fs_dir(hash, key);
            let _ = archive::extract_layer(&fetched.dir.join(layer), &target)?;
        }

        copy_file(&manifest_src, &self.config.manifest_path(hash))?;
        copy_file(
            &fetched.dir.join(&entry.config),
            &self.config.image_config_path(hash),
        )?;
        tracing::info!(hash = %hash, layers = entry.layers.len(), "image installed");
        Ok(())
    }

    /// Extracted layer directories of an image in overlay priority order:
    /// the most recently built layer first.
    ///
    /// # Errors
    ///
    /// Returns [`MinidockError::Manifest`] if the persisted manifest is
    /// missing or invalid.
    pub fn layers_for(&self, hash: &ImageHash) -> Result<Vec<PathBuf>> {
        let manifest_path = self.config.manifest_path(hash);
        let entry = manifest::read_manifest(&manifest_path)?;
        let build_order = entry
            .layer_keys(&manifest_path)?
            .into_iter()
            .map(|key| self.config.layer_fs_dir(hash, key));
        Ok(manifest::mount_order(build_order))
    }

    /// Reads the persisted config blob of an image.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is missing or invalid.
    pub fn image_config(&self, hash: &ImageHash) -> Result<ImageConfig> {
        ImageConfig::load(&self.config.image_config_path(hash))
    }
}

/// Takes an exclusive advisory lock, released when the guard drops.
fn lock_index(path: &Path) -> Result<Flock<File>> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| MinidockError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
    Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| MinidockError::Io {
        path: path.to_path_buf(),
        source: errno.into(),
    })
}

fn copy_file(from: &Path, to: &Path) -> Result<()> {
    let _ = std::fs::copy(from, to).map_err(|e| MinidockError::Io {
        path: from.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
