//! Persisted image tag index.
//!
//! `images/images.json` maps an image name to a map of tag to content hash:
//! `{"busybox": {"latest": "<hash>"}}`.

use std::collections::BTreeMap;
use std::path::Path;

use minidock_common::error::{MinidockError, Result};
use minidock_common::types::ImageHash;
use serde::{Deserialize, Serialize};

/// In-memory copy of the tag index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagIndex {
    images: BTreeMap<String, BTreeMap<String, String>>,
}

impl TagIndex {
    /// Loads the index, treating a missing file as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path).map_err(|e| MinidockError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Persists the index atomically via a temporary file and rename.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| MinidockError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, path).map_err(|e| MinidockError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "tag index saved");
        Ok(())
    }

    /// Looks up the hash recorded for `(name, tag)`.
    #[must_use]
    pub fn get(&self, name: &str, tag: &str) -> Option<ImageHash> {
        self.images
            .get(name)
            .and_then(|tags| tags.get(tag))
            .map(ImageHash::new)
    }

    /// Records `(name, tag) -> hash`, replacing any previous mapping.
    pub fn insert(&mut self, name: &str, tag: &str, hash: &ImageHash) {
        let _ = self
            .images
            .entry(name.to_string())
            .or_default()
            .insert(tag.to_string(), hash.as_str().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_loads_empty_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = TagIndex::load(&dir.path().join("images.json")).expect("load");
        assert_eq!(index, TagIndex::default());
    }

    #[test]
    fn save_and_load_preserve_mappings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("images.json");
        let mut index = TagIndex::default();
        index.insert("busybox", "latest", &ImageHash::new("h1"));
        index.insert("busybox", "1.36", &ImageHash::new("h2"));
        index.insert("alpine", "latest", &ImageHash::new("h3"));
        index.save(&path).expect("save");

        let loaded = TagIndex::load(&path).expect("load");
        assert_eq!(loaded.get("busybox", "latest"), Some(ImageHash::new("h1")));
        assert_eq!(loaded.get("busybox", "1.36"), Some(ImageHash::new("h2")));
        assert_eq!(loaded.get("alpine", "edge"), None);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn on_disk_format_is_nested_object() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("images.json");
        let mut index = TagIndex::default();
        index.insert("busybox", "latest", &ImageHash::new("abc"));
        index.save(&path).expect("save");

        let value: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).expect("read")).expect("json");
        assert_eq!(value["busybox"]["latest"], "abc");
    }

    #[test]
    fn insert_replaces_existing_tag() {
        let mut index = TagIndex::default();
        index.insert("app", "v1", &ImageHash::new("old"));
        index.insert("app", "v1", &ImageHash::new("new"));
        assert_eq!(index.get("app", "v1"), Some(ImageHash::new("new")));
    }
}
