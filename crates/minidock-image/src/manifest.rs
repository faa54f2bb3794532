//! Image manifests and configuration blobs.
//!
//! The store keeps images in the legacy `docker save` layout: a
//! `manifest.json` holding a single-entry array that names the config blob
//! and the layer tarballs in build order (earliest first).

use std::path::{Path, PathBuf};

use minidock_common::constants::LAYER_KEY_LEN;
use minidock_common::error::{MinidockError, Result};
use serde::{Deserialize, Serialize};

/// The single entry of a legacy `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ManifestEntry {
    /// File name of the config blob, relative to the manifest.
    pub config: String,
    /// Tags this image was saved under.
    #[serde(default)]
    pub repo_tags: Vec<String>,
    /// Layer tarballs in build order.
    pub layers: Vec<String>,
}

impl ManifestEntry {
    /// Directory keys of the layers, in build order.
    ///
    /// # Errors
    ///
    /// Returns [`MinidockError::Manifest`] if a layer name is shorter than
    /// the key length.
    pub fn layer_keys(&self, path: &Path) -> Result<Vec<&str>> {
        self.layers
            .iter()
            .map(|layer| {
                layer_key(layer).ok_or_else(|| MinidockError::Manifest {
                    path: path.to_path_buf(),
                    message: format!("layer name too short: {layer:?}"),
                })
            })
            .collect()
    }
}

/// First [`LAYER_KEY_LEN`] characters of a layer name.
#[must_use]
pub fn layer_key(layer: &str) -> Option<&str> {
    layer.get(..LAYER_KEY_LEN)
}

/// Reads a manifest and returns its only entry.
///
/// # Errors
///
/// Returns [`MinidockError::Manifest`] if the file is unreadable, is not
/// valid JSON, holds zero or several entries, or lists no layers.
pub fn read_manifest(path: &Path) -> Result<ManifestEntry> {
    let invalid = |message: String| MinidockError::Manifest {
        path: path.to_path_buf(),
        message,
    };
    let data = std::fs::read(path).map_err(|e| invalid(format!("read failed: {e}")))?;
    let mut entries: Vec<ManifestEntry> =
        serde_json::from_slice(&data).map_err(|e| invalid(format!("parse failed: {e}")))?;

    if entries.len() != 1 {
        return Err(invalid(format!(
            "expected exactly one image entry, found {}",
            entries.len()
        )));
    }
    let entry = entries.remove(0);
    if entry.layers.is_empty() {
        return Err(invalid("image has no layers".into()));
    }
    Ok(entry)
}

/// Writes a single-entry manifest.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn write_manifest(path: &Path, entry: &ManifestEntry) -> Result<()> {
    let json = serde_json::to_vec(&[entry])?;
    std::fs::write(path, json).map_err(|e| MinidockError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Orders layer directories for an overlay `lowerdir` list.
///
/// Manifests list layers earliest first, while overlayfs gives the first
/// `lowerdir` entry the highest priority. Each layer is therefore prepended,
/// so `[L1, L2, L3]` becomes `[L3, L2, L1]` and later layers shadow earlier
/// ones.
pub fn mount_order<I>(build_order: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut ordered = Vec::new();
    for path in build_order {
        ordered.insert(0, path);
    }
    ordered
}

/// Configuration blob of an image (`<hash>.json`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ImageConfig {
    /// Runtime defaults.
    #[serde(default)]
    pub config: Option<RuntimeConfig>,
}

/// The `config` object of an image configuration blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RuntimeConfig {
    /// `KEY=value` environment entries.
    #[serde(rename = "Env", default)]
    pub env: Option<Vec<String>>,
    /// Default command.
    #[serde(rename = "Cmd", default)]
    pub cmd: Option<Vec<String>>,
}

impl ImageConfig {
    /// Reads a config blob from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or is not valid JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| MinidockError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Environment entries as `KEY=value` strings.
    #[must_use]
    pub fn env(&self) -> &[String] {
        self.config
            .as_ref()
            .and_then(|c| c.env.as_deref())
            .unwrap_or_default()
    }

    /// Environment entries split into key/value pairs.
    ///
    /// An entry without `=` maps to an empty value.
    #[must_use]
    pub fn env_pairs(&self) -> Vec<(String, String)> {
        self.env()
            .iter()
            .map(|entry| {
                let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
                (key.to_string(), value.to_string())
            })
            .collect()
    }

    /// Default command of the image.
    #[must_use]
    pub fn cmd(&self) -> &[String] {
        self.config
            .as_ref()
            .and_then(|c| c.cmd.as_deref())
            .unwrap_or_default()
    }
}
