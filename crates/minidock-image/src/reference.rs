//! Human-readable image references.

use std::fmt;

use minidock_common::constants::DEFAULT_TAG;
use minidock_common::error::{MinidockError, Result};

/// An image name plus tag, e.g. `busybox:latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageReference {
    /// Repository name, e.g. `busybox` or `ghcr.io/org/app`.
    pub name: String,
    /// Tag, `latest` when the reference carries none.
    pub tag: String,
}

impl ImageReference {
    /// Parses `name[:tag]`.
    ///
    /// The tag separator is the last `:` that is not part of a registry
    /// host (`localhost:5000/app` has no tag).
    ///
    /// # Errors
    ///
    /// Returns [`MinidockError::Config`] for empty names or tags and for
    /// digest references, which the tag index cannot key.
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.contains('@') {
            return Err(MinidockError::Config {
                message: format!("digest references are not supported: {reference}"),
            });
        }

        let (name, tag) = match reference.rsplit_once(':') {
            Some((name, tag)) if !tag.contains('/') => (name, tag),
            _ => (reference, DEFAULT_TAG),
        };
        if name.is_empty() || tag.is_empty() {
            return Err(MinidockError::Config {
                message: format!("invalid image reference: {reference:?}"),
            });
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}
