//! Domain primitive types used across the minidock workspace.

use std::fmt::{self, Write as _};

use serde::{Deserialize, Serialize};

use crate::constants::CONTAINER_ID_BYTES;

/// Unique identifier for a container instance: 6 random bytes, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a container ID from an existing string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random container ID.
    #[must_use]
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let mut id = String::with_capacity(CONTAINER_ID_BYTES * 2);
        for byte in &uuid.as_bytes()[..CONTAINER_ID_BYTES] {
            let _ = write!(id, "{byte:02x}");
        }
        Self(id)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content hash of an image: the hex digest of its config blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageHash(String);

impl ImageHash {
    /// Creates an image hash from a hex string.
    #[must_use]
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Returns the hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional virtual filesystems mounted inside a container in addition to
/// `/proc` and `/sys`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraMounts {
    /// Mount a tmpfs at `/dev` with a devpts instance at `/dev/pts`.
    pub dev: bool,
    /// Mount a tmpfs at `/tmp`.
    pub tmp: bool,
}
