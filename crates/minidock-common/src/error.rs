//! Unified error types for the minidock workspace.
//!
//! Variants are grouped by the stage that raises them so callers can decide
//! per call site whether a failure is fatal or merely logged.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum MinidockError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value or argument is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Retrieving an image from its source failed.
    #[error("failed to fetch {reference}: {message}")]
    Fetch {
        /// Reference being fetched (`name:tag`).
        reference: String,
        /// Description of the failure.
        message: String,
    },

    /// A downloaded blob did not match its advertised digest.
    #[error("hash mismatch for {resource}: expected {expected}, got {actual}")]
    HashMismatch {
        /// Resource that failed validation.
        resource: String,
        /// Expected hash value.
        expected: String,
        /// Actual computed hash value.
        actual: String,
    },

    /// A layer archive is corrupt or could not be unpacked.
    #[error("archive error in {path}: {message}")]
    Archive {
        /// Archive being extracted.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// An image manifest is unreadable or structurally invalid.
    #[error("invalid manifest {path}: {message}")]
    Manifest {
        /// Manifest file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// A mount or unmount operation failed.
    #[error("mount error at {target}: {message}")]
    Mount {
        /// Mount point involved.
        target: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Namespace creation, hostname, root change, or process handoff failed.
    #[error("isolation error: {message}")]
    Isolation {
        /// Description of the failure.
        message: String,
    },

    /// A permission or privilege error.
    #[error("permission denied: {message}")]
    PermissionDenied {
        /// Description of the denied operation.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, MinidockError>;
