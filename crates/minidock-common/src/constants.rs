//! System-wide constants and default paths.

/// Default root directory for all minidock state.
pub const DEFAULT_ROOT: &str = "/var/lib/minidock";

/// Environment variable that overrides the root directory.
pub const ROOT_ENV: &str = "MINIDOCK_ROOT";

/// Scratch directory for downloaded archives, relative to the root.
pub const TAR_DIR: &str = "tar";

/// Extracted images and the tag index, relative to the root.
pub const IMAGES_DIR: &str = "images";

/// Per-container working trees, relative to the root.
pub const CONTAINERS_DIR: &str = "containers";

/// File name of the image tag index inside the images directory.
pub const TAG_INDEX_FILE: &str = "images.json";

/// Lock file serializing pulls inside the images directory.
pub const TAG_INDEX_LOCK: &str = "images.lock";

/// File name of the legacy image manifest.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Tag assumed when an image reference omits one.
pub const DEFAULT_TAG: &str = "latest";

/// Number of leading characters of a layer name used as its directory key.
pub const LAYER_KEY_LEN: usize = 12;

/// Number of random bytes in a container ID.
pub const CONTAINER_ID_BYTES: usize = 6;

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Path used by the parent to re-execute itself as the container child.
pub const SELF_EXE: &str = "/proc/self/exe";

/// Sub-command name of the internal re-exec entry point.
pub const CHILD_SUBCOMMAND: &str = "child";

/// Application name used in log output and the user agent.
pub const APP_NAME: &str = "minidock";
