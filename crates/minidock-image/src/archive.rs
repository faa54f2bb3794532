//! Layer tarball extraction.
//!
//! Layers are unpacked entry by entry rather than with `Archive::unpack`
//! because the store needs overwrite-if-absent semantics: an entry whose
//! destination already exists is skipped, never replaced and never an
//! error. Hard links are collected and created after every other entry, since
//! their target must already exist on disk.
//!
//! Every path is resolved against the extraction root before anything is
//! written. A symlink met on the way must point back inside the root, so a
//! layer shipping `var/run -> /run` cannot place files on the host.

use std::fs::{OpenOptions, Permissions};
use std::io::{self, BufRead, BufReader, Read};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use minidock_common::error::{MinidockError, Result};
use tar::EntryType;

/// Leading bytes of a gzip stream.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Options controlling how entries are materialized.
#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    /// Apply the uid/gid recorded in the archive. Only meaningful as root.
    pub preserve_ownership: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            preserve_ownership: minidock_core::privilege::is_privileged(),
        }
    }
}

/// Counters describing one extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Entries materialized on disk, hard links included.
    pub extracted: usize,
    /// Entries skipped because their destination already existed.
    pub skipped: usize,
    /// Entries of unsupported types that were ignored.
    pub unsupported: usize,
}

/// Extracts a layer tarball into `target` with default options.
///
/// Both plain and gzip-compressed archives are accepted; compression is
/// detected from the stream's magic bytes.
///
/// # Errors
///
/// Returns [`MinidockError::Archive`] if the archive is corrupt or an entry
/// cannot be written. Entries written before the failure stay on disk.
pub fn extract_layer(archive_path: &Path, target: &Path) -> Result<ExtractSummary> {
    extract_layer_with(archive_path, target, ExtractOptions::default())
}

/// Extracts a layer tarball into `target`.
///
/// # Errors
///
/// See [`extract_layer`].
pub fn extract_layer_with(
    archive_path: &Path,
    target: &Path,
    options: ExtractOptions,
) -> Result<ExtractSummary> {
    tracing::info!(
        archive = %archive_path.display(),
        target = %target.display(),
        "extracting layer"
    );
    let fail = |message: String| MinidockError::Archive {
        path: archive_path.to_path_buf(),
        message,
    };

    std::fs::create_dir_all(target).map_err(|e| MinidockError::Io {
        path: target.to_path_buf(),
        source: e,
    })?;
    let root = target.canonicalize().map_err(|e| MinidockError::Io {
        path: target.to_path_buf(),
        source: e,
    })?;
    let reader = open_archive(archive_path)?;
    let mut archive = tar::Archive::new(reader);

    let mut summary = ExtractSummary::default();
    let mut hard_links: Vec<(PathBuf, PathBuf)> = Vec::new();

    for entry in archive
        .entries()
        .map_err(|e| fail(format!("reading entries: {e}")))?
    {
        let mut entry = entry.map_err(|e| fail(format!("reading entry: {e}")))?;
        let raw_path = entry
            .path()
            .map_err(|e| fail(format!("entry path: {e}")))?
            .into_owned();
        let relative = contained_path(&raw_path)
            .ok_or_else(|| fail(format!("entry escapes target: {}", raw_path.display())))?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let dest = root.join(&relative);

        let header = entry.header();
        let entry_type = header.entry_type();
        let owner = header
            .uid()
            .ok()
            .zip(header.gid().ok())
            .and_then(|(uid, gid)| Some((u32::try_from(uid).ok()?, u32::try_from(gid).ok()?)));
        let mode = header.mode().ok().map(|m| m & 0o7777);

        let created = match entry_type {
            EntryType::Directory => {
                ensure_dirs(&root, &relative)
                    .map_err(|e| fail(format!("mkdir {}: {e}", dest.display())))?;
                apply_metadata(&dest, mode.or(Some(0o755)), owner, options)
                    .map_err(|e| fail(format!("metadata {}: {e}", dest.display())))?;
                true
            }
            EntryType::Regular | EntryType::Continuous => {
                ensure_parent(&root, &relative)
                    .map_err(|e| fail(format!("mkdir {}: {e}", dest.display())))?;
                let created = write_regular(&mut entry, &dest, mode.unwrap_or(0o644))
                    .map_err(|e| fail(format!("write {}: {e}", dest.display())))?;
                if created {
                    apply_metadata(&dest, mode, owner, options)
                        .map_err(|e| fail(format!("metadata {}: {e}", dest.display())))?;
                }
                created
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(|e| fail(format!("link name: {e}")))?
                    .ok_or_else(|| fail(format!("symlink without target: {}", dest.display())))?
                    .into_owned();
                ensure_parent(&root, &relative)
                    .map_err(|e| fail(format!("mkdir {}: {e}", dest.display())))?;
                let created = create_symlink(&link, &dest)
                    .map_err(|e| fail(format!("symlink {}: {e}", dest.display())))?;
                if created {
                    apply_metadata(&dest, None, owner, options)
                        .map_err(|e| fail(format!("metadata {}: {e}", dest.display())))?;
                }
                created
            }
            EntryType::Link => {
                let link = entry
                    .link_name()
                    .map_err(|e| fail(format!("link name: {e}")))?
                    .ok_or_else(|| fail(format!("hard link without target: {}", dest.display())))?
                    .into_owned();
                let source = contained_path(&link)
                    .ok_or_else(|| fail(format!("hard link escapes target: {}", link.display())))?;
                hard_links.push((relative, source));
                continue;
            }
            other => {
                tracing::warn!(path = %raw_path.display(), entry_type = ?other, "unsupported entry type skipped");
                summary.unsupported += 1;
                continue;
            }
        };
        if created {
            summary.extracted += 1;
        } else {
            summary.skipped += 1;
        }
    }

    for (relative, source_relative) in hard_links {
        let link = root.join(&relative);
        let source = root.join(&source_relative);
        ensure_parent(&root, &relative)
            .map_err(|e| fail(format!("mkdir {}: {e}", link.display())))?;
        check_parent(&root, &source_relative)
            .map_err(|e| fail(format!("hard link source {}: {e}", source.display())))?;
        match std::fs::hard_link(&source, &link) {
            Ok(()) => summary.extracted += 1,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => summary.skipped += 1,
            Err(e) => {
                return Err(fail(format!(
                    "hard link {} -> {}: {e}",
                    link.display(),
                    source.display()
                )));
            }
        }
    }

    tracing::info!(
        extracted = summary.extracted,
        skipped = summary.skipped,
        unsupported = summary.unsupported,
        "layer extracted"
    );
    Ok(summary)
}

/// Opens an archive, transparently decompressing gzip streams.
fn open_archive(path: &Path) -> Result<Box<dyn Read>> {
    let io_err = |e| MinidockError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let file = std::fs::File::open(path).map_err(io_err)?;
    let mut reader = BufReader::new(file);
    if is_gzip_stream(reader.fill_buf().map_err(io_err)?) {
        Ok(Box::new(flate2::read::GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

/// Determines whether a stream is gzip-compressed from its first bytes.
fn is_gzip_stream(head: &[u8]) -> bool {
    head.starts_with(&GZIP_MAGIC)
}

/// Normalizes an entry path relative to the extraction root.
///
/// Leading `/` and `.` components are dropped. Returns `None` for paths that
/// would climb out of the root.
fn contained_path(path: &Path) -> Option<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::RootDir | Component::CurDir => {}
            Component::ParentDir | Component::Prefix(_) => return None,
        }
    }
    Some(clean)
}

/// Creates the directories of `relative` under `root` one component at a
/// time.
///
/// Existing symlinks are followed only when they resolve to a directory
/// inside `root`.
fn ensure_dirs(root: &Path, relative: &Path) -> io::Result<()> {
    let mut current = root.to_path_buf();
    for part in relative.components() {
        current.push(part);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.is_dir() => {}
            Ok(meta) if meta.file_type().is_symlink() => {
                let resolved = current.canonicalize()?;
                if !resolved.starts_with(root) {
                    return Err(escapes_root(&current, &resolved));
                }
                if !resolved.is_dir() {
                    return Err(not_a_directory(&current));
                }
            }
            Ok(_) => return Err(not_a_directory(&current)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => std::fs::create_dir(&current)?,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Creates the parent directories of `relative` under `root`.
fn ensure_parent(root: &Path, relative: &Path) -> io::Result<()> {
    relative
        .parent()
        .map_or(Ok(()), |parent| ensure_dirs(root, parent))
}

/// Fails unless the parent of `relative` resolves inside `root`.
fn check_parent(root: &Path, relative: &Path) -> io::Result<()> {
    let parent = root.join(relative.parent().unwrap_or_else(|| Path::new("")));
    let resolved = parent.canonicalize()?;
    if resolved.starts_with(root) {
        Ok(())
    } else {
        Err(escapes_root(&parent, &resolved))
    }
}

fn escapes_root(path: &Path, resolved: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!(
            "{} resolves to {}, outside the extraction root",
            path.display(),
            resolved.display()
        ),
    )
}

fn not_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotADirectory,
        format!("{} is not a directory", path.display()),
    )
}

/// Writes a regular file unless something already exists at `dest`.
///
/// Returns whether the file was created.
fn write_regular(entry: &mut impl Read, dest: &Path, mode: u32) -> io::Result<bool> {
    let mut file = match OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(mode)
        .open(dest)
    {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            tracing::debug!(path = %dest.display(), "file exists, left untouched");
            return Ok(false);
        }
        Err(e) => return Err(e),
    };
    let _ = io::copy(entry, &mut file)?;
    Ok(true)
}

/// Creates a symbolic link unless something already exists at `dest`.
fn create_symlink(link: &Path, dest: &Path) -> io::Result<bool> {
    match std::os::unix::fs::symlink(link, dest) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Applies ownership, then permissions. Ownership goes first because
/// `chown(2)` clears set-id bits.
fn apply_metadata(
    dest: &Path,
    mode: Option<u32>,
    owner: Option<(u32, u32)>,
    options: ExtractOptions,
) -> io::Result<()> {
    if options.preserve_ownership {
        if let Some((uid, gid)) = owner {
            std::os::unix::fs::lchown(dest, Some(uid), Some(gid))?;
        }
    }
    if let Some(mode) = mode {
        std::fs::set_permissions(dest, Permissions::from_mode(mode))?;
    }
    Ok(())
}
