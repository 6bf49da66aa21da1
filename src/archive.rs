//! Packing a directory tree into a single byte blob and back
//!
//! The layout is:
//! - magic: `saltyarc` (8 bytes)
//! - version: 1 byte (currently 1)
//! - entry count: 8 bytes (big-endian u64)
//! - entries, each:
//!   - path length: 4 bytes (big-endian u32)
//!   - path: UTF-8, relative, `/` separated
//!   - data length: 8 bytes (big-endian u64)
//!   - data
//!
//! Entries are written in sorted path order, so packing the same tree twice
//! yields the same bytes. Only regular files are stored; directories are
//! implied by file paths, and symlinks or other special files are skipped.
//!
//! Unpacking parses and validates every entry before touching the
//! destination, so a corrupt or hostile archive writes nothing at all.
//! Entry paths must be unique, and no entry may sit below another entry's
//! path (`a` and `a/b` cannot both be files).

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::file_ops::{self, io_error};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

const MAGIC: &[u8; 8] = b"saltyarc";

const VERSION: u8 = 1;

/// Smallest possible encoded entry: empty path length + data length.
const MIN_ENTRY_LEN: usize = 4 + 8;

/// A file found under a directory root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Path relative to the root, `/` separated.
    pub rel_path: String,
    /// Absolute (or root-joined) path on disk.
    pub path: PathBuf,
}

/// Returns every regular file under `root`, sorted by relative path.
pub fn list(root: &Path) -> Result<Vec<FileEntry>> {
    let mut entries = Vec::new();
    walk(root, "", &mut entries)?;
    entries.sort_by(|a, b| a.rel_path.cmp(&b.rel_path));
    Ok(entries)
}

fn walk(dir: &Path, prefix: &str, out: &mut Vec<FileEntry>) -> Result<()> {
    let read_dir = fs::read_dir(dir).map_err(|e| file_ops::read_error(dir, e))?;
    for dirent in read_dir {
        let dirent = dirent.map_err(|e| file_ops::read_error(dir, e))?;
        let path = dirent.path();
        let name = dirent.file_name().into_string().map_err(|name| {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::Filesystem,
                format!("file name is not valid UTF-8: {}", name.to_string_lossy()),
            )
        })?;
        let rel_path = if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        };

        // file_type() does not follow symlinks.
        let file_type = dirent.file_type().map_err(|e| file_ops::read_error(&path, e))?;
        if file_type.is_dir() {
            walk(&path, &rel_path, out)?;
        } else if file_type.is_file() {
            out.push(FileEntry { rel_path, path });
        } else {
            warn!(path = %rel_path, "skipping symlink or special file");
        }
    }
    Ok(())
}

/// Serializes every regular file under `root` into one archive blob.
pub fn pack(root: &Path) -> Result<Vec<u8>> {
    let files = list(root)?;

    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&(files.len() as u64).to_be_bytes());

    for file in &files {
        // Refuse names that unpack would reject, or the container becomes unopenable.
        sanitize_rel_path(&file.rel_path)
            .map_err(|e| e.with_context(format!("cannot archive {}", file.rel_path)))?;
        let data = fs::read(&file.path).map_err(|e| file_ops::read_error(&file.path, e))?;
        let path_len = u32::try_from(file.rel_path.len()).map_err(|_| {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::Filesystem,
                format!("path too long to archive: {}", file.rel_path),
            )
        })?;
        out.extend_from_slice(&path_len.to_be_bytes());
        out.extend_from_slice(file.rel_path.as_bytes());
        out.extend_from_slice(&(data.len() as u64).to_be_bytes());
        out.extend_from_slice(&data);
    }

    debug!(entries = files.len(), bytes = out.len(), "packed tree");
    Ok(out)
}

/// Recreates the tree stored in `archive` under `dest`.
///
/// `dest` must already exist. Fails with [`ErrorKind::ArchiveCorrupt`] if
/// the blob is malformed or its entries collide, and [`ErrorKind::PathEscape`]
/// if any entry would land outside `dest`; in all cases nothing is written.
pub fn unpack(archive: &[u8], dest: &Path) -> Result<()> {
    let entries = decode(archive)?;
    let resolved = entries
        .iter()
        .map(|(path, data)| Ok((dest.join(sanitize_rel_path(path)?), *data)))
        .collect::<Result<Vec<_>>>()?;
    check_collisions(&entries)?;

    for (path, data) in resolved {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| io_error(format!("failed to create {}", parent.display()), e))?;
        }
        file_ops::write_file_secure(&path, data)?;
    }

    debug!(entries = entries.len(), dest = %dest.display(), "unpacked tree");
    Ok(())
}

/// Parses an archive into `(path, data)` pairs without validating paths.
fn decode(archive: &[u8]) -> Result<Vec<(&str, &[u8])>> {
    let mut input = archive;

    if take(&mut input, MAGIC.len(), "magic")? != MAGIC {
        return Err(corrupt("not an archive: bad magic"));
    }
    let version = take(&mut input, 1, "version")?[0];
    if version != VERSION {
        return Err(corrupt(format!("unsupported archive version {version}")));
    }
    let count = read_u64(&mut input, "entry count")?;

    // Cap the preallocation by what the remaining input could possibly hold.
    let capacity = usize::try_from(count)
        .unwrap_or(usize::MAX)
        .min(input.len() / MIN_ENTRY_LEN);
    let mut entries = Vec::with_capacity(capacity);

    for _ in 0..count {
        let path_len = u32::from_be_bytes(array(take(&mut input, 4, "path length")?)?);
        let path_bytes = take(&mut input, path_len as usize, "path")?;
        let path = std::str::from_utf8(path_bytes)
            .map_err(|_| corrupt("archive entry path is not valid UTF-8"))?;
        let data_len = read_u64(&mut input, "data length")?;
        let data_len =
            usize::try_from(data_len).map_err(|_| corrupt("archive entry length too large"))?;
        let data = take(&mut input, data_len, "entry data")?;
        entries.push((path, data));
    }

    if !input.is_empty() {
        return Err(corrupt("unexpected data after last archive entry"));
    }
    Ok(entries)
}

/// Rejects duplicate paths and files whose path is a directory of another entry.
///
/// Paths must already be sanitized, so `/` is the only separator.
fn check_collisions(entries: &[(&str, &[u8])]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for (path, _) in entries {
        if !seen.insert(*path) {
            return Err(corrupt(format!("duplicate archive entry {path:?}")));
        }
    }
    for path in &seen {
        for (i, _) in path.match_indices('/') {
            let parent = &path[..i];
            if seen.contains(parent) {
                return Err(corrupt(format!(
                    "archive entry {path:?} lies below file entry {parent:?}"
                )));
            }
        }
    }
    Ok(())
}

/// Validates a `/` separated relative path and converts it to a `PathBuf`.
///
/// Rejects anything that could resolve outside the directory it is joined
/// onto: absolute paths, `..`, and also `.`, empty components, backslashes
/// and NUL bytes.
pub fn sanitize_rel_path(rel_path: &str) -> Result<PathBuf> {
    let escape = || {
        VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::PathEscape,
            format!("path escapes its root: {rel_path:?}"),
        )
    };

    if rel_path.is_empty() || rel_path.contains(['\\', '\0']) {
        return Err(escape());
    }

    let mut out = PathBuf::new();
    for part in rel_path.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(escape());
        }
        out.push(part);
    }

    // Catches platform-specific prefixes such as `C:` on Windows.
    if !out.components().all(|c| matches!(c, Component::Normal(_))) {
        return Err(escape());
    }
    Ok(out)
}

fn take<'a>(input: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8]> {
    if input.len() < n {
        return Err(corrupt(format!("archive truncated while reading {what}")));
    }
    let (head, rest) = input.split_at(n);
    *input = rest;
    Ok(head)
}

fn read_u64(input: &mut &[u8], what: &str) -> Result<u64> {
    Ok(u64::from_be_bytes(array(take(input, 8, what)?)?))
}

fn array<const N: usize>(bytes: &[u8]) -> Result<[u8; N]> {
    bytes.try_into().map_err(|_| {
        VaultError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "archive field has wrong width",
        )
    })
}

fn corrupt(msg: impl Into<String>) -> VaultError {
    VaultError::with_kind(ErrorCategory::User, ErrorKind::ArchiveCorrupt, msg)
}

/// Encodes raw entries without any path validation, for building hostile archives in tests.
#[cfg(test)]
pub(crate) fn encode_unchecked(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&(entries.len() as u64).to_be_bytes());
    for (path, data) in entries {
        out.extend_from_slice(&(path.len() as u32).to_be_bytes());
        out.extend_from_slice(path.as_bytes());
        out.extend_from_slice(&(data.len() as u64).to_be_bytes());
        out.extend_from_slice(data);
    }
    out
}
