//! Filesystem helpers shared by the archive packer and the container
//!
//! Plaintext and container files are created with mode 0o600 on Unix.
//! Container files are only ever replaced atomically (tempfile + fsync +
//! rename), so a failed or interrupted write leaves the previous container
//! in place.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Write file with secure permissions (0o600 on Unix), truncating any existing file.
pub fn write_file_secure(path: &Path, contents: &[u8]) -> Result<()> {
    #[cfg(unix)]
    let file = {
        use std::fs::OpenOptions;
        use std::os::unix::fs::OpenOptionsExt;

        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
    };
    #[cfg(not(unix))]
    let file = fs::File::create(path);

    let mut file = file.map_err(|e| io_error(format!("failed to open {}", path.display()), e))?;
    file.write_all(contents)
        .map_err(|e| io_error(format!("failed to write {}", path.display()), e))
}

/// Atomically replace `path` with `contents`.
pub fn replace_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_file = stage(path, contents)?;
    temp_file.persist(path).map_err(|e| {
        io_error(
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

/// Atomically create `path` with `contents`, failing if it already exists.
pub fn create_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_file = stage(path, contents)?;
    temp_file.persist_noclobber(path).map_err(|e| {
        if e.error.kind() == io::ErrorKind::AlreadyExists {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::ContainerExists,
                format!("container already exists at {}", path.display()),
            )
        } else {
            io_error(format!("failed to create {}", path.display()), e)
        }
    })?;
    Ok(())
}

/// Writes `contents` to a synced tempfile next to `path`, ready to be renamed over it.
fn stage(path: &Path, contents: &[u8]) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::Builder::new()
        .prefix(".saltyvault-")
        .tempfile_in(dir)
        .map_err(|e| io_error("failed to create tempfile", e))?;

    temp_file
        .write_all(contents)
        .map_err(|e| io_error("failed to write to tempfile", e))?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file
        .flush()
        .map_err(|e| io_error("failed to flush tempfile", e))?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|e| io_error("failed to sync file prior to rename", e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        temp_file
            .as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))
            .map_err(|e| io_error("failed to set tempfile permissions", e))?;
    }

    Ok(temp_file)
}

pub fn read_error(path: &Path, err: io::Error) -> VaultError {
    let category = if err.kind() == io::ErrorKind::NotFound {
        ErrorCategory::User
    } else {
        ErrorCategory::Internal
    };
    VaultError::with_kind_and_source(
        category,
        ErrorKind::Filesystem,
        format!("failed to read from {}", path.display()),
        err,
    )
}

pub fn io_error(
    msg: impl Into<String>,
    err: impl std::error::Error + Send + Sync + 'static,
) -> VaultError {
    VaultError::with_kind_and_source(ErrorCategory::Internal, ErrorKind::Filesystem, msg, err)
}
