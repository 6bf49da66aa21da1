//! Container lifecycle: create, mount, save, unmount and add-file
//!
//! A [`Container`] is a handle on one encrypted container file. Mounting
//! decrypts it into a fresh private working tree that the caller edits
//! directly; saving packs that tree and atomically replaces the container
//! file; unmounting deletes the tree. Each handle owns at most one working
//! tree, and several handles may be open at once.
//!
//! The working tree is a [`tempfile::TempDir`], so it is deleted when the
//! handle is unmounted or dropped, on every exit path.

use crate::archive;
use crate::cipher::{Cipher, SecretboxCipher};
use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crate::file_ops::{self, io_error};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Prefix for working tree directory names.
const WORK_TREE_PREFIX: &str = "saltyvault-";

/// Shown for every decrypt or archive failure during mount. It must not
/// reveal which of the two steps failed.
const UNLOCK_FAILED: &str = "unable to unlock container: wrong passphrase or corrupt container";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unmounted,
    Mounted,
}

/// The decrypted, editable copy of a container's contents.
#[derive(Debug)]
pub struct WorkingTree {
    dir: TempDir,
}

impl WorkingTree {
    fn allocate(work_root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORK_TREE_PREFIX);
        // TempDir creates the directory with mode 0o700 on Unix.
        let dir = match work_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(|e| io_error("failed to create working tree", e))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn remove(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(tree = %path.display(), "removed working tree"),
            Err(e) => warn!(tree = %path.display(), error = %e, "failed to remove working tree"),
        }
    }
}

/// Handle on one container file and its (optional) mounted working tree.
pub struct Container {
    path: PathBuf,
    cipher: Box<dyn Cipher>,
    work_root: Option<PathBuf>,
    tree: Option<WorkingTree>,
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("work_root", &self.work_root)
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

impl Container {
    /// Opens a handle on `path` without touching the filesystem.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cipher: Box::new(SecretboxCipher),
            work_root: None,
            tree: None,
        }
    }

    /// Creates a new empty container at `path` and returns an unmounted handle on it.
    pub fn create(path: impl Into<PathBuf>, key: &[u8]) -> Result<Self> {
        let container = Self::open(path);
        container.create_empty(key)?;
        Ok(container)
    }

    /// Replaces the cipher used to seal and open the container file.
    pub fn with_cipher(mut self, cipher: Box<dyn Cipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Allocates working trees under `dir` instead of the system temp directory.
    pub fn with_work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_root = Some(dir.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> SessionState {
        if self.tree.is_some() {
            SessionState::Mounted
        } else {
            SessionState::Unmounted
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.tree.is_some()
    }

    /// The working tree root, if mounted.
    pub fn mount_path(&self) -> Option<&Path> {
        self.tree.as_ref().map(WorkingTree::path)
    }

    /// Writes a new container holding an empty tree.
    ///
    /// Fails with [`ErrorKind::ContainerExists`] if anything already exists at the path.
    pub fn create_empty(&self, key: &[u8]) -> Result<()> {
        if fs::symlink_metadata(&self.path).is_ok() {
            return Err(self.exists_error());
        }

        let empty = TempDir::new().map_err(|e| io_error("failed to create empty tree", e))?;
        let archive = archive::pack(empty.path())?;
        let armored = self.seal(&archive, key)?;
        file_ops::create_atomic(&self.path, armored.as_bytes())?;

        info!(container = %self.path.display(), "created empty container");
        Ok(())
    }

    /// Decrypts the container into a new working tree and returns its root.
    ///
    /// On failure no working tree is left behind and the handle stays unmounted.
    /// Wrong passphrases and corrupt containers both fail with [`ErrorKind::Unlock`].
    pub fn mount(&mut self, key: &[u8]) -> Result<&Path> {
        if self.tree.is_some() {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::AlreadyMounted,
                format!("container {} is already mounted", self.path.display()),
            ));
        }

        let armored = self.read_container()?;
        let archive = self.cipher.decrypt(&armored, key).map_err(|e| {
            debug!(error = %e, "decrypt failed");
            unlock_error()
        })?;

        // Dropping `tree` on any early return below deletes it.
        let tree = WorkingTree::allocate(self.work_root.as_deref())?;
        archive::unpack(&archive, tree.path()).map_err(|e| match e.kind {
            Some(ErrorKind::ArchiveCorrupt | ErrorKind::PathEscape) => {
                debug!(error = %e, "unpack failed");
                unlock_error()
            }
            _ => e.with_context("failed to unpack container"),
        })?;

        info!(
            container = %self.path.display(),
            tree = %tree.path().display(),
            "mounted container"
        );
        Ok(self.tree.insert(tree).path())
    }

    /// Sorted `/` separated paths of every file in the working tree.
    pub fn list_files(&self) -> Result<Vec<String>> {
        let tree = self.mounted_tree()?;
        Ok(archive::list(tree.path())?
            .into_iter()
            .map(|entry| entry.rel_path)
            .collect())
    }

    /// Packs the working tree and atomically replaces the container file.
    pub fn save(&self, key: &[u8]) -> Result<()> {
        let tree = self.mounted_tree()?;
        let archive = archive::pack(tree.path())
            .map_err(|e| e.with_context("failed to pack working tree"))?;
        let armored = self.seal(&archive, key)?;
        file_ops::replace_atomic(&self.path, armored.as_bytes())
            .map_err(|e| e.with_context(format!("failed to write {}", self.path.display())))?;

        info!(container = %self.path.display(), "saved container");
        Ok(())
    }

    /// Deletes the working tree. A no-op when not mounted.
    ///
    /// Never fails; a tree that cannot be fully removed is logged.
    pub fn unmount(&mut self) {
        if let Some(tree) = self.tree.take() {
            tree.remove();
            info!(container = %self.path.display(), "unmounted container");
        }
    }

    /// Copies `source` into the container and saves it.
    ///
    /// The file lands at `target` (a `/` separated path relative to the tree
    /// root), or at the source's file name. If the handle was not mounted it
    /// is mounted for the duration of the call and always unmounted again,
    /// whether or not the copy and save succeed.
    pub fn add_file(&mut self, source: &Path, key: &[u8], target: Option<&str>) -> Result<()> {
        if !source.is_file() {
            return Err(VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::SourceNotFound,
                format!("file not found: {}", source.display()),
            ));
        }
        let rel_path = match target {
            Some(target) => archive::sanitize_rel_path(target)?,
            None => source
                .file_name()
                .map(PathBuf::from)
                .ok_or_else(|| {
                    VaultError::with_kind(
                        ErrorCategory::User,
                        ErrorKind::SourceNotFound,
                        format!("source has no file name: {}", source.display()),
                    )
                })?,
        };

        let was_mounted = self.is_mounted();
        if !was_mounted {
            self.mount(key)?;
        }

        let result = self.copy_and_save(source, &rel_path, key);

        if !was_mounted {
            self.unmount();
        }
        result
    }

    fn copy_and_save(&self, source: &Path, rel_path: &Path, key: &[u8]) -> Result<()> {
        let dest = self.mounted_tree()?.path().join(rel_path);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| io_error(format!("failed to create {}", parent.display()), e))?;
        }
        let data = fs::read(source).map_err(|e| file_ops::read_error(source, e))?;
        file_ops::write_file_secure(&dest, &data)?;
        debug!(file = %rel_path.display(), "copied file into working tree");

        self.save(key)
    }

    fn mounted_tree(&self) -> Result<&WorkingTree> {
        self.tree.as_ref().ok_or_else(|| {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::NotMounted,
                format!("container {} is not mounted", self.path.display()),
            )
        })
    }

    fn read_container(&self) -> Result<String> {
        let bytes = fs::read(&self.path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                VaultError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::ContainerNotFound,
                    format!("container not found at {}", self.path.display()),
                )
            } else {
                file_ops::read_error(&self.path, e)
            }
        })?;
        // The armor is ASCII, so anything else is just a corrupt container.
        String::from_utf8(bytes).map_err(|_| unlock_error())
    }

    fn seal(&self, archive: &[u8], key: &[u8]) -> Result<String> {
        self.cipher.encrypt(archive, key).map_err(|e| {
            debug!(error = %e, "encrypt failed");
            VaultError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::Filesystem,
                "failed to encrypt container",
            )
        })
    }

    fn exists_error(&self) -> VaultError {
        VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::ContainerExists,
            format!("container already exists at {}", self.path.display()),
        )
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn unlock_error() -> VaultError {
    VaultError::with_kind(ErrorCategory::User, ErrorKind::Unlock, UNLOCK_FAILED)
}
