//! Saltyvault - passphrase-encrypted single-file containers for directory trees
//!
//! A container is one text file holding an encrypted archive of a directory
//! tree. [`container::Container`] mounts it into a private temporary working
//! tree for editing and seals the tree back into the file on save.

#![forbid(unsafe_code)]

pub mod archive;
pub mod cipher;
pub mod container;
pub mod error;
pub mod file_ops;
pub mod passphrase;
pub mod secretcrypt;
pub mod shell;
pub mod varmor;

pub use container::{Container, SessionState};
pub use error::{ErrorCategory, ErrorKind, Result, VaultError};
