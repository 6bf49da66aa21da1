use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// In particular this means that use of Internal is never a guarantee
    /// the error is not, for example due to a user error - merely that it
    /// cannot be confidently determined by the code.
    Internal,

    /// The user provided invalid input or performed an action that is
    /// unsupported or impossible to complete.
    User,
}

/// Condition tags for consumers that want to branch on what went wrong.
///
/// [`crate::container::Container`] reports the kinds in the first group.
/// The sealing kinds below them come out of [`crate::secretcrypt`],
/// [`crate::varmor`] and [`crate::cipher`]; when a container is mounted
/// they are all reported as [`ErrorKind::Unlock`], as are
/// [`ErrorKind::ArchiveCorrupt`] and [`ErrorKind::PathEscape`] raised
/// while unpacking. A failure to seal on save is reported as
/// [`ErrorKind::Filesystem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// A container already exists at the requested path.
    ContainerExists,
    /// No container exists at the requested path.
    ContainerNotFound,
    /// The operation requires a mounted container.
    NotMounted,
    /// The container is already mounted by this handle.
    AlreadyMounted,
    /// Wrong passphrase or corrupt container. Deliberately does not say which.
    Unlock,
    /// The decrypted payload is not a well-formed archive, or its entries collide.
    ArchiveCorrupt,
    /// An archive entry or target path would resolve outside its root.
    PathEscape,
    /// The file to add to the container does not exist.
    SourceNotFound,
    /// Filesystem I/O failed while packing, unpacking or copying.
    Filesystem,
    /// Passphrase could not be obtained from the configured reader.
    PassphraseUnavailable,
    /// Interaction with stdin/stdout, the terminal or a child process failed.
    Io,

    /// Container text lacks the `saltyvault1:` prefix or is not valid base64url.
    ArmoringInvalid,
    /// Container text carries a newer `saltyvaultN:` prefix than this build reads.
    ArmoringFromFuture,
    /// The sealed payload is truncated, has trailing bytes or a bad length field.
    SealedFormat,
    /// The passphrase is wrong or the sealed payload was tampered with.
    AuthenticationFailed,
    /// scrypt or secretbox refused to run.
    CryptoFailure,
    /// Unexpected state reached within saltyvault logic.
    InternalInvariant,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct VaultError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag for consumers that need to
    /// branch their behavior. Any code consuming errors MUST handle
    /// the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl VaultError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    /// The user-facing message carried by the error.
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// True if this error is tagged with `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == Some(kind)
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_context_preserves_kind_and_source() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err = VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Filesystem,
            "failed to write entry",
            io_err,
        )
        .with_context("failed to save container");

        assert_eq!(err.category, ErrorCategory::Internal);
        assert!(err.is(ErrorKind::Filesystem));
        assert_eq!(err.message(), "failed to save container");

        let inner = err.source_error().expect("expected wrapped source");
        assert_eq!(inner.to_string(), "failed to write entry");
    }

    #[test]
    fn test_plain_error_has_no_kind() {
        let err = VaultError::new(ErrorCategory::User, "something odd");
        assert_eq!(err.kind, None);
        assert!(err.source_error().is_none());
        assert_eq!(err.to_string(), "something odd");
    }
}
