//! Versioned text armor for sealed container payloads
//!
//! The armored form is what lands on disk: `saltyvault1:` followed by
//! base64url without padding. It contains no whitespace, so the container
//! file is plain ASCII and survives any text-oriented channel.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};

/// Magic prefix for all saltyvault versions
const MAGIC_PREFIX: &str = "saltyvault";

/// Version 1 magic marker
const V1_MAGIC: &str = "saltyvault1:";

/// Wrap bytes in armor, returning the armored string
pub fn wrap(body: &[u8]) -> String {
    format!("{}{}", V1_MAGIC, URL_SAFE_NO_PAD.encode(body))
}

/// Unwrap an armored string, returning the original bytes
pub fn unwrap(armored: &str) -> Result<Vec<u8>> {
    if let Some(encoded) = armored.strip_prefix(V1_MAGIC) {
        URL_SAFE_NO_PAD.decode(encoded).map_err(|e| {
            VaultError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::ArmoringInvalid,
                format!("base64 decoding failed: {}", e),
                e,
            )
        })
    } else if armored.starts_with(MAGIC_PREFIX) {
        Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringFromFuture,
            "input claims to be a saltyvault container, but not a version we support",
        ))
    } else if armored.len() < V1_MAGIC.len() {
        Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "input size smaller than magic marker; likely truncated",
        ))
    } else {
        Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::ArmoringInvalid,
            "input unrecognized as a saltyvault container",
        ))
    }
}
