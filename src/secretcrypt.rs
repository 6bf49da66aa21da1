//! Passphrase sealing using scrypt + XSalsa20Poly1305
//!
//! The sealed binary layout is:
//! - salt: 8 bytes
//! - nonce: 24 bytes
//! - length: 8 bytes (big-endian signed int64)
//! - sealed box: variable length (includes 16-byte Poly1305 MAC)
//!
//! Key derivation parameters are fixed. They are not recorded in the sealed
//! output, so changing them would make existing containers unreadable.

use crate::error::{ErrorCategory, ErrorKind, Result, VaultError};
use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Nonce, XSalsa20Poly1305};
use rand::RngCore;
use scrypt::{Params, scrypt};
use std::mem::size_of;
use zeroize::Zeroizing;

/// Length of salt in bytes
pub const SALT_LEN: usize = 8;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 24;

/// Length of derived key in bytes
const KEY_LEN: usize = 32;

/// scrypt log2(N) parameter (CPU/memory cost, N = 32768)
const SCRYPT_LOG_N: u8 = 15;

/// scrypt r parameter (block size)
const SCRYPT_R: u32 = 8;

/// scrypt p parameter (parallelization)
const SCRYPT_P: u32 = 1;

fn derive_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::CryptoFailure,
            "failed to create scrypt params",
            e,
        )
    })?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt(passphrase, salt, &params, &mut key[..]).map_err(|e| {
        VaultError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::CryptoFailure,
            "scrypt key derivation failed",
            e,
        )
    })?;

    Ok(key)
}

/// Seal plaintext with a passphrase using random salt and nonce
pub fn encrypt(passphrase: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut rng = rand::rng();

    let mut salt = [0u8; SALT_LEN];
    rng.fill_bytes(&mut salt);

    let mut nonce = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce);

    encrypt_deterministic(passphrase, plaintext, &salt, &nonce)
}

/// Seal plaintext with a passphrase using provided salt and nonce
///
/// Only meant for producing reproducible output in tests. Reusing a
/// salt/nonce pair across plaintexts breaks the secretbox guarantees.
pub fn encrypt_deterministic(
    passphrase: &[u8],
    plaintext: &[u8],
    salt: &[u8; SALT_LEN],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let key = derive_key(passphrase, salt)?;
    let cipher = XSalsa20Poly1305::new(&(*key).into());

    let sealed_box = cipher
        .encrypt(&Nonce::from(*nonce), plaintext)
        .map_err(|_| {
            VaultError::with_kind(
                ErrorCategory::Internal,
                ErrorKind::CryptoFailure,
                "secretbox sealing failed",
            )
        })?;

    let sealed_box_len = i64::try_from(sealed_box.len()).map_err(|_| {
        VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::SealedFormat,
            "plaintext too large to seal",
        )
    })?;

    let mut output =
        Vec::with_capacity(SALT_LEN + NONCE_LEN + size_of::<i64>() + sealed_box.len());
    output.extend_from_slice(salt);
    output.extend_from_slice(nonce);
    output.extend_from_slice(&sealed_box_len.to_be_bytes());
    output.extend_from_slice(&sealed_box);

    Ok(output)
}

/// Splits `n` bytes off the front of `input`, or fails as truncated.
fn take<'a>(input: &mut &'a [u8], n: usize, what: &str) -> Result<&'a [u8]> {
    if input.len() < n {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::SealedFormat,
            format!("input likely truncated while reading {what}"),
        ));
    }
    let (head, rest) = input.split_at(n);
    *input = rest;
    Ok(head)
}

/// Open sealed bytes with a passphrase
pub fn decrypt(passphrase: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    let mut input = ciphertext;

    let salt: [u8; SALT_LEN] = take(&mut input, SALT_LEN, "salt")?
        .try_into()
        .map_err(|_| invariant("salt slice has wrong length"))?;
    let nonce: [u8; NONCE_LEN] = take(&mut input, NONCE_LEN, "nonce")?
        .try_into()
        .map_err(|_| invariant("nonce slice has wrong length"))?;
    let length_bytes: [u8; 8] = take(&mut input, size_of::<i64>(), "sealed box length")?
        .try_into()
        .map_err(|_| invariant("length slice has wrong length"))?;

    let sealed_box_len = i64::from_be_bytes(length_bytes);
    if sealed_box_len < 0 {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::SealedFormat,
            "negative sealed box length (when interpreted as a big-endian i64)",
        ));
    }
    let sealed_box_len = usize::try_from(sealed_box_len).map_err(|_| {
        VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::SealedFormat,
            "sealed box length exceeds this system's address space",
        )
    })?;
    if sealed_box_len > input.len() {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::SealedFormat,
            "truncated or corrupt input; claimed length greater than available input",
        ));
    }

    let sealed_box = take(&mut input, sealed_box_len, "sealed box")?;
    if !input.is_empty() {
        return Err(VaultError::with_kind(
            ErrorCategory::User,
            ErrorKind::SealedFormat,
            "invalid input: unexpected data after sealed box",
        ));
    }

    let key = derive_key(passphrase, &salt)?;
    let cipher = XSalsa20Poly1305::new(&(*key).into());
    cipher
        .decrypt(&Nonce::from(nonce), sealed_box)
        .map_err(|_| {
            VaultError::with_kind(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "corrupt input, tampered-with data, or bad passphrase",
            )
        })
}

fn invariant(msg: &str) -> VaultError {
    VaultError::with_kind(ErrorCategory::Internal, ErrorKind::InternalInvariant, msg)
}
