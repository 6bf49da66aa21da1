//! The encryption seam used by [`crate::container::Container`].

use crate::error::Result;
use crate::secretcrypt;
use crate::varmor;

/// Turns archive bytes into the text stored in a container file, and back.
///
/// `decrypt` must fail, rather than return garbage, when the key is wrong
/// and the implementation can detect it.
pub trait Cipher {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<String>;

    fn decrypt(&self, armored: &str, key: &[u8]) -> Result<Vec<u8>>;
}

/// scrypt + XSalsa20Poly1305 sealing wrapped in `saltyvault1:` armor.
#[derive(Debug, Default, Clone, Copy)]
pub struct SecretboxCipher;

impl Cipher for SecretboxCipher {
    fn encrypt(&self, plaintext: &[u8], key: &[u8]) -> Result<String> {
        let sealed =
            secretcrypt::encrypt(key, plaintext).map_err(|e| e.with_context("encryption failed"))?;
        Ok(varmor::wrap(&sealed))
    }

    fn decrypt(&self, armored: &str, key: &[u8]) -> Result<Vec<u8>> {
        let sealed = varmor::unwrap(armored.trim_end())
            .map_err(|e| e.with_context("failed to unarmor"))?;
        secretcrypt::decrypt(key, &sealed).map_err(|e| e.with_context("failed to decrypt"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_roundtrip() {
        let cipher = SecretboxCipher;
        let armored = cipher.encrypt(b"archive bytes", b"pw").unwrap();
        assert!(armored.starts_with("saltyvault1:"));
        assert_eq!(cipher.decrypt(&armored, b"pw").unwrap(), b"archive bytes");
    }

    #[test]
    fn test_tolerates_trailing_newline() {
        let cipher = SecretboxCipher;
        let armored = cipher.encrypt(b"x", b"pw").unwrap() + "\n";
        assert_eq!(cipher.decrypt(&armored, b"pw").unwrap(), b"x");
    }

    #[test]
    fn test_wrong_key() {
        let cipher = SecretboxCipher;
        let armored = cipher.encrypt(b"archive bytes", b"pw").unwrap();
        let err = cipher.decrypt(&armored, b"not pw").expect_err("expected failure");
        assert_eq!(err.kind, Some(ErrorKind::AuthenticationFailed));
    }
}
