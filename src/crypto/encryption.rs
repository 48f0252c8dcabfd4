//! # Encryption Module
//!
//! AES-256-GCM encryption for catalogs and wrapped keys.
//!
//! ## Blob Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      ENCRYPTED BLOB LAYOUT                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   ┌──────────────┬──────────────────────────────┬──────────────────┐    │
//! │   │ nonce (12 B) │ ciphertext (= plaintext len) │ auth tag (16 B)  │    │
//! │   └──────────────┴──────────────────────────────┴──────────────────┘    │
//! │                                                                         │
//! │   • nonce: fresh from OsRng for every call                             │
//! │   • tag: any mismatch fails closed with AuthenticationFailure          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A 256-bit AES-GCM key
///
/// Zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a random key from the OS CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().map_err(|_| {
            Error::InvalidKey(format!("Key must be {} bytes, got {}", KEY_SIZE, slice.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// Encrypt a buffer with AES-256-GCM
///
/// Returns `nonce ‖ ciphertext ‖ tag`.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::InvalidKey(format!("Invalid key: {}", e)))?;

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce), plaintext)
        .map_err(|e| Error::Internal(format!("Encryption failed: {}", e)))?;

    let mut blob = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&ciphertext);
    Ok(blob)
}

/// Decrypt a `nonce ‖ ciphertext ‖ tag` blob
///
/// ## Errors
///
/// Returns `AuthenticationFailure` if:
/// - The blob is shorter than nonce + tag
/// - The ciphertext or tag was tampered with
/// - The key is wrong
pub fn decrypt(key: &EncryptionKey, blob: &[u8]) -> Result<Vec<u8>> {
    if blob.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::AuthenticationFailure(format!(
            "Ciphertext truncated: {} bytes",
            blob.len()
        )));
    }

    let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::InvalidKey(format!("Invalid key: {}", e)))?;

    cipher
        .decrypt(AesNonce::from_slice(nonce), ciphertext)
        .map_err(|_| Error::AuthenticationFailure("authentication tag mismatch".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_basic() {
        let key = EncryptionKey::from_bytes([42u8; 32]);
        let blob = encrypt(&key, b"Hello, World!").unwrap();

        assert_eq!(blob.len(), NONCE_SIZE + 13 + TAG_SIZE);
        assert_eq!(decrypt(&key, &blob).unwrap(), b"Hello, World!");
    }

    #[test]
    fn test_encrypt_decrypt_empty() {
        let key = EncryptionKey::generate();
        let blob = encrypt(&key, b"").unwrap();
        assert!(decrypt(&key, &blob).unwrap().is_empty());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = EncryptionKey::from_bytes([42u8; 32]);
        let mut blob = encrypt(&key, b"Hello, World!").unwrap();
        blob[NONCE_SIZE] ^= 0x01;

        let result = decrypt(&key, &blob);
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_tampered_tag_fails() {
        let key = EncryptionKey::from_bytes([42u8; 32]);
        let mut blob = encrypt(&key, b"Hello, World!").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x80;

        assert!(matches!(decrypt(&key, &blob), Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_truncated_blob_fails() {
        let key = EncryptionKey::generate();
        let result = decrypt(&key, &[0u8; NONCE_SIZE + TAG_SIZE - 1]);
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = encrypt(&EncryptionKey::from_bytes([1u8; 32]), b"secret").unwrap();
        let result = decrypt(&EncryptionKey::from_bytes([2u8; 32]), &blob);
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_different_nonces_produce_different_ciphertext() {
        let key = EncryptionKey::from_bytes([42u8; 32]);
        let ct1 = encrypt(&key, b"Hello, World!").unwrap();
        let ct2 = encrypt(&key, b"Hello, World!").unwrap();

        assert_ne!(ct1[..NONCE_SIZE], ct2[..NONCE_SIZE]);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_key_from_slice_rejects_wrong_length() {
        assert!(EncryptionKey::from_slice(&[0u8; 31]).is_err());
        assert!(EncryptionKey::from_slice(&[0u8; 32]).is_ok());
    }
}
