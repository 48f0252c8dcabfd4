//! # Key Derivation Functions
//!
//! HKDF-SHA256 derivation of wrapping keys from key-exchange output.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 SHARED SECRET → WRAPPING KEY                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  HKDF-SHA256(                                                          │
//! │    ikm  = ECDH / X25519 shared secret,                                 │
//! │    salt = ephemeral_public ‖ recipient_public,                         │
//! │    info = "bitmaelum-catalog-key-wrap-v1"                              │
//! │  )                                                                      │
//! │                                                                         │
//! │  → 32-byte AES-256-GCM key used once, for one catalog key              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Binding both public keys into the salt ties the derived key to this
//! exact exchange.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::encryption::{EncryptionKey, KEY_SIZE};
use crate::error::{Error, Result};

/// Domain separation strings for HKDF
pub mod domain {
    /// Domain for catalog key wrapping
    pub const CATALOG_KEY_WRAP: &[u8] = b"bitmaelum-catalog-key-wrap-v1";
}

/// Derive a one-time wrapping key from a key-exchange shared secret
pub fn derive_wrapping_key(
    shared_secret: &[u8],
    ephemeral_public: &[u8],
    recipient_public: &[u8],
) -> Result<EncryptionKey> {
    let mut salt = Vec::with_capacity(ephemeral_public.len() + recipient_public.len());
    salt.extend_from_slice(ephemeral_public);
    salt.extend_from_slice(recipient_public);

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared_secret);
    let mut okm = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(domain::CATALOG_KEY_WRAP, &mut okm[..])
        .map_err(|_| Error::Internal("HKDF expansion failed".into()))?;

    Ok(EncryptionKey::from_bytes(*okm))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let a = derive_wrapping_key(&[7u8; 32], b"eph", b"rcpt").unwrap();
        let b = derive_wrapping_key(&[7u8; 32], b"eph", b"rcpt").unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_salt_binds_public_keys() {
        let a = derive_wrapping_key(&[7u8; 32], b"eph-1", b"rcpt").unwrap();
        let b = derive_wrapping_key(&[7u8; 32], b"eph-2", b"rcpt").unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
