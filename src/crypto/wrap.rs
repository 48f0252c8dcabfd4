//! # Catalog Key Wrapping
//!
//! Encrypts a message's random catalog key under the recipient's public key.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      WRAPPING PER KEY FAMILY                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  rsa      RSA-OAEP-SHA256(recipient_pub, catalog_key)                  │
//! │           blob = ciphertext                                            │
//! │                                                                         │
//! │  ecdsa    eph = random P-256 scalar                                    │
//! │           k   = HKDF(ECDH(eph, recipient_pub))                         │
//! │           blob = eph_pub (33 B, compressed) ‖ AES-GCM(k, catalog_key)  │
//! │                                                                         │
//! │  ed25519  recipient_pub mapped to X25519 (Montgomery form)             │
//! │           eph = random X25519 secret                                   │
//! │           k   = HKDF(X25519(eph, recipient_x))                         │
//! │           blob = eph_pub (32 B) ‖ AES-GCM(k, catalog_key)              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The scheme tag travels in the header so the recipient knows which
//! unwrapping path to take.

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rsa::Oaep;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::Zeroizing;

use super::encryption::{self, EncryptionKey};
use super::kdf::derive_wrapping_key;
use super::keys::{KeyFamily, PrivateKey, PublicKey};
use crate::error::{Error, Result};

/// Length of a compressed SEC1 P-256 point
const P256_COMPRESSED_LEN: usize = 33;

/// Length of an X25519 public key
const X25519_PUBLIC_LEN: usize = 32;

/// How a catalog key was wrapped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionScheme {
    /// RSA-OAEP with SHA-256
    #[serde(rename = "rsa+oaep")]
    RsaOaep,
    /// Ephemeral P-256 ECDH, HKDF-SHA256, AES-256-GCM
    #[serde(rename = "p256+ecdh+aes256gcm")]
    P256Ecdh,
    /// Ephemeral X25519 against the mapped Ed25519 key, HKDF-SHA256, AES-256-GCM
    #[serde(rename = "ed25519+x25519+aes256gcm")]
    Ed25519X25519,
}

impl EncryptionScheme {
    /// The scheme used for keys of the given family
    pub fn for_family(family: KeyFamily) -> Self {
        match family {
            KeyFamily::Rsa => Self::RsaOaep,
            KeyFamily::Ecdsa => Self::P256Ecdh,
            KeyFamily::Ed25519 => Self::Ed25519X25519,
        }
    }

    /// The key family able to unwrap this scheme
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::RsaOaep => KeyFamily::Rsa,
            Self::P256Ecdh => KeyFamily::Ecdsa,
            Self::Ed25519X25519 => KeyFamily::Ed25519,
        }
    }

    /// Wire tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RsaOaep => "rsa+oaep",
            Self::P256Ecdh => "p256+ecdh+aes256gcm",
            Self::Ed25519X25519 => "ed25519+x25519+aes256gcm",
        }
    }
}

impl fmt::Display for EncryptionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wrap `secret` for the holder of `recipient`
pub fn wrap_key(recipient: &PublicKey, secret: &EncryptionKey) -> Result<(EncryptionScheme, Vec<u8>)> {
    let blob = match recipient {
        PublicKey::Rsa(key) => key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), secret.as_bytes())
            .map_err(|e| Error::InvalidKey(format!("RSA-OAEP wrapping failed: {}", e)))?,

        PublicKey::Ecdsa(key) => {
            let ephemeral = p256::ecdh::EphemeralSecret::random(&mut OsRng);
            let ephemeral_public = ephemeral.public_key().to_encoded_point(true);
            let recipient_point = key.to_encoded_point(true);
            let shared = ephemeral.diffie_hellman(key);

            let wrapping_key = derive_wrapping_key(
                shared.raw_secret_bytes().as_slice(),
                ephemeral_public.as_bytes(),
                recipient_point.as_bytes(),
            )?;
            seal(ephemeral_public.as_bytes(), &wrapping_key, secret)?
        }

        PublicKey::Ed25519(key) => {
            let recipient_x = x25519_public(key);
            let ephemeral = StaticSecret::random_from_rng(OsRng);
            let ephemeral_public = X25519PublicKey::from(&ephemeral);
            let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(recipient_x));

            let wrapping_key = derive_wrapping_key(
                shared.as_bytes(),
                ephemeral_public.as_bytes(),
                &recipient_x,
            )?;
            seal(ephemeral_public.as_bytes(), &wrapping_key, secret)?
        }
    };

    Ok((EncryptionScheme::for_family(recipient.family()), blob))
}

/// Recover a wrapped secret with the recipient's private key
///
/// ## Errors
///
/// - `UnsupportedKeyFamily` if the scheme belongs to a different key family
/// - `AuthenticationFailure` if the key does not match (wrong recipient) or
///   the blob was tampered with
pub fn unwrap_key(
    private: &PrivateKey,
    scheme: EncryptionScheme,
    blob: &[u8],
) -> Result<EncryptionKey> {
    if scheme.family() != private.family() {
        return Err(Error::UnsupportedKeyFamily(format!(
            "scheme {} cannot be unwrapped with a {} key",
            scheme,
            private.family()
        )));
    }

    match private {
        PrivateKey::Rsa(key) => {
            let secret = Zeroizing::new(
                key.decrypt(Oaep::new::<Sha256>(), blob)
                    .map_err(|_| Error::AuthenticationFailure("RSA-OAEP unwrap failed".into()))?,
            );
            EncryptionKey::from_slice(&secret)
                .map_err(|_| Error::AuthenticationFailure("unwrapped key has wrong length".into()))
        }

        PrivateKey::Ecdsa(key) => {
            let (ephemeral_bytes, sealed) = split_ephemeral(blob, P256_COMPRESSED_LEN)?;
            let ephemeral = p256::PublicKey::from_sec1_bytes(ephemeral_bytes)
                .map_err(|_| Error::AuthenticationFailure("invalid ephemeral key".into()))?;
            let recipient_point = key.public_key().to_encoded_point(true);
            let shared = p256::ecdh::diffie_hellman(key.to_nonzero_scalar(), ephemeral.as_affine());

            let wrapping_key = derive_wrapping_key(
                shared.raw_secret_bytes().as_slice(),
                ephemeral_bytes,
                recipient_point.as_bytes(),
            )?;
            open(&wrapping_key, sealed)
        }

        PrivateKey::Ed25519(key) => {
            let (ephemeral_bytes, sealed) = split_ephemeral(blob, X25519_PUBLIC_LEN)?;
            let ephemeral: [u8; X25519_PUBLIC_LEN] = ephemeral_bytes
                .try_into()
                .map_err(|_| Error::AuthenticationFailure("invalid ephemeral key".into()))?;
            let secret = x25519_secret(key);
            let recipient_x = x25519_public(&key.verifying_key());
            let shared = secret.diffie_hellman(&X25519PublicKey::from(ephemeral));

            let wrapping_key =
                derive_wrapping_key(shared.as_bytes(), &ephemeral, &recipient_x)?;
            open(&wrapping_key, sealed)
        }
    }
}

fn seal(ephemeral_public: &[u8], wrapping_key: &EncryptionKey, secret: &EncryptionKey) -> Result<Vec<u8>> {
    let sealed = encryption::encrypt(wrapping_key, secret.as_bytes())?;
    let mut blob = Vec::with_capacity(ephemeral_public.len() + sealed.len());
    blob.extend_from_slice(ephemeral_public);
    blob.extend_from_slice(&sealed);
    Ok(blob)
}

fn open(wrapping_key: &EncryptionKey, sealed: &[u8]) -> Result<EncryptionKey> {
    let secret = Zeroizing::new(encryption::decrypt(wrapping_key, sealed)?);
    EncryptionKey::from_slice(&secret)
        .map_err(|_| Error::AuthenticationFailure("unwrapped key has wrong length".into()))
}

fn split_ephemeral(blob: &[u8], len: usize) -> Result<(&[u8], &[u8])> {
    if blob.len() < len {
        return Err(Error::AuthenticationFailure("wrapped key truncated".into()));
    }
    Ok(blob.split_at(len))
}

/// Map an Ed25519 verifying key to its X25519 (Montgomery) form
fn x25519_public(key: &VerifyingKey) -> [u8; 32] {
    key.to_montgomery().to_bytes()
}

/// Derive the X25519 secret matching [`x25519_public`]
///
/// The Ed25519 secret scalar is the low half of SHA-512(seed); X25519
/// applies the same clamping, so the two public keys correspond.
fn x25519_secret(key: &SigningKey) -> StaticSecret {
    let digest = Sha512::digest(key.to_bytes());
    let mut scalar = Zeroizing::new([0u8; 32]);
    scalar.copy_from_slice(&digest[..32]);
    StaticSecret::from(*scalar)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::test_keys;
    use crate::crypto::KeyPair;

    fn all_families() -> Vec<KeyPair> {
        vec![
            test_keys::rsa().clone(),
            KeyPair::generate(KeyFamily::Ecdsa).unwrap(),
            KeyPair::generate(KeyFamily::Ed25519).unwrap(),
        ]
    }

    #[test]
    fn test_wrap_unwrap_round_trip_all_families() {
        for kp in all_families() {
            let secret = EncryptionKey::generate();
            let (scheme, blob) = wrap_key(kp.public_key(), &secret).unwrap();
            assert_eq!(scheme.family(), kp.family());

            let unwrapped = unwrap_key(kp.private_key(), scheme, &blob).unwrap();
            assert_eq!(unwrapped.as_bytes(), secret.as_bytes());
        }
    }

    #[test]
    fn test_ed25519_mapping_is_consistent() {
        let kp = SigningKey::generate(&mut OsRng);
        let from_secret = X25519PublicKey::from(&x25519_secret(&kp)).to_bytes();
        assert_eq!(from_secret, x25519_public(&kp.verifying_key()));
    }

    #[test]
    fn test_wrong_recipient_is_authentication_failure() {
        for kp in all_families() {
            let other = match kp.family() {
                KeyFamily::Rsa => test_keys::other_rsa().clone(),
                family => KeyPair::generate(family).unwrap(),
            };
            let (scheme, blob) = wrap_key(kp.public_key(), &EncryptionKey::generate()).unwrap();

            let result = unwrap_key(other.private_key(), scheme, &blob);
            assert!(
                matches!(result, Err(Error::AuthenticationFailure(_))),
                "family {} should fail closed",
                kp.family()
            );
        }
    }

    #[test]
    fn test_scheme_family_mismatch_is_unsupported() {
        let ed = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let ec = KeyPair::generate(KeyFamily::Ecdsa).unwrap();
        let (scheme, blob) = wrap_key(ed.public_key(), &EncryptionKey::generate()).unwrap();

        let result = unwrap_key(ec.private_key(), scheme, &blob);
        assert!(matches!(result, Err(Error::UnsupportedKeyFamily(_))));
    }

    #[test]
    fn test_truncated_blob_fails_closed() {
        let kp = KeyPair::generate(KeyFamily::Ecdsa).unwrap();
        let (scheme, blob) = wrap_key(kp.public_key(), &EncryptionKey::generate()).unwrap();

        let result = unwrap_key(kp.private_key(), scheme, &blob[..10]);
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[test]
    fn test_scheme_serde_tags() {
        let json = serde_json::to_string(&EncryptionScheme::Ed25519X25519).unwrap();
        assert_eq!(json, "\"ed25519+x25519+aes256gcm\"");
        let parsed: EncryptionScheme = serde_json::from_str("\"rsa+oaep\"").unwrap();
        assert_eq!(parsed, EncryptionScheme::RsaOaep);
    }
}
