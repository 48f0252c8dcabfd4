//! # Digital Signatures Module
//!
//! Per-family signing and verification for headers and authorizations.
//!
//! ## Signature Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SIGNING FLOW                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  SENDER                                                                 │
//! │                                                                         │
//! │  canonical bytes ──► sign(private_key) ──► Signature (base64 on wire)  │
//! │                                                                         │
//! │     rsa      PKCS#1 v1.5 over SHA-256     (modulus-sized)              │
//! │     ecdsa    ECDSA P-256 over SHA-256     (64 bytes, r ‖ s)            │
//! │     ed25519  Ed25519                      (64 bytes)                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       VERIFICATION FLOW                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  RECIPIENT or ANY SERVER                                                │
//! │                                                                         │
//! │  canonical bytes + Signature + PublicKey ──► verify()                  │
//! │                                                                         │
//! │     ✓ Ok(())                                                           │
//! │     ✗ VerificationFailed (tampered, wrong key, malformed signature)    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The signer's key family picks the algorithm; there is no negotiation.

use rsa::pkcs1v15;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::keys::{PrivateKey, PublicKey};
use super::serde_base64;
use crate::error::{Error, Result};

/// A signature produced by any supported key family
///
/// The length depends on the family, so the bytes are kept unsized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature(#[serde(with = "serde_base64")] Vec<u8>);

impl Signature {
    /// Wrap raw signature bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Raw signature bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Encode as hex string
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }
}

impl AsRef<[u8]> for Signature {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Sign a message with any supported private key
///
/// ## Security Note
///
/// Ed25519 and ECDSA (RFC 6979) signatures are deterministic. RSA PKCS#1
/// v1.5 signatures are deterministic as well.
pub fn sign(key: &PrivateKey, message: &[u8]) -> Result<Signature> {
    let bytes = match key {
        PrivateKey::Rsa(key) => {
            let signer = pkcs1v15::SigningKey::<Sha256>::new(key.clone());
            signer
                .try_sign(message)
                .map_err(|e| Error::SigningFailed(e.to_string()))?
                .to_vec()
        }
        PrivateKey::Ecdsa(key) => {
            let signer = p256::ecdsa::SigningKey::from(key);
            let signature: p256::ecdsa::Signature = signer
                .try_sign(message)
                .map_err(|e| Error::SigningFailed(e.to_string()))?;
            signature.to_bytes().to_vec()
        }
        PrivateKey::Ed25519(key) => key.sign(message).to_bytes().to_vec(),
    };
    Ok(Signature(bytes))
}

/// Verify a signature against a public key
///
/// ## Returns
///
/// `Ok(())` if valid, `Err(VerificationFailed)` otherwise
pub fn verify(key: &PublicKey, message: &[u8], signature: &Signature) -> Result<()> {
    let family = key.family();
    let failed = || Error::VerificationFailed(format!("{} signature does not verify", family));

    match key {
        PublicKey::Rsa(key) => {
            let verifier = pkcs1v15::VerifyingKey::<Sha256>::new(key.clone());
            let sig = pkcs1v15::Signature::try_from(signature.as_bytes()).map_err(|_| failed())?;
            verifier.verify(message, &sig).map_err(|_| failed())
        }
        PublicKey::Ecdsa(key) => {
            let verifier = p256::ecdsa::VerifyingKey::from(key);
            let sig = p256::ecdsa::Signature::from_slice(signature.as_bytes())
                .map_err(|_| failed())?;
            verifier.verify(message, &sig).map_err(|_| failed())
        }
        PublicKey::Ed25519(key) => {
            let sig = ed25519_dalek::Signature::from_slice(signature.as_bytes())
                .map_err(|_| failed())?;
            key.verify(message, &sig).map_err(|_| failed())
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
