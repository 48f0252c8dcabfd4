//! # Key Management
//!
//! Key generation, encoding and fingerprinting for the three supported key
//! families.
//!
//! ## Key Families
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          KEY FAMILIES                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Family    Signing             Catalog key wrapping                    │
//! │  ───────   ─────────────────   ─────────────────────────────────────    │
//! │  rsa       PKCS#1 v1.5 SHA256  RSA-OAEP (SHA-256)                      │
//! │  ecdsa     ECDSA P-256 SHA256  ephemeral ECDH → HKDF → AES-256-GCM     │
//! │  ed25519   Ed25519             X25519 map → HKDF → AES-256-GCM         │
//! │                                                                         │
//! │  Text form:  "<family> <base64 key material>"                          │
//! │                                                                         │
//! │  Family    Public encoding          Private encoding                   │
//! │  ───────   ──────────────────────   ──────────────────                  │
//! │  rsa       SPKI DER                 PKCS#8 DER                         │
//! │  ecdsa     SEC1 compressed point    SEC1 scalar (32 bytes)             │
//! │  ed25519   raw (32 bytes)           raw seed (32 bytes)                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ed25519_dalek::{SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::config::CoreConfig;
use crate::error::{Error, Result};

/// Default RSA modulus size for newly generated keys
pub const DEFAULT_RSA_BITS: usize = 2048;

/// The closed set of supported key families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyFamily {
    /// RSA
    Rsa,
    /// ECDSA over NIST P-256
    Ecdsa,
    /// Ed25519
    Ed25519,
}

impl KeyFamily {
    /// Family tag used in the text encoding
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa => "rsa",
            Self::Ecdsa => "ecdsa",
            Self::Ed25519 => "ed25519",
        }
    }

    /// Parse a family tag
    pub fn parse(tag: &str) -> Result<Self> {
        match tag {
            "rsa" => Ok(Self::Rsa),
            "ecdsa" => Ok(Self::Ecdsa),
            "ed25519" => Ok(Self::Ed25519),
            other => Err(Error::UnsupportedKeyFamily(other.to_string())),
        }
    }
}

impl fmt::Display for KeyFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split `"<family> <base64>"` into its parts
fn split_text(text: &str) -> Result<(KeyFamily, Vec<u8>)> {
    let (tag, body) = text
        .trim()
        .split_once(' ')
        .ok_or_else(|| Error::InvalidKey("expected \"<family> <base64>\"".into()))?;

    let family = KeyFamily::parse(tag)?;
    let bytes = BASE64
        .decode(body.trim())
        .map_err(|e| Error::InvalidKey(format!("Invalid base64: {}", e)))?;

    Ok((family, bytes))
}

fn to_array_32(bytes: &[u8], what: &str) -> Result<[u8; 32]> {
    bytes
        .try_into()
        .map_err(|_| Error::InvalidKey(format!("{} must be 32 bytes, got {}", what, bytes.len())))
}

// ============================================================================
// PUBLIC KEY
// ============================================================================

/// A public key of any supported family
///
/// Serialized as its text form, so it can be embedded directly in headers
/// and catalogs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    /// RSA public key
    Rsa(RsaPublicKey),
    /// P-256 public key
    Ecdsa(p256::PublicKey),
    /// Ed25519 verifying key
    Ed25519(VerifyingKey),
}

impl PublicKey {
    /// The family of this key
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::Ecdsa(_) => KeyFamily::Ecdsa,
            Self::Ed25519(_) => KeyFamily::Ed25519,
        }
    }

    /// Canonical binary encoding of the key
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        match self {
            Self::Rsa(key) => key
                .to_public_key_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| Error::InvalidKey(format!("RSA encoding failed: {}", e))),
            Self::Ecdsa(key) => Ok(key.to_encoded_point(true).as_bytes().to_vec()),
            Self::Ed25519(key) => Ok(key.to_bytes().to_vec()),
        }
    }

    /// Decode a key of the given family from its canonical binary encoding
    pub fn from_bytes(family: KeyFamily, bytes: &[u8]) -> Result<Self> {
        match family {
            KeyFamily::Rsa => RsaPublicKey::from_public_key_der(bytes)
                .map(Self::Rsa)
                .map_err(|e| Error::InvalidKey(format!("Invalid RSA public key: {}", e))),
            KeyFamily::Ecdsa => p256::PublicKey::from_sec1_bytes(bytes)
                .map(Self::Ecdsa)
                .map_err(|e| Error::InvalidKey(format!("Invalid P-256 public key: {}", e))),
            KeyFamily::Ed25519 => {
                let raw = to_array_32(bytes, "Ed25519 public key")?;
                VerifyingKey::from_bytes(&raw)
                    .map(Self::Ed25519)
                    .map_err(|e| Error::InvalidKey(format!("Invalid Ed25519 public key: {}", e)))
            }
        }
    }

    /// Encode as `"<family> <base64>"`
    pub fn to_text(&self) -> Result<String> {
        Ok(format!("{} {}", self.family(), BASE64.encode(self.to_bytes()?)))
    }

    /// Decode from `"<family> <base64>"`
    pub fn from_text(text: &str) -> Result<Self> {
        let (family, bytes) = split_text(text)?;
        Self::from_bytes(family, &bytes)
    }

    /// Hex SHA-256 of the canonical encoding
    pub fn fingerprint(&self) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.to_bytes()?)))
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = self.to_text().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// PRIVATE KEY
// ============================================================================

/// A private key of any supported family
///
/// All three inner types zeroize their secret material on drop.
#[derive(Clone)]
pub enum PrivateKey {
    /// RSA private key
    Rsa(RsaPrivateKey),
    /// P-256 secret scalar
    Ecdsa(p256::SecretKey),
    /// Ed25519 signing key
    Ed25519(SigningKey),
}

impl PrivateKey {
    /// The family of this key
    pub fn family(&self) -> KeyFamily {
        match self {
            Self::Rsa(_) => KeyFamily::Rsa,
            Self::Ecdsa(_) => KeyFamily::Ecdsa,
            Self::Ed25519(_) => KeyFamily::Ed25519,
        }
    }

    /// Derive the matching public key
    pub fn public_key(&self) -> PublicKey {
        match self {
            Self::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            Self::Ecdsa(key) => PublicKey::Ecdsa(key.public_key()),
            Self::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }

    /// Encode as `"<family> <base64>"`
    ///
    /// ## Security Warning
    ///
    /// Only use this for the vault. Never log or transmit the result.
    pub fn to_text(&self) -> Result<String> {
        let bytes = match self {
            Self::Rsa(key) => key
                .to_pkcs8_der()
                .map(|doc| doc.as_bytes().to_vec())
                .map_err(|e| Error::InvalidKey(format!("RSA encoding failed: {}", e)))?,
            Self::Ecdsa(key) => key.to_bytes().to_vec(),
            Self::Ed25519(key) => key.to_bytes().to_vec(),
        };
        Ok(format!("{} {}", self.family(), BASE64.encode(bytes)))
    }

    /// Decode from `"<family> <base64>"`
    pub fn from_text(text: &str) -> Result<Self> {
        let (family, bytes) = split_text(text)?;
        match family {
            KeyFamily::Rsa => RsaPrivateKey::from_pkcs8_der(&bytes)
                .map(Self::Rsa)
                .map_err(|e| Error::InvalidKey(format!("Invalid RSA private key: {}", e))),
            KeyFamily::Ecdsa => p256::SecretKey::from_slice(&bytes)
                .map(Self::Ecdsa)
                .map_err(|e| Error::InvalidKey(format!("Invalid P-256 private key: {}", e))),
            KeyFamily::Ed25519 => {
                let seed = to_array_32(&bytes, "Ed25519 private key")?;
                Ok(Self::Ed25519(SigningKey::from_bytes(&seed)))
            }
        }
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey({}, <redacted>)", self.family())
    }
}

// ============================================================================
// KEY PAIR
// ============================================================================

/// A private key together with its public half and fingerprint
///
/// Owned by the account or organisation that generated it; never written
/// into a header or catalog.
#[derive(Clone, Debug)]
pub struct KeyPair {
    private: PrivateKey,
    public: PublicKey,
    fingerprint: String,
}

impl KeyPair {
    /// Generate a fresh keypair of the given family
    ///
    /// RSA keys use [`DEFAULT_RSA_BITS`].
    pub fn generate(family: KeyFamily) -> Result<Self> {
        match family {
            KeyFamily::Rsa => Self::generate_rsa(DEFAULT_RSA_BITS),
            KeyFamily::Ecdsa => Self::from_private(PrivateKey::Ecdsa(p256::SecretKey::random(
                &mut OsRng,
            ))),
            KeyFamily::Ed25519 => {
                Self::from_private(PrivateKey::Ed25519(SigningKey::generate(&mut OsRng)))
            }
        }
    }

    /// Generate a fresh keypair, taking the RSA modulus size from `config`
    pub fn generate_with(family: KeyFamily, config: &CoreConfig) -> Result<Self> {
        match family {
            KeyFamily::Rsa => Self::generate_rsa(config.rsa_bits),
            family => Self::generate(family),
        }
    }

    /// Generate an RSA keypair with an explicit modulus size
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::InvalidKey(format!("RSA key generation failed: {}", e)))?;
        Self::from_private(PrivateKey::Rsa(key))
    }

    /// Build a keypair around an existing private key
    pub fn from_private(private: PrivateKey) -> Result<Self> {
        let public = private.public_key();
        let fingerprint = public.fingerprint()?;
        Ok(Self {
            private,
            public,
            fingerprint,
        })
    }

    /// The key family
    pub fn family(&self) -> KeyFamily {
        self.private.family()
    }

    /// The private half
    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    /// The public half
    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Hex SHA-256 fingerprint of the public key
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

// ============================================================================
// TESTS
// ============================================================================
