//! # Cryptography Module
//!
//! All cryptographic primitives used by the message pipeline.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    PER-MESSAGE KEYS                             │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  catalog key (random, AES-256-GCM)                             │   │
//! │  │        │                                                        │   │
//! │  │        ├── wrapped for recipient ──► header.catalog.encrypted_key │  │
//! │  │        │                                                        │   │
//! │  │        └── seals the catalog, which in turn holds              │   │
//! │  │               ┌────────────┐ ┌────────────┐ ┌────────────┐     │   │
//! │  │               │ block key  │ │ block key  │ │ attach key │ ... │   │
//! │  │               │ + IV (CTR) │ │ + IV (CTR) │ │ + IV (CTR) │     │   │
//! │  │               └────────────┘ └────────────┘ └────────────┘     │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    LONG-TERM KEYS                               │   │
//! │  ├─────────────────────────────────────────────────────────────────┤   │
//! │  │                                                                 │   │
//! │  │  rsa | ecdsa (P-256) | ed25519                                 │   │
//! │  │    • sign headers and authorizations                           │   │
//! │  │    • receive wrapped catalog keys                              │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose |
//! |-----------|---------|
//! | AES-256-GCM | Catalog sealing, ephemeral key wrapping |
//! | AES-256-CTR | Streaming block and attachment bodies |
//! | RSA-OAEP / P-256 ECDH / X25519 | Catalog key wrapping |
//! | HKDF-SHA256 | Wrapping key derivation |
//! | PKCS#1 v1.5 / ECDSA / Ed25519 | Header signatures |
//! | CRC32, SHA-1, SHA-256, BLAKE3 | Plaintext checksums |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: symmetric keys are zeroized when dropped
//! 2. **Secure Random**: `rand::rngs::OsRng` for all key and nonce material
//! 3. **No Key Reuse**: every part gets its own key and IV
//! 4. **Fail Closed**: any tag mismatch is an `AuthenticationFailure`

mod checksum;
mod encryption;
mod kdf;
mod keys;
mod signing;
mod stream;
mod wrap;

pub use checksum::{Checksum, ChecksumAlgorithm, ChecksumSet, Checksummer};
pub use encryption::{decrypt, encrypt, EncryptionKey, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use kdf::derive_wrapping_key;
pub use keys::{KeyFamily, KeyPair, PrivateKey, PublicKey, DEFAULT_RSA_BITS};
pub use signing::{sign, verify, Signature};
pub use stream::{
    DecryptingReader, EncryptingReader, StreamKey, STREAM_IV_SIZE, STREAM_KEY_SIZE,
};
pub use wrap::{unwrap_key, wrap_key, EncryptionScheme};

/// Base64 serde adapters for binary fields
pub(crate) mod serde_base64 {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    /// `Vec<u8>` as a base64 string
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    /// `Vec<u8>` from a base64 string
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64.decode(text).map_err(serde::de::Error::custom)
    }

    /// Fixed-size arrays as base64 strings
    pub mod array {
        use super::*;

        /// `[u8; N]` as a base64 string
        pub fn serialize<S: Serializer, const N: usize>(
            bytes: &[u8; N],
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            serializer.serialize_str(&BASE64.encode(bytes))
        }

        /// `[u8; N]` from a base64 string of exactly N bytes
        pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
            deserializer: D,
        ) -> Result<[u8; N], D::Error> {
            let text = String::deserialize(deserializer)?;
            let bytes = BASE64.decode(text).map_err(serde::de::Error::custom)?;
            let len = bytes.len();
            bytes.try_into().map_err(|_| {
                serde::de::Error::custom(format!("expected {} bytes, got {}", N, len))
            })
        }
    }
}
