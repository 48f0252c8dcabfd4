//! # Catalog
//!
//! The encrypted table of contents of a message.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CATALOG CODEC                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  encode:  Catalog ──► canonical JSON ──► AES-256-GCM(fresh key)        │
//! │                                             │                           │
//! │                                             ▼                           │
//! │                          (catalog key, nonce ‖ ct ‖ tag)               │
//! │                                                                         │
//! │  decode:  (catalog key, blob) ──► AES-256-GCM open ──► JSON ──► Catalog│
//! │                                    (tag mismatch: AuthenticationFailure)│
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Descriptors carry metadata, the per-part stream key and the plaintext
//! checksums. Part bodies never appear in the catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::crypto::{self, ChecksumSet, EncryptionKey, PublicKey, StreamKey};
use crate::error::Result;
use crate::pow::ProofOfWork;

/// Sender details visible only to the recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSender {
    /// Display name
    pub name: String,
    /// Plain address
    pub address: Address,
    /// Organisation of the address, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organisation: Option<String>,
    /// Public key the header was signed with (origin key)
    pub public_key: PublicKey,
    /// Sender's proof of work, if one was attached
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_work: Option<ProofOfWork>,
}

/// Recipient details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecipient {
    /// Plain address
    pub address: Address,
    /// Display name, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// One encrypted body block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Part id used for upload and fetch
    pub id: String,
    /// Block type ("default", "html", ...)
    #[serde(rename = "type")]
    pub kind: String,
    /// Plaintext size in bytes
    pub size: u64,
    /// Stream key and IV for this block only
    pub key: StreamKey,
    /// Plaintext checksums
    pub checksums: ChecksumSet,
}

/// One encrypted attachment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentDescriptor {
    /// Part id used for upload and fetch
    pub id: String,
    /// File name
    pub filename: String,
    /// MIME type
    pub mime_type: String,
    /// Plaintext size in bytes
    pub size: u64,
    /// Stream key and IV for this attachment only
    pub key: StreamKey,
    /// Plaintext checksums
    pub checksums: ChecksumSet,
}

/// Message metadata and part descriptors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Subject line
    pub subject: String,
    /// Flags
    #[serde(default)]
    pub flags: Vec<String>,
    /// Labels
    #[serde(default)]
    pub labels: Vec<String>,
    /// Thread this message belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Composition time (UTC, whole seconds)
    pub created_at: DateTime<Utc>,
    /// Sender
    pub from: CatalogSender,
    /// Recipient
    pub to: CatalogRecipient,
    /// Body blocks, in composition order
    pub blocks: Vec<BlockDescriptor>,
    /// Attachments, in composition order
    pub attachments: Vec<AttachmentDescriptor>,
}

impl Catalog {
    /// Find a block descriptor by id
    pub fn block(&self, id: &str) -> Option<&BlockDescriptor> {
        self.blocks.iter().find(|b| b.id == id)
    }

    /// Find an attachment descriptor by id
    pub fn attachment(&self, id: &str) -> Option<&AttachmentDescriptor> {
        self.attachments.iter().find(|a| a.id == id)
    }
}

/// Encrypt a catalog under a freshly generated key
///
/// Returns the key (to be wrapped for the recipient) and
/// `nonce ‖ ciphertext ‖ tag`.
pub fn encode_catalog(catalog: &Catalog) -> Result<(EncryptionKey, Vec<u8>)> {
    let plaintext = serde_json::to_vec(catalog)?;
    let key = EncryptionKey::generate();
    let blob = crypto::encrypt(&key, &plaintext)?;
    Ok((key, blob))
}

/// Decrypt and parse a catalog
///
/// ## Errors
///
/// - `AuthenticationFailure` for a wrong key or tampered blob
/// - `DeserializationError` if the plaintext is not a catalog
pub fn decode_catalog(key: &EncryptionKey, blob: &[u8]) -> Result<Catalog> {
    let plaintext = crypto::decrypt(key, blob)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::crypto::{EncryptingReader, KeyFamily, KeyPair};
    use crate::error::Error;
    use proptest::prelude::*;
    use std::io::Cursor;

    pub(crate) fn sample_catalog() -> Catalog {
        let sender = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let (key, _) = EncryptingReader::new(Cursor::new(Vec::<u8>::new()));
        let (attach_key, _) = EncryptingReader::new(Cursor::new(Vec::<u8>::new()));

        Catalog {
            subject: "Quarterly numbers".into(),
            flags: vec!["important".into()],
            labels: vec!["work".into()],
            thread_id: None,
            created_at: crate::time::now(),
            from: CatalogSender {
                name: "John Doe".into(),
                address: Address::parse("john@acme!").unwrap(),
                organisation: Some("acme".into()),
                public_key: sender.public_key().clone(),
                proof_of_work: Some(ProofOfWork::new(0, b"john@acme!".to_vec())),
            },
            to: CatalogRecipient {
                address: Address::parse("jane!").unwrap(),
                name: Some("Jane".into()),
            },
            blocks: vec![BlockDescriptor {
                id: "block-0".into(),
                kind: "default".into(),
                size: 5,
                key,
                checksums: ChecksumSet::compute(b"hello"),
            }],
            attachments: vec![AttachmentDescriptor {
                id: "attachment-0".into(),
                filename: "numbers.csv".into(),
                mime_type: "text/csv".into(),
                size: 3,
                key: attach_key,
                checksums: ChecksumSet::compute(b"1,2"),
            }],
        }
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let catalog = sample_catalog();
        let (key, blob) = encode_catalog(&catalog).unwrap();

        let decoded = decode_catalog(&key, &blob).unwrap();
        assert_eq!(decoded, catalog);
        assert!(decoded.block("block-0").is_some());
        assert!(decoded.attachment("attachment-0").is_some());
        assert!(decoded.block("attachment-0").is_none());
    }

    #[test]
    fn test_every_encoding_uses_a_new_key() {
        let catalog = sample_catalog();
        let (k1, b1) = encode_catalog(&catalog).unwrap();
        let (k2, b2) = encode_catalog(&catalog).unwrap();

        assert_ne!(k1.as_bytes(), k2.as_bytes());
        assert_ne!(b1, b2);
        assert!(matches!(
            decode_catalog(&k1, &b2),
            Err(Error::AuthenticationFailure(_))
        ));
    }

    #[test]
    fn test_catalog_json_field_names() {
        let json = serde_json::to_value(sample_catalog()).unwrap();
        assert_eq!(json["blocks"][0]["type"], "default");
        assert!(json["blocks"][0]["key"]["key"].is_string());
        assert!(json["blocks"][0]["key"]["iv"].is_string());
        assert_eq!(json["attachments"][0]["checksums"][0]["hash"], "crc32");
    }

    #[test]
    fn test_non_catalog_plaintext_is_deserialization_error() {
        let key = EncryptionKey::generate();
        let blob = crypto::encrypt(&key, b"{\"not\":\"a catalog\"}").unwrap();
        assert!(matches!(
            decode_catalog(&key, &blob),
            Err(Error::DeserializationError(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_any_bit_flip_is_rejected(position in any::<prop::sample::Index>(), bit in 0u8..8) {
            let catalog = sample_catalog();
            let (key, mut blob) = encode_catalog(&catalog).unwrap();
            let index = position.index(blob.len());
            blob[index] ^= 1 << bit;

            let result = decode_catalog(&key, &blob);
            prop_assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
        }
    }
}
