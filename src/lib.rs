//! # BitMaelum Core
//!
//! Message protection for a federated mail system: every message is split
//! into a signed header, an encrypted catalog and individually encrypted
//! parts, and senders prove work before a server accepts them.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       BITMAELUM CORE MODULES                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────┐  ┌─────────────────────────────┐   │
//! │  │            Message              │  │          Services           │   │
//! │  │                                 │  │                             │   │
//! │  │ - Composer (resolve → upload)   │◄─┤ - PrivateKeyProvider        │   │
//! │  │ - Decryptor (lazy part readers) │  │ - DirectoryLookup           │   │
//! │  │ - Header / Catalog codecs       │  │ - Transport                 │   │
//! │  └────────┬──────────────┬─────────┘  └─────────────────────────────┘   │
//! │           │              │                                              │
//! │           ▼              ▼                                              │
//! │  ┌─────────────────┐  ┌─────────────┐  ┌─────────────┐                  │
//! │  │     Crypto      │  │     PoW     │  │   Address   │                  │
//! │  │                 │  │             │  │             │                  │
//! │  │ - RSA/P-256/    │  │ - Solver    │  │ - Parsing   │                  │
//! │  │   Ed25519 keys  │  │ - Validate  │  │ - Hashing   │                  │
//! │  │ - AES-GCM/CTR   │  │ - Cancel    │  │             │                  │
//! │  │ - Checksums     │  │             │  │             │                  │
//! │  └─────────────────┘  └─────────────┘  └─────────────┘                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`config`] - Core configuration
//! - [`address`] - Addresses and address hashes
//! - [`crypto`] - Keys, wrapping, ciphers, signatures, checksums
//! - [`pow`] - Proof-of-work solver and validator
//! - [`message`] - Header, catalog, composer, decryptor
//! - [`services`] - Vault, directory and transport seams
//! - [`time`] - Timestamps and expiry
//!
//! ## Security Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          SECURITY LAYERS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Layer 1: Catalog Key Wrapping                                         │
//! │  ─────────────────────────────                                          │
//! │  The catalog key is wrapped for the recipient with RSA-OAEP or an      │
//! │  ephemeral ECDH/X25519 exchange. Only the recipient can open it.       │
//! │                                                                         │
//! │  Layer 2: Catalog Encryption (AES-256-GCM)                             │
//! │  ─────────────────────────────────────────                              │
//! │  Subject, sender and part keys live in the catalog. Any modification   │
//! │  fails authentication.                                                 │
//! │                                                                         │
//! │  Layer 3: Part Encryption (AES-256-CTR)                                │
//! │  ──────────────────────────────────────                                 │
//! │  Every block and attachment has its own key and IV and streams         │
//! │  through the cipher. Catalog checksums detect modification.            │
//! │                                                                         │
//! │  Layer 4: Header Signatures                                            │
//! │  ──────────────────────────                                             │
//! │  The header is signed by the sender or by an authorized delegate.      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod address;
pub mod config;
pub mod crypto;
pub mod error;
pub mod message;
pub mod pow;
pub mod services;
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use address::{Address, AddressHash};
pub use config::CoreConfig;
pub use crypto::{KeyFamily, KeyPair, PrivateKey, PublicKey};
pub use error::{Error, Result};
pub use message::{Composer, DecryptedMessage, Decryptor, Envelope, Header};
pub use pow::ProofOfWork;

// ============================================================================
// VERSION INFO
// ============================================================================

/// Returns the version of BitMaelum Core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
