//! # Error Handling
//!
//! This module provides the error type shared by every part of the core.
//!
//! ## Error Hierarchy
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ERROR HIERARCHY                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Error (top-level)                                                     │
//! │  │                                                                      │
//! │  ├── Key Errors                                                        │
//! │  │   ├── UnsupportedKeyFamily  - Operation not offered by the family   │
//! │  │   ├── InvalidKey            - Malformed key material                │
//! │  │   └── KeyNotFound           - Vault has no active key               │
//! │  │                                                                      │
//! │  ├── Crypto Errors                                                     │
//! │  │   ├── AuthenticationFailure - AEAD tag mismatch / wrong key         │
//! │  │   ├── ChecksumMismatch      - Decrypted part differs from record    │
//! │  │   ├── SigningFailed         - Signature could not be produced       │
//! │  │   ├── VerificationFailed    - Signature did not verify              │
//! │  │   └── ProofOfWorkInvalid    - Proof does not meet its difficulty    │
//! │  │                                                                      │
//! │  ├── Delivery Errors                                                   │
//! │  │   ├── DirectoryResolutionFailure - Recipient / routing lookup       │
//! │  │   ├── PartialUploadFailure  - Some parts failed, rolled back        │
//! │  │   ├── TransportError        - Single transport call failed          │
//! │  │   ├── PartNotFound          - Part does not exist                   │
//! │  │   └── Cancelled             - Caller cancelled the operation        │
//! │  │                                                                      │
//! │  └── Internal Errors                                                   │
//! │      ├── InvalidAddress / InvalidMessage                               │
//! │      ├── SerializationError / DeserializationError                     │
//! │      └── Io / Internal                                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Authentication and checksum failures are terminal. They are never
//! retried automatically and never downgraded to warnings.

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the core
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Key Errors (100-199)
    // ========================================================================

    /// The key family cannot perform the requested operation
    #[error("Unsupported key family: {0}")]
    UnsupportedKeyFamily(String),

    /// Malformed or wrongly sized key material
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The vault has no active key for the identity
    #[error("No active key for {0}")]
    KeyNotFound(String),

    // ========================================================================
    // Crypto Errors (200-299)
    // ========================================================================

    /// Authenticated decryption failed (wrong key or tampering)
    #[error("Authentication failure: {0}")]
    AuthenticationFailure(String),

    /// A decrypted part does not match its recorded checksum
    #[error("Checksum mismatch for {part}: {algorithm} differs")]
    ChecksumMismatch {
        /// Identifier of the part that failed verification
        part: String,
        /// Name of the first digest that differed
        algorithm: String,
    },

    /// Signing failed
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    /// Signature verification failed
    #[error("Signature verification failed: {0}")]
    VerificationFailed(String),

    /// Proof-of-work validation failed
    #[error("Proof of work invalid: {0}")]
    ProofOfWorkInvalid(String),

    // ========================================================================
    // Delivery Errors (300-399)
    // ========================================================================

    /// Recipient or routing lookup failed
    #[error("Directory resolution failed: {0}")]
    DirectoryResolutionFailure(String),

    /// One or more parts failed after others succeeded. The message has
    /// been deleted from the remote store (best effort).
    #[error("Upload of message {message_id} failed at part {part}: {reason}")]
    PartialUploadFailure {
        /// Message whose parts were rolled back
        message_id: String,
        /// First part that failed
        part: String,
        /// Error reported for that part
        reason: String,
        /// Whether the rollback delete itself succeeded
        rolled_back: bool,
    },

    /// A single transport call failed
    #[error("Transport error: {0}")]
    TransportError(String),

    /// The requested part or message does not exist
    #[error("Not found: {0}")]
    PartNotFound(String),

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    // ========================================================================
    // Internal Errors (900-999)
    // ========================================================================

    /// Address failed validation
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Message content failed validation
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// I/O error while reading a part
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Get the numeric error code
    ///
    /// Error codes are organized by category:
    /// - 100-199: Keys
    /// - 200-299: Crypto
    /// - 300-399: Delivery
    /// - 900-999: Internal
    pub fn code(&self) -> i32 {
        match self {
            // Keys (100-199)
            Error::UnsupportedKeyFamily(_) => 100,
            Error::InvalidKey(_) => 101,
            Error::KeyNotFound(_) => 102,

            // Crypto (200-299)
            Error::AuthenticationFailure(_) => 200,
            Error::ChecksumMismatch { .. } => 201,
            Error::SigningFailed(_) => 202,
            Error::VerificationFailed(_) => 203,
            Error::ProofOfWorkInvalid(_) => 204,

            // Delivery (300-399)
            Error::DirectoryResolutionFailure(_) => 300,
            Error::PartialUploadFailure { .. } => 301,
            Error::TransportError(_) => 302,
            Error::PartNotFound(_) => 303,
            Error::Cancelled => 304,

            // Internal (900-999)
            Error::InvalidAddress(_) => 900,
            Error::InvalidMessage(_) => 901,
            Error::SerializationError(_) => 902,
            Error::DeserializationError(_) => 903,
            Error::Io(_) => 904,
            Error::Internal(_) => 999,
        }
    }

    /// Check if this error is recoverable
    ///
    /// Recoverable errors can be retried later without user action.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::DirectoryResolutionFailure(_)
                | Error::PartialUploadFailure { .. }
                | Error::TransportError(_)
        )
    }

    /// Check if this error indicates a wrong key or tampered data
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            Error::AuthenticationFailure(_)
                | Error::ChecksumMismatch { .. }
                | Error::VerificationFailed(_)
        )
    }
}

// ============================================================================
// ERROR CONVERSIONS
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::DeserializationError(err.to_string())
        } else {
            Error::SerializationError(err.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
