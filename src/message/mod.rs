//! # Messages
//!
//! Turning a composed message into an encrypted, signed bundle and back.
//!
//! ## Bundle Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         MESSAGE BUNDLE                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  HEADER (JSON, readable by servers)                                    │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ from: address hash, public key, proof of work                   │   │
//! │  │ to:   address hash                                              │   │
//! │  │ catalog: size, checksums, scheme tag, wrapped catalog key       │   │
//! │  │ signature, authorized_by                                        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  CATALOG (AES-256-GCM under the catalog key)                           │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │ subject, flags, labels, thread, sender, recipient               │   │
//! │  │ blocks:      [ id, type, size, key + IV, checksums ] ...        │   │
//! │  │ attachments: [ id, name, mime, size, key + IV, checksums ] ...  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  BLOCKS / ATTACHMENTS (AES-256-CTR, one key + IV each)                 │
//! │  ┌────────────┐ ┌────────────┐ ┌────────────┐                           │
//! │  │  block 0   │ │  block 1   │ │ attachment │ ...                       │
//! │  └────────────┘ └────────────┘ └────────────┘                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Submodules
//!
//! - [`catalog`] - catalog model and its AEAD codec
//! - [`header`] - header model, signing modes, authorizations
//! - [`compose`] - resolve, encode and upload as one transaction
//! - [`decrypt`] - unwrap, decode and stream parts back out

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use bytes::{Buf, Bytes};

use crate::error::Result;

pub mod catalog;
pub mod compose;
pub mod decrypt;
pub mod header;

pub use catalog::{
    decode_catalog, encode_catalog, AttachmentDescriptor, BlockDescriptor, Catalog,
    CatalogRecipient, CatalogSender,
};
pub use compose::{ComposeEvent, ComposeState, Composed, Composer, Delegation, Envelope};
pub use decrypt::{
    remote_attachment_factory, remote_block_factory, DecryptedMessage, Decryptor, PartFactory,
    PartReader,
};
pub use header::{
    sign_header, sign_header_on_behalf, verify_header, AcceptSignedAuthorizations,
    Authorization, AuthorizedKeyCheck, AuthorizedKeys, CatalogInfo, Header, HeaderBuilder,
    HeaderRecipient, HeaderSender, SignatureMode,
};

/// Block type used for plain body text
pub const DEFAULT_BLOCK_TYPE: &str = "default";

/// MIME type used when an attachment does not name one
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

// ============================================================================
// CONTENT SOURCE
// ============================================================================

/// Where a block or attachment body comes from
///
/// File-backed content is opened twice while composing: once to compute
/// checksums, once to encrypt. It is never buffered whole.
#[derive(Clone, PartialEq, Eq)]
pub enum Content {
    /// Bytes already in memory
    Memory(Bytes),
    /// A file on disk
    File(PathBuf),
}

impl Content {
    /// Open a fresh reader over the content
    pub fn open(&self) -> Result<Box<dyn Read + Send>> {
        match self {
            Self::Memory(bytes) => Ok(Box::new(bytes.clone().reader())),
            Self::File(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
        }
    }

    /// Content length in bytes
    pub fn size(&self) -> Result<u64> {
        match self {
            Self::Memory(bytes) => Ok(bytes.len() as u64),
            Self::File(path) => Ok(std::fs::metadata(path)?.len()),
        }
    }
}

impl fmt::Debug for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory(bytes) => write!(f, "Content::Memory({} bytes)", bytes.len()),
            Self::File(path) => write!(f, "Content::File({})", path.display()),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Memory(Bytes::copy_from_slice(text.as_bytes()))
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Memory(Bytes::from(text))
    }
}

impl From<Vec<u8>> for Content {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Memory(Bytes::from(bytes))
    }
}

impl From<Bytes> for Content {
    fn from(bytes: Bytes) -> Self {
        Self::Memory(bytes)
    }
}

// ============================================================================
// COMPOSED PARTS
// ============================================================================

/// A body block as composed by the sender
#[derive(Debug, Clone)]
pub struct Block {
    /// Block type ("default", "html", a MIME type, ...)
    pub kind: String,
    /// Body
    pub content: Content,
}

impl Block {
    /// A block of the given type
    pub fn new(kind: impl Into<String>, content: impl Into<Content>) -> Self {
        Self {
            kind: kind.into(),
            content: content.into(),
        }
    }

    /// A plain text block of type [`DEFAULT_BLOCK_TYPE`]
    pub fn text(body: impl Into<Content>) -> Self {
        Self::new(DEFAULT_BLOCK_TYPE, body)
    }
}

/// A file attached by the sender
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name shown to the recipient
    pub filename: String,
    /// MIME type
    pub mime_type: String,
    /// Body
    pub content: Content,
}

impl Attachment {
    /// An attachment with explicit name and type
    pub fn new(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        content: impl Into<Content>,
    ) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    /// Attach a file from disk, named after its last path component
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        Self::new(filename, DEFAULT_MIME_TYPE, Content::File(path.to_path_buf()))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn read_all(content: &Content) -> Vec<u8> {
        let mut out = Vec::new();
        content.open().unwrap().read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_memory_content_reopens() {
        let content = Content::from("hello");
        assert_eq!(content.size().unwrap(), 5);
        assert_eq!(read_all(&content), b"hello");
        assert_eq!(read_all(&content), b"hello");
    }

    #[test]
    fn test_file_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[7u8; 1234]).unwrap();

        let content = Content::File(file.path().to_path_buf());
        assert_eq!(content.size().unwrap(), 1234);
        assert_eq!(read_all(&content), vec![7u8; 1234]);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let content = Content::File(PathBuf::from("/definitely/not/here.bin"));
        assert!(matches!(content.open(), Err(crate::Error::Io(_))));
        assert!(content.size().is_err());
    }

    #[test]
    fn test_attachment_from_path() {
        let attachment = Attachment::from_path("/tmp/report.pdf");
        assert_eq!(attachment.filename, "report.pdf");
        assert_eq!(attachment.mime_type, DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_text_block() {
        let block = Block::text("body");
        assert_eq!(block.kind, DEFAULT_BLOCK_TYPE);
    }
}
