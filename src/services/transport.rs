//! Mail server transport seam.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    UPLOAD TRANSACTION (per message)                     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   upload_part(header)  ┐                                               │
//! │   upload_part(catalog) │  any order, concurrently                      │
//! │   upload_part(block/…) │                                               │
//! │   upload_part(attach/…)┘                                               │
//! │            │                                                            │
//! │            ├── all ok ──► complete_upload   (message becomes visible)  │
//! │            └── any err ─► delete_message    (best effort rollback)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Uploaded parts are raw bytes: JSON for the header, `nonce ‖ ct ‖ tag` for
//! the catalog, unframed CTR ciphertext for blocks and attachments.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use parking_lot::RwLock;

use super::resolver::Endpoint;
use super::MessageId;
use crate::error::{Error, Result};

/// One uploadable piece of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PartId {
    /// The signed header (JSON)
    Header,
    /// The encrypted catalog
    Catalog,
    /// An encrypted block, by block id
    Block(String),
    /// An encrypted attachment, by attachment id
    Attachment(String),
}

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header => f.write_str("header"),
            Self::Catalog => f.write_str("catalog"),
            Self::Block(id) => write!(f, "block/{}", id),
            Self::Attachment(id) => write!(f, "attachment/{}", id),
        }
    }
}

/// Body of an uploaded or fetched part
pub enum PartBody {
    /// Fully buffered bytes
    Bytes(Bytes),
    /// A single-pass stream
    Reader(Box<dyn Read + Send>),
}

impl PartBody {
    /// Read the whole body into memory
    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            Self::Bytes(bytes) => Ok(bytes),
            Self::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                Ok(Bytes::from(buf))
            }
        }
    }

    /// View the body as a reader
    pub fn into_reader(self) -> Box<dyn Read + Send> {
        match self {
            Self::Bytes(bytes) => Box::new(bytes.reader()),
            Self::Reader(reader) => reader,
        }
    }
}

impl fmt::Debug for PartBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => write!(f, "PartBody::Bytes({} bytes)", bytes.len()),
            Self::Reader(_) => f.write_str("PartBody::Reader(..)"),
        }
    }
}

/// Upload and retrieval of message parts on a mail server
#[async_trait]
pub trait Transport: Send + Sync {
    /// Store one part of an incomplete message
    async fn upload_part(
        &self,
        endpoint: &Endpoint,
        message_id: MessageId,
        part: &PartId,
        body: PartBody,
    ) -> Result<()>;

    /// Remove every part of a message
    async fn delete_message(&self, endpoint: &Endpoint, message_id: MessageId) -> Result<()>;

    /// Mark a message as fully uploaded
    async fn complete_upload(&self, endpoint: &Endpoint, message_id: MessageId) -> Result<()>;

    /// Fetch the header of a completed message
    async fn fetch_header(&self, endpoint: &Endpoint, message_id: MessageId) -> Result<Bytes>;

    /// Fetch the encrypted catalog of a completed message
    async fn fetch_catalog(&self, endpoint: &Endpoint, message_id: MessageId) -> Result<Bytes>;

    /// Fetch an encrypted block of a completed message
    async fn fetch_block(
        &self,
        endpoint: &Endpoint,
        message_id: MessageId,
        block_id: &str,
    ) -> Result<PartBody>;

    /// Fetch an encrypted attachment of a completed message
    async fn fetch_attachment(
        &self,
        endpoint: &Endpoint,
        message_id: MessageId,
        attachment_id: &str,
    ) -> Result<PartBody>;
}

// ============================================================================
// IN-MEMORY TRANSPORT
// ============================================================================

type PartFilter = Box<dyn Fn(&PartId) -> bool + Send + Sync>;

#[derive(Default)]
struct StoredMessage {
    url: String,
    parts: HashMap<PartId, Bytes>,
    completed: bool,
}

/// In-memory mail server with failure injection
///
/// ```text
/// fail_uploads_matching(f)   uploads of parts where f(part) is true fail
/// set_upload_delay(d)        successful uploads sleep d before storing
/// set_fail_delete(true)      delete_message fails (rollback not possible)
/// set_fail_complete(true)    complete_upload fails
/// ```
#[derive(Default)]
pub struct InMemoryTransport {
    messages: RwLock<HashMap<MessageId, StoredMessage>>,
    failing: RwLock<Option<PartFilter>>,
    upload_delay: RwLock<Option<Duration>>,
    fail_delete: AtomicBool,
    fail_complete: AtomicBool,
    uploads: AtomicUsize,
    deleted: RwLock<HashSet<MessageId>>,
}

impl InMemoryTransport {
    /// Create an empty server
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every upload whose part matches `filter`
    pub fn fail_uploads_matching<F>(&self, filter: F)
    where
        F: Fn(&PartId) -> bool + Send + Sync + 'static,
    {
        *self.failing.write() = Some(Box::new(filter));
    }

    /// Delay successful uploads
    pub fn set_upload_delay(&self, delay: Option<Duration>) {
        *self.upload_delay.write() = delay;
    }

    /// Make `delete_message` fail
    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    /// Make `complete_upload` fail
    pub fn set_fail_complete(&self, fail: bool) {
        self.fail_complete.store(fail, Ordering::SeqCst);
    }

    /// Whether any part of the message is stored
    pub fn contains(&self, message_id: MessageId) -> bool {
        self.messages.read().contains_key(&message_id)
    }

    /// Whether the message was completed
    pub fn is_completed(&self, message_id: MessageId) -> bool {
        self.messages
            .read()
            .get(&message_id)
            .map(|m| m.completed)
            .unwrap_or(false)
    }

    /// Whether `delete_message` succeeded for the message
    pub fn was_deleted(&self, message_id: MessageId) -> bool {
        self.deleted.read().contains(&message_id)
    }

    /// Stored body of a part, completed or not
    pub fn stored_part(&self, message_id: MessageId, part: &PartId) -> Option<Bytes> {
        self.messages
            .read()
            .get(&message_id)
            .and_then(|m| m.parts.get(part).cloned())
    }

    /// Number of parts stored for the message
    pub fn part_count(&self, message_id: MessageId) -> usize {
        self.messages
            .read()
            .get(&message_id)
            .map(|m| m.parts.len())
            .unwrap_or(0)
    }

    /// Number of successful uploads so far
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    fn should_fail(&self, part: &PartId) -> bool {
        self.failing
            .read()
            .as_ref()
            .map(|filter| filter(part))
            .unwrap_or(false)
    }

    fn fetch(&self, endpoint: &Endpoint, message_id: MessageId, part: &PartId) -> Result<Bytes> {
        let messages = self.messages.read();
        let message = messages
            .get(&message_id)
            .filter(|m| m.completed && m.url == endpoint.url)
            .ok_or_else(|| Error::PartNotFound(format!("message {}", message_id)))?;

        message
            .parts
            .get(part)
            .cloned()
            .ok_or_else(|| Error::PartNotFound(format!("{} of message {}", part, message_id)))
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn upload_part(
        &self,
        endpoint: &Endpoint,
        message_id: MessageId,
        part: &PartId,
        body: PartBody,
    ) -> Result<()> {
        if self.should_fail(part) {
            return Err(Error::TransportError(format!("upload of {} rejected", part)));
        }

        let delay = *self.upload_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let bytes = match body {
            PartBody::Bytes(bytes) => bytes,
            reader => tokio::task::spawn_blocking(move || reader.into_bytes())
                .await
                .map_err(|e| Error::Internal(format!("reader task failed: {}", e)))??,
        };

        let mut messages = self.messages.write();
        let message = messages.entry(message_id).or_default();
        if message.completed {
            return Err(Error::TransportError(format!(
                "message {} is already complete",
                message_id
            )));
        }
        message.url = endpoint.url.clone();
        message.parts.insert(part.clone(), bytes);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_message(&self, _endpoint: &Endpoint, message_id: MessageId) -> Result<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::TransportError("delete rejected".into()));
        }
        self.messages.write().remove(&message_id);
        self.deleted.write().insert(message_id);
        Ok(())
    }

    async fn complete_upload(&self, _endpoint: &Endpoint, message_id: MessageId) -> Result<()> {
        if self.fail_complete.load(Ordering::SeqCst) {
            return Err(Error::TransportError("complete rejected".into()));
        }
        let mut messages = self.messages.write();
        let message = messages
            .get_mut(&message_id)
            .ok_or_else(|| Error::PartNotFound(format!("message {}", message_id)))?;
        message.completed = true;
        Ok(())
    }

    async fn fetch_header(&self, endpoint: &Endpoint, message_id: MessageId) -> Result<Bytes> {
        self.fetch(endpoint, message_id, &PartId::Header)
    }

    async fn fetch_catalog(&self, endpoint: &Endpoint, message_id: MessageId) -> Result<Bytes> {
        self.fetch(endpoint, message_id, &PartId::Catalog)
    }

    async fn fetch_block(
        &self,
        endpoint: &Endpoint,
        message_id: MessageId,
        block_id: &str,
    ) -> Result<PartBody> {
        self.fetch(endpoint, message_id, &PartId::Block(block_id.to_string()))
            .map(PartBody::Bytes)
    }

    async fn fetch_attachment(
        &self,
        endpoint: &Endpoint,
        message_id: MessageId,
        attachment_id: &str,
    ) -> Result<PartBody> {
        self.fetch(endpoint, message_id, &PartId::Attachment(attachment_id.to_string()))
            .map(PartBody::Bytes)
    }
}

// ============================================================================
// TESTS
// ============================================================================
