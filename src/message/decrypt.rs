//! # Decryptor
//!
//! Opens a received message with the recipient's private key.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           DECRYPT FLOW                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  header.catalog.encrypted_key ──► unwrap_key(private key, scheme)      │
//! │                                        │                                │
//! │                                        ▼                                │
//! │  encrypted catalog ──────────────► decode_catalog ──► Catalog          │
//! │                                                          │              │
//! │                                                          ▼              │
//! │  open_block(id) ──► factory(id) ──► DecryptingReader(descriptor key)   │
//! │                     (fetch now)     (decrypts as the caller reads)     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Part readers are single pass. Reading a part again means opening it
//! again, which calls the factory (and fetches) again.

use std::fmt;
use std::future::Future;
use std::io::Read;
use std::sync::Arc;

use bytes::Bytes;
use tokio::runtime::{Handle, RuntimeFlavor};

use super::catalog::{decode_catalog, Catalog};
use super::header::{verify_header, AuthorizedKeyCheck, Header, SignatureMode};
use crate::crypto::{unwrap_key, ChecksumSet, DecryptingReader, PrivateKey, StreamKey};
use crate::error::{Error, Result};
use crate::services::{Endpoint, MessageId, PartBody, Transport};

/// Produces the ciphertext stream of a part, given its id
pub type PartFactory = Box<dyn Fn(&str) -> Result<Box<dyn Read + Send>> + Send + Sync>;

// ============================================================================
// DECRYPTOR
// ============================================================================

/// A received header and catalog waiting for a private key
pub struct Decryptor {
    message_id: Option<MessageId>,
    header: Header,
    catalog: Bytes,
    blocks: PartFactory,
    attachments: PartFactory,
}

impl Decryptor {
    /// Wrap a header, its encrypted catalog and the part factories
    pub fn new(
        header: Header,
        encrypted_catalog: impl Into<Bytes>,
        block_factory: PartFactory,
        attachment_factory: PartFactory,
    ) -> Self {
        Self {
            message_id: None,
            header,
            catalog: encrypted_catalog.into(),
            blocks: block_factory,
            attachments: attachment_factory,
        }
    }

    /// Fetch header and catalog of a stored message
    ///
    /// Blocks and attachments are fetched later, when opened.
    pub async fn fetch(
        transport: Arc<dyn Transport>,
        endpoint: Endpoint,
        message_id: MessageId,
    ) -> Result<Self> {
        let header = Header::from_json(&transport.fetch_header(&endpoint, message_id).await?)?;
        let catalog = transport.fetch_catalog(&endpoint, message_id).await?;
        tracing::debug!("Fetched header and catalog of message {}", message_id);

        let blocks = remote_block_factory(Arc::clone(&transport), endpoint.clone(), message_id);
        let attachments = remote_attachment_factory(transport, endpoint, message_id);
        Ok(Self::new(header, catalog, blocks, attachments).with_message_id(message_id))
    }

    /// Record which message this is
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// The header, readable before decryption
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Unwrap the catalog key and decode the catalog
    ///
    /// ## Errors
    ///
    /// - `UnsupportedKeyFamily` if the header's scheme does not fit `key`
    /// - `AuthenticationFailure` for the wrong key or a tampered catalog
    /// - `ChecksumMismatch` if the header's catalog checksums disagree
    /// - `InvalidMessage` if the catalog names another sender key
    pub fn decrypt(self, key: &PrivateKey) -> Result<DecryptedMessage> {
        let info = &self.header.catalog;
        let catalog_key = unwrap_key(key, info.crypto, &info.encrypted_key)?;
        let catalog = decode_catalog(&catalog_key, &self.catalog)?;

        if info.size != self.catalog.len() as u64 {
            return Err(Error::ChecksumMismatch {
                part: "catalog".into(),
                algorithm: "size".into(),
            });
        }
        info.checksums.verify("catalog", &self.catalog)?;

        if catalog.from.public_key != self.header.from.public_key {
            return Err(Error::InvalidMessage(
                "catalog and header name different sender keys".into(),
            ));
        }

        tracing::debug!(
            "Decrypted catalog: {} blocks, {} attachments",
            catalog.blocks.len(),
            catalog.attachments.len()
        );
        Ok(DecryptedMessage {
            id: self.message_id,
            header: self.header,
            catalog,
            blocks: self.blocks,
            attachments: self.attachments,
        })
    }
}

impl fmt::Debug for Decryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decryptor")
            .field("message_id", &self.message_id)
            .field("header", &self.header)
            .field("catalog", &format!("{} bytes", self.catalog.len()))
            .finish()
    }
}

// ============================================================================
// DECRYPTED MESSAGE
// ============================================================================

/// A message whose catalog is open; parts are decrypted on demand
pub struct DecryptedMessage {
    id: Option<MessageId>,
    header: Header,
    catalog: Catalog,
    blocks: PartFactory,
    attachments: PartFactory,
}

impl DecryptedMessage {
    /// Message id, when known
    pub fn id(&self) -> Option<MessageId> {
        self.id
    }

    /// The header
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The decrypted catalog
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Verify the header signature against the decrypted sender
    pub fn verify_signature(&self, check: &dyn AuthorizedKeyCheck) -> Result<SignatureMode> {
        verify_header(&self.header, check)
    }

    /// Open a block for reading
    ///
    /// Calls the block factory now. `PartNotFound` if the catalog has no
    /// such block.
    pub fn open_block(&self, id: &str) -> Result<PartReader> {
        let descriptor = self
            .catalog
            .block(id)
            .ok_or_else(|| Error::PartNotFound(format!("block/{}", id)))?;
        PartReader::open(&self.blocks, id, descriptor.size, &descriptor.key)
    }

    /// Open an attachment for reading
    pub fn open_attachment(&self, id: &str) -> Result<PartReader> {
        let descriptor = self
            .catalog
            .attachment(id)
            .ok_or_else(|| Error::PartNotFound(format!("attachment/{}", id)))?;
        PartReader::open(&self.attachments, id, descriptor.size, &descriptor.key)
    }

    /// Read a whole block and check it against the catalog
    pub fn read_block_verified(&self, id: &str) -> Result<Vec<u8>> {
        let reader = self.open_block(id)?;
        let descriptor = self
            .catalog
            .block(id)
            .ok_or_else(|| Error::PartNotFound(format!("block/{}", id)))?;
        read_verified(reader, &descriptor.checksums)
    }

    /// Read a whole attachment and check it against the catalog
    pub fn read_attachment_verified(&self, id: &str) -> Result<Vec<u8>> {
        let reader = self.open_attachment(id)?;
        let descriptor = self
            .catalog
            .attachment(id)
            .ok_or_else(|| Error::PartNotFound(format!("attachment/{}", id)))?;
        read_verified(reader, &descriptor.checksums)
    }
}

impl fmt::Debug for DecryptedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedMessage")
            .field("id", &self.id)
            .field("header", &self.header)
            .field("catalog", &self.catalog)
            .finish()
    }
}

/// Initial buffer for verified reads; the catalog's size is not trusted
/// for allocation.
const READ_CAPACITY_LIMIT: u64 = 64 * 1024;

fn read_verified(reader: PartReader, checksums: &ChecksumSet) -> Result<Vec<u8>> {
    let id = reader.id().to_string();
    let size = reader.size();
    let mut plaintext = Vec::with_capacity(size.min(READ_CAPACITY_LIMIT) as usize);
    // One byte past the announced size is enough to detect an overrun
    reader
        .take(size.saturating_add(1))
        .read_to_end(&mut plaintext)?;

    if plaintext.len() as u64 != size {
        tracing::warn!(
            "Part {} announced {} bytes, stream held {}",
            id,
            size,
            plaintext.len()
        );
        return Err(Error::ChecksumMismatch {
            part: id,
            algorithm: "size".into(),
        });
    }
    if let Err(e) = checksums.verify(&id, &plaintext) {
        tracing::warn!("Part {} failed verification: {}", id, e);
        return Err(e);
    }
    Ok(plaintext)
}

// ============================================================================
// PART READER
// ============================================================================

/// Single-pass plaintext stream of one part
pub struct PartReader {
    id: String,
    size: u64,
    inner: DecryptingReader<Box<dyn Read + Send>>,
}

impl PartReader {
    fn open(factory: &PartFactory, id: &str, size: u64, key: &StreamKey) -> Result<Self> {
        let source = factory(id)?;
        Ok(Self {
            id: id.to_string(),
            size,
            inner: DecryptingReader::new(key, source),
        })
    }

    /// Part id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Plaintext size announced by the catalog
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Read for PartReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl fmt::Debug for PartReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartReader")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}

// ============================================================================
// TRANSPORT-BACKED FACTORIES
// ============================================================================

/// Run a part fetch to completion from synchronous code
///
/// ```text
/// multi-thread runtime   block_in_place + block_on (worker or blocking thread)
/// current-thread runtime TransportError (blocking its only thread would deadlock)
/// no runtime             runtime captured at factory creation, else futures executor
/// ```
fn fetch_blocking<F>(captured: Option<&Handle>, fetch: F) -> Result<PartBody>
where
    F: Future<Output = Result<PartBody>>,
{
    match Handle::try_current() {
        Ok(handle) => match handle.runtime_flavor() {
            RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(fetch))
            }
            _ => Err(Error::TransportError(
                "remote parts cannot be fetched synchronously on a current-thread runtime".into(),
            )),
        },
        Err(_) => match captured {
            Some(handle) => handle.block_on(fetch),
            None => futures::executor::block_on(fetch),
        },
    }
}

/// Fetch blocks from a transport when they are opened
///
/// Opening blocks the calling thread until the fetch completes. Inside a
/// multi-thread tokio runtime this is done with `block_in_place`; on a
/// current-thread runtime opening fails with `TransportError`.
pub fn remote_block_factory(
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    message_id: MessageId,
) -> PartFactory {
    let runtime = Handle::try_current().ok();
    Box::new(move |id: &str| {
        let fetch = transport.fetch_block(&endpoint, message_id, id);
        Ok(fetch_blocking(runtime.as_ref(), fetch)?.into_reader())
    })
}

/// Fetch attachments from a transport when they are opened
///
/// Same runtime rules as [`remote_block_factory`].
pub fn remote_attachment_factory(
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
    message_id: MessageId,
) -> PartFactory {
    let runtime = Handle::try_current().ok();
    Box::new(move |id: &str| {
        let fetch = transport.fetch_attachment(&endpoint, message_id, id);
        Ok(fetch_blocking(runtime.as_ref(), fetch)?.into_reader())
    })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyFamily;
    use crate::message::compose::tests::World;
    use crate::message::{AcceptSignedAuthorizations, Attachment, Block, Content, Envelope};
    use crate::services::PartId;
    use std::collections::HashMap;
    use std::io::{Cursor, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_util::sync::CancellationToken;

    fn memory_factory(parts: Arc<HashMap<String, Bytes>>, calls: Arc<AtomicUsize>) -> PartFactory {
        Box::new(move |id: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            let bytes = parts
                .get(id)
                .cloned()
                .ok_or_else(|| Error::PartNotFound(id.to_string()))?;
            Ok(Box::new(Cursor::new(bytes)) as Box<dyn Read + Send>)
        })
    }

    async fn send(world: &World, envelope: Envelope) -> (MessageId, Header) {
        let composed = world
            .composer()
            .send(envelope, &CancellationToken::new())
            .await
            .unwrap();
        (composed.message_id, composed.header)
    }

    async fn open(world: &World, id: MessageId) -> Decryptor {
        Decryptor::fetch(world.transport.clone(), endpoint(), id)
            .await
            .unwrap()
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            routing_id: "route-jane".into(),
            url: "https://jane.mail.example".into(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_round_trip_through_transport() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ed25519);
        let (id, header) = send(&world, world.envelope()).await;

        let decryptor = open(&world, id).await;
        assert_eq!(decryptor.header(), &header);

        // Parts are opened straight from async code
        let message = decryptor.decrypt(world.recipient.private_key()).unwrap();
        assert_eq!(message.id(), Some(id));
        let catalog = message.catalog();
        assert_eq!(catalog.subject, "Hello");

        let mut body = Vec::new();
        message
            .open_block(&catalog.blocks[0].id)
            .unwrap()
            .read_to_end(&mut body)
            .unwrap();
        assert_eq!(body, b"Hi Jane, numbers attached.");
        let csv = message
            .read_attachment_verified(&catalog.attachments[0].id)
            .unwrap();
        assert_eq!(csv, b"1,2,3\n4,5,6\n");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_remote_parts_from_blocking_thread() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ed25519);
        let (id, _) = send(&world, world.envelope()).await;
        let message = open(&world, id)
            .await
            .decrypt(world.recipient.private_key())
            .unwrap();

        let body = tokio::task::spawn_blocking(move || {
            let block = message.catalog().blocks[0].id.clone();
            message.read_block_verified(&block).unwrap()
        })
        .await
        .unwrap();
        assert_eq!(body, b"Hi Jane, numbers attached.");
    }

    #[tokio::test]
    async fn test_remote_parts_on_current_thread_runtime_fail_cleanly() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ed25519);
        let (id, _) = send(&world, world.envelope()).await;
        let message = open(&world, id)
            .await
            .decrypt(world.recipient.private_key())
            .unwrap();

        let block = message.catalog().blocks[0].id.clone();
        assert!(matches!(
            message.open_block(&block),
            Err(Error::TransportError(_))
        ));
    }

    #[tokio::test]
    async fn test_wrong_key_is_authentication_failure() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ed25519);
        let (id, _) = send(&world, world.envelope()).await;

        let stranger = crate::crypto::KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let result = open(&world, id).await.decrypt(stranger.private_key());
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[tokio::test]
    async fn test_key_family_mismatch() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ecdsa);
        let (id, _) = send(&world, world.envelope()).await;

        let ed25519 = crate::crypto::KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let result = open(&world, id).await.decrypt(ed25519.private_key());
        assert!(matches!(result, Err(Error::UnsupportedKeyFamily(_))));
    }

    #[tokio::test]
    async fn test_parts_are_fetched_lazily() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ed25519);
        let (id, header) = send(&world, world.envelope()).await;
        let catalog = world.transport.stored_part(id, &PartId::Catalog).unwrap();

        let decryptor = Decryptor::new(
            header.clone(),
            catalog.clone(),
            memory_factory(Arc::new(HashMap::new()), Arc::new(AtomicUsize::new(0))),
            memory_factory(Arc::new(HashMap::new()), Arc::new(AtomicUsize::new(0))),
        );
        let message = decryptor.decrypt(world.recipient.private_key()).unwrap();
        let block_id = message.catalog().blocks[0].id.clone();
        let attachment_id = message.catalog().attachments[0].id.clone();

        let mut parts = HashMap::new();
        parts.insert(
            block_id.clone(),
            world
                .transport
                .stored_part(id, &PartId::Block(block_id.clone()))
                .unwrap(),
        );
        parts.insert(
            attachment_id.clone(),
            world
                .transport
                .stored_part(id, &PartId::Attachment(attachment_id.clone()))
                .unwrap(),
        );
        let parts = Arc::new(parts);
        let block_calls = Arc::new(AtomicUsize::new(0));
        let attachment_calls = Arc::new(AtomicUsize::new(0));

        let message = Decryptor::new(
            header,
            catalog,
            memory_factory(parts.clone(), block_calls.clone()),
            memory_factory(parts, attachment_calls.clone()),
        )
        .decrypt(world.recipient.private_key())
        .unwrap();
        assert_eq!(block_calls.load(Ordering::SeqCst), 0);
        assert_eq!(attachment_calls.load(Ordering::SeqCst), 0);

        let mut reader = message.open_block(&block_id).unwrap();
        assert_eq!(block_calls.load(Ordering::SeqCst), 1);
        let mut first = Vec::new();
        reader.read_to_end(&mut first).unwrap();
        // Single pass: a drained reader yields nothing more
        let mut again = Vec::new();
        assert_eq!(reader.read_to_end(&mut again).unwrap(), 0);

        let second = message.read_block_verified(&block_id).unwrap();
        assert_eq!(first, second);
        assert_eq!(block_calls.load(Ordering::SeqCst), 2);
        assert_eq!(attachment_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tampered_part_is_checksum_mismatch() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ed25519);
        let (id, header) = send(&world, world.envelope()).await;
        let catalog = world.transport.stored_part(id, &PartId::Catalog).unwrap();

        let message = Decryptor::new(
            header.clone(),
            catalog.clone(),
            memory_factory(Arc::new(HashMap::new()), Arc::new(AtomicUsize::new(0))),
            memory_factory(Arc::new(HashMap::new()), Arc::new(AtomicUsize::new(0))),
        )
        .decrypt(world.recipient.private_key())
        .unwrap();
        let block_id = message.catalog().blocks[0].id.clone();

        let mut ciphertext = world
            .transport
            .stored_part(id, &PartId::Block(block_id.clone()))
            .unwrap()
            .to_vec();
        ciphertext[3] ^= 0x01;
        let mut parts = HashMap::new();
        parts.insert(block_id.clone(), Bytes::from(ciphertext));

        let message = Decryptor::new(
            header,
            catalog,
            memory_factory(Arc::new(parts), Arc::new(AtomicUsize::new(0))),
            memory_factory(Arc::new(HashMap::new()), Arc::new(AtomicUsize::new(0))),
        )
        .decrypt(world.recipient.private_key())
        .unwrap();

        let err = message.read_block_verified(&block_id).unwrap_err();
        assert!(err.is_integrity_failure());
        assert!(matches!(err, Error::ChecksumMismatch { ref part, .. } if *part == block_id));
    }

    #[tokio::test]
    async fn test_tampered_catalog_is_authentication_failure() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ed25519);
        let (id, header) = send(&world, world.envelope()).await;
        let mut catalog = world
            .transport
            .stored_part(id, &PartId::Catalog)
            .unwrap()
            .to_vec();
        let last = catalog.len() - 1;
        catalog[last] ^= 0x80;

        let result = Decryptor::new(
            header,
            catalog,
            memory_factory(Arc::new(HashMap::new()), Arc::new(AtomicUsize::new(0))),
            memory_factory(Arc::new(HashMap::new()), Arc::new(AtomicUsize::new(0))),
        )
        .decrypt(world.recipient.private_key());
        assert!(matches!(result, Err(Error::AuthenticationFailure(_))));
    }

    #[tokio::test]
    async fn test_unknown_part_is_not_found() {
        let world = World::new(KeyFamily::Ed25519, KeyFamily::Ed25519);
        let (id, _) = send(&world, world.envelope()).await;
        let message = open(&world, id)
            .await
            .decrypt(world.recipient.private_key())
            .unwrap();

        assert!(matches!(
            message.open_block("no-such-block"),
            Err(Error::PartNotFound(_))
        ));
        assert!(matches!(
            message.read_attachment_verified("no-such-attachment"),
            Err(Error::PartNotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_simple_rsa_message() {
        let world = World::new(KeyFamily::Rsa, KeyFamily::Rsa);
        let envelope = Envelope::new(world.from.clone(), "John", world.to.clone(), "RSA")
            .block(Block::text("plain old rsa"));
        let (id, _) = send(&world, envelope).await;

        let decryptor = open(&world, id).await;
        assert_eq!(
            decryptor.header().catalog.crypto,
            crate::crypto::EncryptionScheme::RsaOaep
        );
        let message = decryptor.decrypt(world.recipient.private_key()).unwrap();
        assert_eq!(
            message.verify_signature(&AcceptSignedAuthorizations).unwrap(),
            SignatureMode::Origin
        );
        let block = message.catalog().blocks[0].id.clone();
        let body = message.read_block_verified(&block).unwrap();
        assert_eq!(body, b"plain old rsa");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ten_kilobyte_file_attachment() {
        let world = World::new(KeyFamily::Ecdsa, KeyFamily::Ecdsa);
        let data: Vec<u8> = (0..10 * 1024).map(|i| (i % 251) as u8).collect();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&data).unwrap();

        let envelope = Envelope::new(world.from.clone(), "John", world.to.clone(), "file")
            .block(Block::text("see attached"))
            .attachment(Attachment::new(
                "data.bin",
                "application/octet-stream",
                Content::File(file.path().to_path_buf()),
            ));
        let (id, _) = send(&world, envelope).await;

        let decryptor = open(&world, id).await;
        let message = decryptor.decrypt(world.recipient.private_key()).unwrap();
        let descriptor = message.catalog().attachments[0].clone();
        let read = message.read_attachment_verified(&descriptor.id).unwrap();

        assert_eq!(descriptor.size, 10 * 1024);
        assert_eq!(descriptor.checksums, ChecksumSet::compute(&data));
        assert_eq!(read, data);
    }

    /// A message whose only block announces `size` but carries `body`
    fn announced_size(size: u64, body: &[u8]) -> (DecryptedMessage, String) {
        use crate::crypto::{wrap_key, EncryptingReader, KeyPair};
        use crate::message::catalog::tests::sample_catalog;
        use crate::message::{encode_catalog, HeaderBuilder};

        let recipient = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let (key, mut reader) = EncryptingReader::new(Cursor::new(body.to_vec()));
        let mut ciphertext = Vec::new();
        reader.read_to_end(&mut ciphertext).unwrap();

        let mut catalog = sample_catalog();
        let block_id = catalog.blocks[0].id.clone();
        catalog.blocks[0].key = key;
        catalog.blocks[0].size = size;
        catalog.blocks[0].checksums = ChecksumSet::compute(body);

        let (catalog_key, blob) = encode_catalog(&catalog).unwrap();
        let (scheme, wrapped) = wrap_key(recipient.public_key(), &catalog_key).unwrap();
        let header = HeaderBuilder::new(
            catalog.from.address.hash(),
            catalog.from.public_key.clone(),
            catalog.to.address.hash(),
        )
        .catalog(&blob, scheme, wrapped)
        .build()
        .unwrap();

        let mut parts = HashMap::new();
        parts.insert(block_id.clone(), Bytes::from(ciphertext));
        let message = Decryptor::new(
            header,
            blob,
            memory_factory(Arc::new(parts), Arc::new(AtomicUsize::new(0))),
            memory_factory(Arc::new(HashMap::new()), Arc::new(AtomicUsize::new(0))),
        )
        .decrypt(recipient.private_key())
        .unwrap();
        (message, block_id)
    }

    fn is_size_mismatch(result: Result<Vec<u8>>) -> bool {
        matches!(result, Err(Error::ChecksumMismatch { ref algorithm, .. }) if algorithm == "size")
    }

    #[test]
    fn test_announced_size_matches() {
        let (message, id) = announced_size(11, b"hello world");
        assert_eq!(message.read_block_verified(&id).unwrap(), b"hello world");
    }

    #[test]
    fn test_huge_announced_size_is_mismatch() {
        let (message, id) = announced_size(u64::MAX, b"hello world");
        assert!(is_size_mismatch(message.read_block_verified(&id)));
    }

    #[test]
    fn test_stream_longer_than_announced() {
        let (message, id) = announced_size(10, b"hello world");
        assert!(is_size_mismatch(message.read_block_verified(&id)));
    }

    #[test]
    fn test_stream_shorter_than_announced() {
        let (message, id) = announced_size(12, b"hello world");
        assert!(is_size_mismatch(message.read_block_verified(&id)));
    }
}
