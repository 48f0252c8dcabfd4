//! # Composer
//!
//! Resolves, encrypts and uploads a message as one transaction.
//!
//! ## State Machine
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        COMPOSE STATE MACHINE                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Resolving ──────► Encoding ──────► Uploading ──────► Completed        │
//! │      │                 │                │                               │
//! │      │ lookup fails    │ encode fails   │ any part fails / cancelled   │
//! │      ▼                 ▼                ▼                               │
//! │   DirectoryResolution  error        abort remaining uploads            │
//! │   Failure (nothing     (nothing     delete_message (best effort)       │
//! │   created)             uploaded)        │                               │
//! │                                         ▼                               │
//! │                                     RolledBack                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Upload Fan-out
//!
//! ```text
//!   message id (UUID v4, allocated first)
//!        │
//!        ├──► task: header          ┐
//!        ├──► task: catalog         │  JoinSet
//!        ├──► task: block/<id> ...  │  first error → abort_all
//!        └──► task: attachment/<id> ┘
//!        │
//!        └──► complete_upload  (only after every task succeeded)
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::catalog::{encode_catalog, AttachmentDescriptor, BlockDescriptor, Catalog};
use super::catalog::{CatalogRecipient, CatalogSender};
use super::header::{sign_header, sign_header_on_behalf, Authorization, Header, HeaderBuilder};
use super::{Attachment, Block};
use crate::address::Address;
use crate::config::CoreConfig;
use crate::crypto::{wrap_key, ChecksumAlgorithm, ChecksumSet, EncryptingReader, KeyPair, PublicKey};
use crate::error::{Error, Result};
use crate::pow::ProofOfWork;
use crate::services::{
    DirectoryLookup, Endpoint, MessageId, PartBody, PartId, PrivateKeyProvider, Transport,
};

// ============================================================================
// STATE & EVENTS
// ============================================================================

/// Where a composition currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComposeState {
    /// Looking up recipient, routing and sender keys
    Resolving,
    /// Building catalog, header and part streams
    Encoding,
    /// Parts are being uploaded
    Uploading,
    /// Every part uploaded and the upload completed
    Completed,
    /// Uploading failed and the message was deleted (best effort)
    RolledBack,
}

impl ComposeState {
    /// Whether no further transition can happen
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::RolledBack)
    }
}

/// Progress notifications for the application layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ComposeEvent {
    /// The composition entered a new state
    StateChanged {
        /// Message being composed
        message_id: MessageId,
        /// New state
        state: ComposeState,
    },
    /// One part finished uploading
    PartUploaded {
        /// Message being composed
        message_id: MessageId,
        /// The part, e.g. `block/<id>`
        part: String,
    },
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// A delegate key and the authorization that lets it sign for the sender
#[derive(Debug, Clone)]
pub struct Delegation {
    /// Delegate keypair
    pub key: KeyPair,
    /// Origin-signed authorization naming the delegate
    pub authorization: Authorization,
}

/// A message as composed by the sender
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Sender address
    pub from: Address,
    /// Sender display name
    pub from_name: String,
    /// Recipient address
    pub to: Address,
    /// Recipient display name
    pub to_name: Option<String>,
    /// Subject line
    pub subject: String,
    /// Flags
    pub flags: Vec<String>,
    /// Labels
    pub labels: Vec<String>,
    /// Thread id
    pub thread_id: Option<String>,
    /// Body blocks
    pub blocks: Vec<Block>,
    /// Attachments
    pub attachments: Vec<Attachment>,
    /// Sender's proof of work
    pub proof_of_work: Option<ProofOfWork>,
    /// Sign with a delegate key instead of the sender's own key
    pub delegation: Option<Delegation>,
}

impl Envelope {
    /// A message with no blocks or attachments yet
    pub fn new(
        from: Address,
        from_name: impl Into<String>,
        to: Address,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            from,
            from_name: from_name.into(),
            to,
            to_name: None,
            subject: subject.into(),
            flags: Vec::new(),
            labels: Vec::new(),
            thread_id: None,
            blocks: Vec::new(),
            attachments: Vec::new(),
            proof_of_work: None,
            delegation: None,
        }
    }

    /// Append a block
    pub fn block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Append an attachment
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Attach the sender's proof of work
    pub fn proof_of_work(mut self, pow: ProofOfWork) -> Self {
        self.proof_of_work = Some(pow);
        self
    }

    /// Sign with a delegate key
    pub fn on_behalf(mut self, delegation: Delegation) -> Self {
        self.delegation = Some(delegation);
        self
    }
}

/// A message that was uploaded and completed
#[derive(Debug, Clone)]
pub struct Composed {
    /// Id allocated for the message
    pub message_id: MessageId,
    /// The uploaded header
    pub header: Header,
    /// Server the message was uploaded to
    pub endpoint: Endpoint,
    /// Always [`ComposeState::Completed`]
    pub state: ComposeState,
}

/// Keys and routing gathered while resolving
struct Resolved {
    endpoint: Endpoint,
    recipient_key: PublicKey,
    sender_public: PublicKey,
    signer: Signer,
}

enum Signer {
    Origin(KeyPair),
    Delegate(Delegation),
}

/// Everything ready to upload
struct Encoded {
    header: Header,
    parts: Vec<(PartId, PartBody)>,
}

// ============================================================================
// COMPOSER
// ============================================================================

/// Runs compositions against a vault, a directory and a transport
pub struct Composer {
    config: CoreConfig,
    vault: Arc<dyn PrivateKeyProvider>,
    directory: Arc<dyn DirectoryLookup>,
    transport: Arc<dyn Transport>,
    events: Option<mpsc::UnboundedSender<ComposeEvent>>,
}

impl Composer {
    /// Create a composer
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        config: CoreConfig,
        vault: Arc<dyn PrivateKeyProvider>,
        directory: Arc<dyn DirectoryLookup>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            vault,
            directory,
            transport,
            events: None,
        })
    }

    /// Receive [`ComposeEvent`]s for every later composition
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ComposeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    fn emit(&self, event: ComposeEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn enter(&self, message_id: MessageId, state: ComposeState) {
        tracing::debug!("Message {} → {:?}", message_id, state);
        self.emit(ComposeEvent::StateChanged { message_id, state });
    }

    /// Compose and upload a message
    ///
    /// ## Errors
    ///
    /// - `DirectoryResolutionFailure` if recipient or routing lookup fails
    /// - `KeyNotFound` if the vault has no key for the sender
    /// - `InvalidMessage` / `Io` / key errors while encoding
    /// - `PartialUploadFailure` if any upload (or the completion) fails
    /// - `Cancelled` if `cancel` fires; uploads are rolled back first
    pub async fn send(&self, envelope: Envelope, cancel: &CancellationToken) -> Result<Composed> {
        let message_id = MessageId::new_v4();
        tracing::info!("Composing message {} to {}", message_id, envelope.to.hash());

        self.enter(message_id, ComposeState::Resolving);
        let resolved = self.resolve(&envelope).await?;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.enter(message_id, ComposeState::Encoding);
        let config = self.config.clone();
        let Resolved {
            endpoint,
            recipient_key,
            sender_public,
            signer,
        } = resolved;
        let encoded = tokio::task::spawn_blocking(move || {
            encode(&config, envelope, &recipient_key, sender_public, signer)
        })
        .await
        .map_err(|e| Error::Internal(format!("encoding task failed: {}", e)))??;
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.enter(message_id, ComposeState::Uploading);
        self.upload(message_id, &endpoint, encoded.parts, cancel).await?;

        self.enter(message_id, ComposeState::Completed);
        tracing::info!("Message {} delivered to {}", message_id, endpoint.url);
        Ok(Composed {
            message_id,
            header: encoded.header,
            endpoint,
            state: ComposeState::Completed,
        })
    }

    async fn resolve(&self, envelope: &Envelope) -> Result<Resolved> {
        let record = self
            .directory
            .resolve_address(&envelope.to.hash())
            .await
            .map_err(as_resolution_failure)?;
        let endpoint = self
            .directory
            .resolve_routing(&record.routing_id)
            .await
            .map_err(as_resolution_failure)?;

        let from_hash = envelope.from.hash();
        let (sender_public, signer) = match &envelope.delegation {
            None => {
                let keypair = self.vault.active_key(&from_hash).await?;
                (keypair.public_key().clone(), Signer::Origin(keypair))
            }
            Some(delegation) => {
                let sender = self
                    .directory
                    .resolve_address(&from_hash)
                    .await
                    .map_err(as_resolution_failure)?;
                (sender.public_key, Signer::Delegate(delegation.clone()))
            }
        };

        Ok(Resolved {
            endpoint,
            recipient_key: record.public_key,
            sender_public,
            signer,
        })
    }

    async fn upload(
        &self,
        message_id: MessageId,
        endpoint: &Endpoint,
        parts: Vec<(PartId, PartBody)>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut uploads = JoinSet::new();
        for (part, body) in parts {
            let transport = Arc::clone(&self.transport);
            let endpoint = endpoint.clone();
            uploads.spawn(async move {
                match transport.upload_part(&endpoint, message_id, &part, body).await {
                    Ok(()) => Ok(part),
                    Err(e) => Err((part, e)),
                }
            });
        }

        let failure = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Some(("upload".to_string(), Error::Cancelled)),
                joined = uploads.join_next() => match joined {
                    None => break None,
                    Some(Ok(Ok(part))) => {
                        self.emit(ComposeEvent::PartUploaded {
                            message_id,
                            part: part.to_string(),
                        });
                    }
                    Some(Ok(Err((part, e)))) => break Some((part.to_string(), e)),
                    Some(Err(e)) => {
                        break Some(("upload".to_string(), Error::Internal(e.to_string())))
                    }
                },
            }
        };

        let (part, error) = match failure {
            None => match self.transport.complete_upload(endpoint, message_id).await {
                Ok(()) => return Ok(()),
                Err(e) => ("complete".to_string(), e),
            },
            Some(failure) => failure,
        };

        // Nothing may still be writing when the delete goes out
        uploads.abort_all();
        while uploads.join_next().await.is_some() {}

        tracing::warn!("Upload of message {} failed at {}: {}", message_id, part, error);
        let rolled_back = match self.transport.delete_message(endpoint, message_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Rollback of message {} failed: {}", message_id, e);
                false
            }
        };
        self.enter(message_id, ComposeState::RolledBack);

        match error {
            Error::Cancelled => Err(Error::Cancelled),
            error => Err(Error::PartialUploadFailure {
                message_id: message_id.to_string(),
                part,
                reason: error.to_string(),
                rolled_back,
            }),
        }
    }
}

fn as_resolution_failure(error: Error) -> Error {
    match error {
        Error::DirectoryResolutionFailure(_) => error,
        other => Error::DirectoryResolutionFailure(other.to_string()),
    }
}

// ============================================================================
// ENCODING
// ============================================================================

fn encode(
    config: &CoreConfig,
    envelope: Envelope,
    recipient_key: &PublicKey,
    sender_public: PublicKey,
    signer: Signer,
) -> Result<Encoded> {
    let algorithms = config.checksum_algorithms()?;
    let mut parts = Vec::with_capacity(2 + envelope.blocks.len() + envelope.attachments.len());

    let mut blocks = Vec::with_capacity(envelope.blocks.len());
    for block in &envelope.blocks {
        let id = uuid::Uuid::new_v4().to_string();
        let (size, checksums, key, body) = encode_part(config, &algorithms, &id, &block.content)?;
        blocks.push(BlockDescriptor {
            id: id.clone(),
            kind: block.kind.clone(),
            size,
            key,
            checksums,
        });
        parts.push((PartId::Block(id), body));
    }

    let mut attachments = Vec::with_capacity(envelope.attachments.len());
    for attachment in &envelope.attachments {
        let id = uuid::Uuid::new_v4().to_string();
        let (size, checksums, key, body) =
            encode_part(config, &algorithms, &id, &attachment.content)?;
        attachments.push(AttachmentDescriptor {
            id: id.clone(),
            filename: attachment.filename.clone(),
            mime_type: attachment.mime_type.clone(),
            size,
            key,
            checksums,
        });
        parts.push((PartId::Attachment(id), body));
    }

    let catalog = Catalog {
        subject: envelope.subject,
        flags: envelope.flags,
        labels: envelope.labels,
        thread_id: envelope.thread_id,
        created_at: crate::time::now(),
        from: CatalogSender {
            name: envelope.from_name,
            organisation: envelope.from.organisation().map(str::to_string),
            address: envelope.from.clone(),
            public_key: sender_public.clone(),
            proof_of_work: envelope.proof_of_work.clone(),
        },
        to: CatalogRecipient {
            address: envelope.to.clone(),
            name: envelope.to_name,
        },
        blocks,
        attachments,
    };

    let (catalog_key, encrypted_catalog) = encode_catalog(&catalog)?;
    let (scheme, wrapped_key) = wrap_key(recipient_key, &catalog_key)?;

    let mut header = HeaderBuilder::new(envelope.from.hash(), sender_public, envelope.to.hash())
        .proof_of_work(envelope.proof_of_work)
        .catalog_with(&algorithms, &encrypted_catalog, scheme, wrapped_key)
        .build()?;

    match signer {
        Signer::Origin(keypair) => {
            if config.sign_headers {
                sign_header(&mut header, keypair.private_key())?;
            }
        }
        Signer::Delegate(delegation) => {
            sign_header_on_behalf(
                &mut header,
                delegation.key.private_key(),
                delegation.authorization,
            )?;
        }
    }

    parts.insert(0, (PartId::Catalog, PartBody::Bytes(encrypted_catalog.into())));
    parts.insert(0, (PartId::Header, PartBody::Bytes(header.to_json()?.into())));

    Ok(Encoded { header, parts })
}

/// Checksum pass, then a lazily encrypting stream over a second pass
fn encode_part(
    config: &CoreConfig,
    algorithms: &[ChecksumAlgorithm],
    id: &str,
    content: &super::Content,
) -> Result<(u64, ChecksumSet, crate::crypto::StreamKey, PartBody)> {
    let size = content.size()?;
    config.check_part_size(id, size)?;

    let checksums = ChecksumSet::compute_reader_with(algorithms, content.open()?)?;
    let (key, reader) = EncryptingReader::new(content.open()?);
    Ok((size, checksums, key, PartBody::Reader(Box::new(reader))))
}

// ============================================================================
// TESTS
// ============================================================================
