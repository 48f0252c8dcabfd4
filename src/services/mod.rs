//! # External Services
//!
//! Seams to the collaborators the message pipeline depends on but does not
//! implement.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SERVICE SEAMS                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   Composer / Decryptor                                                 │
//! │        │                                                                │
//! │        ├──► PrivateKeyProvider   active key for an address hash        │
//! │        │                          (account vault)                      │
//! │        │                                                                │
//! │        ├──► DirectoryLookup      address hash → public key + routing   │
//! │        │                          routing id  → mail server endpoint   │
//! │        │                                                                │
//! │        └──► Transport            upload / delete / complete / fetch    │
//! │                                   message parts on a mail server       │
//! │                                                                         │
//! │   Each seam has an in-memory implementation with failure injection.   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod resolver;
mod transport;
mod vault;

pub use resolver::{AddressRecord, DirectoryLookup, Endpoint, InMemoryDirectory};
pub use transport::{InMemoryTransport, PartBody, PartId, Transport};
pub use vault::{InMemoryVault, PrivateKeyProvider};

/// Identifier allocated to a message before any of its parts is uploaded
pub type MessageId = uuid::Uuid;
