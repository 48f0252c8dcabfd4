//! Directory seam: address hashes to keys, routing ids to servers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::address::AddressHash;
use crate::crypto::PublicKey;
use crate::error::{Error, Result};

/// What the directory knows about an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    /// Current public key of the account
    pub public_key: PublicKey,
    /// Routing id of the server holding the account's mailbox
    pub routing_id: String,
}

/// A mail server that accepts uploads for a routing id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Routing id this endpoint serves
    pub routing_id: String,
    /// Base URL of the server
    pub url: String,
}

/// Read-only view of the key/routing directory
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    /// Public key and routing id registered for `address`
    async fn resolve_address(&self, address: &AddressHash) -> Result<AddressRecord>;

    /// Endpoint serving `routing_id`
    async fn resolve_routing(&self, routing_id: &str) -> Result<Endpoint>;
}

/// In-memory directory with an "offline" switch
#[derive(Default)]
pub struct InMemoryDirectory {
    addresses: RwLock<HashMap<AddressHash, AddressRecord>>,
    routes: RwLock<HashMap<String, Endpoint>>,
    offline: AtomicBool,
}

impl InMemoryDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update an address
    pub fn register_address(&self, address: AddressHash, public_key: PublicKey, routing_id: &str) {
        self.addresses.write().insert(
            address,
            AddressRecord {
                public_key,
                routing_id: routing_id.to_string(),
            },
        );
    }

    /// Register or update a routing entry
    pub fn register_route(&self, routing_id: &str, url: &str) {
        self.routes.write().insert(
            routing_id.to_string(),
            Endpoint {
                routing_id: routing_id.to_string(),
                url: url.to_string(),
            },
        );
    }

    /// Make every lookup fail until switched back
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::DirectoryResolutionFailure("directory unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryLookup for InMemoryDirectory {
    async fn resolve_address(&self, address: &AddressHash) -> Result<AddressRecord> {
        self.check_online()?;
        self.addresses.read().get(address).cloned().ok_or_else(|| {
            Error::DirectoryResolutionFailure(format!("unknown address {}", address))
        })
    }

    async fn resolve_routing(&self, routing_id: &str) -> Result<Endpoint> {
        self.check_online()?;
        self.routes.read().get(routing_id).cloned().ok_or_else(|| {
            Error::DirectoryResolutionFailure(format!("unknown routing id {}", routing_id))
        })
    }
}
