//! Account vault seam.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::address::AddressHash;
use crate::crypto::KeyPair;
use crate::error::{Error, Result};

/// Source of an account's current keypair
#[async_trait]
pub trait PrivateKeyProvider: Send + Sync {
    /// The keypair currently in use for `address`
    ///
    /// Returns `KeyNotFound` when the vault holds nothing for it.
    async fn active_key(&self, address: &AddressHash) -> Result<KeyPair>;
}

/// In-memory vault keyed by address hash
#[derive(Default)]
pub struct InMemoryVault {
    keys: RwLock<HashMap<AddressHash, KeyPair>>,
}

impl InMemoryVault {
    /// Create an empty vault
    pub fn new() -> Self {
        Self::default()
    }

    /// Store (or rotate) the active key for an address
    pub fn insert(&self, address: AddressHash, keypair: KeyPair) {
        self.keys.write().insert(address, keypair);
    }

    /// Forget the key for an address
    pub fn remove(&self, address: &AddressHash) -> Option<KeyPair> {
        self.keys.write().remove(address)
    }
}

#[async_trait]
impl PrivateKeyProvider for InMemoryVault {
    async fn active_key(&self, address: &AddressHash) -> Result<KeyPair> {
        self.keys
            .read()
            .get(address)
            .cloned()
            .ok_or_else(|| Error::KeyNotFound(address.to_string()))
    }
}
