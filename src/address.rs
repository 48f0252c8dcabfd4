//! # Addresses
//!
//! BitMaelum addresses and their hashed form.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ADDRESS FORMS                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   john!              individual address                                │
//! │   john@acme!         address inside organisation "acme"                │
//! │                                                                         │
//! │   local part:    a-z 0-9 . - _   (1-63 chars, starts alphanumeric)     │
//! │   organisation:  a-z 0-9 -       (1-63 chars, starts alphanumeric)     │
//! │                                                                         │
//! │   normalised:    lowercase, surrounding whitespace removed             │
//! │   hash:          hex SHA-256 of the normalised text                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Servers and the directory only ever see [`AddressHash`] values. The
//! plain address appears inside the encrypted catalog.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// Maximum length of the local part or organisation
const MAX_PART_LEN: usize = 63;

/// A parsed, normalised address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address {
    local: String,
    organisation: Option<String>,
}

impl Address {
    /// Parse `name!` or `name@organisation!`
    pub fn parse(text: &str) -> Result<Self> {
        let normalised = text.trim().to_lowercase();
        let body = normalised
            .strip_suffix('!')
            .ok_or_else(|| Error::InvalidAddress(format!("{}: must end with '!'", text)))?;

        let (local, organisation) = match body.split_once('@') {
            Some((local, org)) => (local, Some(org)),
            None => (body, None),
        };

        validate_part(local, |c| c == '.' || c == '-' || c == '_')
            .map_err(|why| Error::InvalidAddress(format!("{}: local part {}", text, why)))?;
        if let Some(org) = organisation {
            validate_part(org, |c| c == '-')
                .map_err(|why| Error::InvalidAddress(format!("{}: organisation {}", text, why)))?;
        }

        Ok(Self {
            local: local.to_string(),
            organisation: organisation.map(str::to_string),
        })
    }

    /// The part before `@` (or before `!`)
    pub fn local(&self) -> &str {
        &self.local
    }

    /// The organisation, if any
    pub fn organisation(&self) -> Option<&str> {
        self.organisation.as_deref()
    }

    /// Hash of the normalised address
    pub fn hash(&self) -> AddressHash {
        AddressHash::of(self)
    }
}

fn validate_part(part: &str, extra: impl Fn(char) -> bool) -> std::result::Result<(), String> {
    if part.is_empty() || part.len() > MAX_PART_LEN {
        return Err(format!("must be 1-{} characters", MAX_PART_LEN));
    }
    if !part.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err("must start with a letter or digit".into());
    }
    if let Some(bad) = part
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || extra(*c)))
    {
        return Err(format!("contains invalid character {:?}", bad));
    }
    Ok(())
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.organisation {
            Some(org) => write!(f, "{}@{}!", self.local, org),
            None => write!(f, "{}!", self.local),
        }
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// ADDRESS HASH
// ============================================================================

/// Hex SHA-256 of a normalised address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AddressHash(String);

impl AddressHash {
    /// Hash an address
    pub fn of(address: &Address) -> Self {
        Self(hex::encode(Sha256::digest(address.to_string().as_bytes())))
    }

    /// Accept an existing hex hash (64 hex characters, any case)
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let lower = hex_str.to_ascii_lowercase();
        if lower.len() != 64 || !lower.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAddress(format!(
                "not an address hash: {}",
                hex_str
            )));
        }
        Ok(Self(lower))
    }

    /// The hex string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddressHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AddressHash {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<AddressHash> for String {
    fn from(hash: AddressHash) -> Self {
        hash.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
