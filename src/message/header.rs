//! # Header
//!
//! The only part of a message a server can read.
//!
//! ## Signing Modes
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         SIGNING MODES                                   │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ORIGIN                                                                 │
//! │    signer      = sender's own key (header.from.public_key)             │
//! │    authorized_by = none                                                │
//! │                                                                         │
//! │  ON BEHALF                                                              │
//! │    signer      = delegate key                                          │
//! │    authorized_by = Authorization {                                     │
//! │                      address_hash,  (sender)                           │
//! │                      public_key,    (delegate)                         │
//! │                      expires,                                          │
//! │                      signature      (by the sender's origin key)       │
//! │                    }                                                   │
//! │                                                                         │
//! │  Signed bytes: canonical JSON of the header without `signature`.       │
//! │  `authorized_by` is set before signing, so it is covered too.          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::address::AddressHash;
use crate::crypto::{
    self, ChecksumAlgorithm, ChecksumSet, EncryptionScheme, PrivateKey, PublicKey, Signature,
};
use crate::error::{Error, Result};
use crate::pow::ProofOfWork;

// ============================================================================
// HEADER MODEL
// ============================================================================

/// Sender section of the header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderSender {
    /// Hash of the sender's address
    pub address_hash: AddressHash,
    /// Sender's origin public key
    pub public_key: PublicKey,
    /// Sender's proof of work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof_of_work: Option<ProofOfWork>,
}

/// Recipient section of the header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecipient {
    /// Hash of the recipient's address
    pub address_hash: AddressHash,
}

/// What a server may know about the encrypted catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogInfo {
    /// Size of the encrypted catalog in bytes
    pub size: u64,
    /// Checksums over the encrypted catalog
    pub checksums: ChecksumSet,
    /// How the catalog key was wrapped
    pub crypto: EncryptionScheme,
    /// The wrapped catalog key
    #[serde(with = "crate::crypto::serde_base64")]
    pub encrypted_key: Vec<u8>,
}

/// A message header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Sender
    pub from: HeaderSender,
    /// Recipient
    pub to: HeaderRecipient,
    /// Catalog metadata and wrapped key
    pub catalog: CatalogInfo,
    /// Delegation under which the header was signed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorized_by: Option<Authorization>,
    /// Signature over everything above
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Header {
    /// Canonical bytes covered by the signature
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        Ok(serde_json::to_vec(&unsigned)?)
    }

    /// Serialize for upload
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse a fetched header
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Check the sender's proof of work
    ///
    /// A header without a proof fails with `ProofOfWorkInvalid`.
    pub fn validate_proof_of_work(&self) -> Result<()> {
        match &self.from.proof_of_work {
            Some(pow) => pow.validate(),
            None => Err(Error::ProofOfWorkInvalid(
                "header carries no proof of work".into(),
            )),
        }
    }

    /// Whether the header carries a signature
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

/// Assembles a [`Header`]
#[derive(Debug, Clone)]
pub struct HeaderBuilder {
    from: HeaderSender,
    to: HeaderRecipient,
    catalog: Option<CatalogInfo>,
}

impl HeaderBuilder {
    /// Start a header from `from` to `to`
    pub fn new(from: AddressHash, from_public_key: PublicKey, to: AddressHash) -> Self {
        Self {
            from: HeaderSender {
                address_hash: from,
                public_key: from_public_key,
                proof_of_work: None,
            },
            to: HeaderRecipient { address_hash: to },
            catalog: None,
        }
    }

    /// Attach the sender's proof of work
    pub fn proof_of_work(mut self, pow: Option<ProofOfWork>) -> Self {
        self.from.proof_of_work = pow;
        self
    }

    /// Describe the encrypted catalog and its wrapped key
    pub fn catalog(
        self,
        encrypted_catalog: &[u8],
        scheme: EncryptionScheme,
        encrypted_key: Vec<u8>,
    ) -> Self {
        self.catalog_with(ChecksumAlgorithm::ALL, encrypted_catalog, scheme, encrypted_key)
    }

    /// Like [`HeaderBuilder::catalog`], checksumming with `algorithms` only
    pub fn catalog_with(
        mut self,
        algorithms: &[ChecksumAlgorithm],
        encrypted_catalog: &[u8],
        scheme: EncryptionScheme,
        encrypted_key: Vec<u8>,
    ) -> Self {
        self.catalog = Some(CatalogInfo {
            size: encrypted_catalog.len() as u64,
            checksums: ChecksumSet::compute_with(algorithms, encrypted_catalog),
            crypto: scheme,
            encrypted_key,
        });
        self
    }

    /// Finish the (unsigned) header
    pub fn build(self) -> Result<Header> {
        let catalog = self
            .catalog
            .ok_or_else(|| Error::InvalidMessage("header has no catalog section".into()))?;
        Ok(Header {
            from: self.from,
            to: self.to,
            catalog,
            authorized_by: None,
            signature: None,
        })
    }
}

// ============================================================================
// AUTHORIZATIONS
// ============================================================================

/// Origin-signed permission for a delegate key to sign for an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// Address the delegate may sign for
    pub address_hash: AddressHash,
    /// The delegate key
    pub public_key: PublicKey,
    /// End of validity
    pub expires: DateTime<Utc>,
    /// Origin key's signature over the three fields above
    pub signature: Signature,
}

#[derive(Serialize)]
struct AuthorizationClaims<'a> {
    address_hash: &'a AddressHash,
    public_key: &'a PublicKey,
    expires: &'a DateTime<Utc>,
}

impl Authorization {
    /// Grant `delegate` the right to sign for `address_hash` until `expires`
    pub fn grant(
        origin: &PrivateKey,
        address_hash: AddressHash,
        delegate: PublicKey,
        expires: DateTime<Utc>,
    ) -> Result<Self> {
        let claims = serde_json::to_vec(&AuthorizationClaims {
            address_hash: &address_hash,
            public_key: &delegate,
            expires: &expires,
        })?;
        let signature = crypto::sign(origin, &claims)?;

        Ok(Self {
            address_hash,
            public_key: delegate,
            expires,
            signature,
        })
    }

    /// Check the origin signature and the expiry
    pub fn verify(&self, origin: &PublicKey) -> Result<()> {
        if crate::time::is_expired(&self.expires) {
            return Err(Error::VerificationFailed(format!(
                "authorization expired at {}",
                self.expires
            )));
        }
        let claims = serde_json::to_vec(&AuthorizationClaims {
            address_hash: &self.address_hash,
            public_key: &self.public_key,
            expires: &self.expires,
        })?;
        crypto::verify(origin, &claims, &self.signature)
    }
}

/// Decides whether a delegate key may sign for an address
///
/// Consulted after the authorization's own origin signature and expiry
/// have been checked.
pub trait AuthorizedKeyCheck: Send + Sync {
    /// Whether `key` is an accepted delegate for `address`
    fn is_authorized(&self, address: &AddressHash, key: &PublicKey) -> bool;
}

/// Accepts any delegate whose authorization verifies
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptSignedAuthorizations;

impl AuthorizedKeyCheck for AcceptSignedAuthorizations {
    fn is_authorized(&self, _address: &AddressHash, _key: &PublicKey) -> bool {
        true
    }
}

/// Explicit allow-list of delegate keys per address
#[derive(Default)]
pub struct AuthorizedKeys {
    keys: RwLock<HashMap<AddressHash, HashSet<String>>>,
}

impl AuthorizedKeys {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Allow `key` to sign for `address`
    pub fn allow(&self, address: AddressHash, key: &PublicKey) -> Result<()> {
        let fingerprint = key.fingerprint()?;
        self.keys.write().entry(address).or_default().insert(fingerprint);
        Ok(())
    }

    /// Withdraw a previously allowed key
    pub fn revoke(&self, address: &AddressHash, key: &PublicKey) -> Result<()> {
        let fingerprint = key.fingerprint()?;
        if let Some(set) = self.keys.write().get_mut(address) {
            set.remove(&fingerprint);
        }
        Ok(())
    }
}

impl AuthorizedKeyCheck for AuthorizedKeys {
    fn is_authorized(&self, address: &AddressHash, key: &PublicKey) -> bool {
        let Ok(fingerprint) = key.fingerprint() else {
            return false;
        };
        self.keys
            .read()
            .get(address)
            .map(|set| set.contains(&fingerprint))
            .unwrap_or(false)
    }
}

// ============================================================================
// SIGN / VERIFY
// ============================================================================

/// Which key produced a verified header signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureMode {
    /// The sender's own key
    Origin,
    /// A delegate key under an authorization
    OnBehalf,
}

/// Sign a header with the sender's origin key
pub fn sign_header(header: &mut Header, key: &PrivateKey) -> Result<()> {
    if key.public_key() != header.from.public_key {
        return Err(Error::SigningFailed(
            "key does not belong to the header's sender".into(),
        ));
    }
    header.authorized_by = None;
    let bytes = header.signing_bytes()?;
    header.signature = Some(crypto::sign(key, &bytes)?);
    Ok(())
}

/// Sign a header with a delegate key
///
/// The authorization must name the header's sender and the delegate key.
pub fn sign_header_on_behalf(
    header: &mut Header,
    delegate: &PrivateKey,
    authorization: Authorization,
) -> Result<()> {
    if authorization.address_hash != header.from.address_hash {
        return Err(Error::SigningFailed(
            "authorization is for a different address".into(),
        ));
    }
    if delegate.public_key() != authorization.public_key {
        return Err(Error::SigningFailed(
            "authorization does not name the delegate key".into(),
        ));
    }
    header.authorized_by = Some(authorization);
    let bytes = header.signing_bytes()?;
    header.signature = Some(crypto::sign(delegate, &bytes)?);
    Ok(())
}

/// Verify a header's signature and report which mode produced it
///
/// ## Errors
///
/// `VerificationFailed` if the header is unsigned, the signature does not
/// verify, or an on-behalf authorization is expired, forged, for another
/// address, or rejected by `check`.
pub fn verify_header(header: &Header, check: &dyn AuthorizedKeyCheck) -> Result<SignatureMode> {
    let signature = header
        .signature
        .as_ref()
        .ok_or_else(|| Error::VerificationFailed("header is not signed".into()))?;
    let bytes = header.signing_bytes()?;

    match &header.authorized_by {
        None => {
            crypto::verify(&header.from.public_key, &bytes, signature)?;
            Ok(SignatureMode::Origin)
        }
        Some(authorization) => {
            if authorization.address_hash != header.from.address_hash {
                return Err(Error::VerificationFailed(
                    "authorization is for a different address".into(),
                ));
            }
            authorization.verify(&header.from.public_key)?;
            if !check.is_authorized(&header.from.address_hash, &authorization.public_key) {
                return Err(Error::VerificationFailed(
                    "delegate key is not authorized".into(),
                ));
            }
            crypto::verify(&authorization.public_key, &bytes, signature)?;
            Ok(SignatureMode::OnBehalf)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Address;
    use crate::crypto::{KeyFamily, KeyPair};
    use crate::time::days_from_now;

    struct Fixture {
        sender: KeyPair,
        header: Header,
    }

    fn fixture(family: KeyFamily) -> Fixture {
        let sender = match family {
            KeyFamily::Rsa => crate::crypto::test_keys::rsa().clone(),
            family => KeyPair::generate(family).unwrap(),
        };
        let header = HeaderBuilder::new(
            Address::parse("john!").unwrap().hash(),
            sender.public_key().clone(),
            Address::parse("jane!").unwrap().hash(),
        )
        .proof_of_work(Some(ProofOfWork::new(0, b"john!".to_vec())))
        .catalog(b"encrypted catalog", EncryptionScheme::Ed25519X25519, vec![1, 2, 3])
        .build()
        .unwrap();
        Fixture { sender, header }
    }

    #[test]
    fn test_builder_requires_catalog() {
        let kp = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let result = HeaderBuilder::new(
            Address::parse("john!").unwrap().hash(),
            kp.public_key().clone(),
            Address::parse("jane!").unwrap().hash(),
        )
        .build();
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_catalog_section() {
        let f = fixture(KeyFamily::Ed25519);
        assert_eq!(f.header.catalog.size, 17);
        assert!(f.header.catalog.checksums.verify("catalog", b"encrypted catalog").is_ok());
    }

    #[test]
    fn test_catalog_with_selected_algorithms() {
        let kp = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let header = HeaderBuilder::new(
            Address::parse("john!").unwrap().hash(),
            kp.public_key().clone(),
            Address::parse("jane!").unwrap().hash(),
        )
        .catalog_with(
            &[ChecksumAlgorithm::SHA256],
            b"encrypted catalog",
            EncryptionScheme::Ed25519X25519,
            vec![1, 2, 3],
        )
        .build()
        .unwrap();

        assert_eq!(header.catalog.checksums.len(), 1);
        assert!(header.catalog.checksums.get("sha256").is_some());
        assert!(header.catalog.checksums.verify("catalog", b"encrypted catalog").is_ok());
    }

    #[test]
    fn test_origin_sign_verify_all_families() {
        for family in [KeyFamily::Rsa, KeyFamily::Ecdsa, KeyFamily::Ed25519] {
            let mut f = fixture(family);
            sign_header(&mut f.header, f.sender.private_key()).unwrap();

            let mode = verify_header(&f.header, &AcceptSignedAuthorizations).unwrap();
            assert_eq!(mode, SignatureMode::Origin);
        }
    }

    #[test]
    fn test_sign_with_foreign_key_refused() {
        let mut f = fixture(KeyFamily::Ed25519);
        let other = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let result = sign_header(&mut f.header, other.private_key());
        assert!(matches!(result, Err(Error::SigningFailed(_))));
    }

    #[test]
    fn test_tampered_header_fails_verification() {
        let mut f = fixture(KeyFamily::Ecdsa);
        sign_header(&mut f.header, f.sender.private_key()).unwrap();
        f.header.catalog.size += 1;

        let result = verify_header(&f.header, &AcceptSignedAuthorizations);
        assert!(matches!(result, Err(Error::VerificationFailed(_))));
    }

    #[test]
    fn test_unsigned_header_fails_verification() {
        let f = fixture(KeyFamily::Ed25519);
        assert!(!f.header.is_signed());
        assert!(verify_header(&f.header, &AcceptSignedAuthorizations).is_err());
    }

    #[test]
    fn test_on_behalf_signing() {
        let mut f = fixture(KeyFamily::Ed25519);
        let delegate = KeyPair::generate(KeyFamily::Ecdsa).unwrap();
        let auth = Authorization::grant(
            f.sender.private_key(),
            f.header.from.address_hash.clone(),
            delegate.public_key().clone(),
            days_from_now(30),
        )
        .unwrap();

        sign_header_on_behalf(&mut f.header, delegate.private_key(), auth).unwrap();
        let mode = verify_header(&f.header, &AcceptSignedAuthorizations).unwrap();
        assert_eq!(mode, SignatureMode::OnBehalf);

        // An allow-list without the delegate rejects it
        let list = AuthorizedKeys::new();
        assert!(verify_header(&f.header, &list).is_err());
        list.allow(f.header.from.address_hash.clone(), delegate.public_key())
            .unwrap();
        assert_eq!(verify_header(&f.header, &list).unwrap(), SignatureMode::OnBehalf);
        list.revoke(&f.header.from.address_hash, delegate.public_key())
            .unwrap();
        assert!(verify_header(&f.header, &list).is_err());
    }

    #[test]
    fn test_expired_authorization_rejected() {
        let mut f = fixture(KeyFamily::Ed25519);
        let delegate = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let auth = Authorization::grant(
            f.sender.private_key(),
            f.header.from.address_hash.clone(),
            delegate.public_key().clone(),
            days_from_now(-1),
        )
        .unwrap();

        sign_header_on_behalf(&mut f.header, delegate.private_key(), auth).unwrap();
        let result = verify_header(&f.header, &AcceptSignedAuthorizations);
        assert!(matches!(result, Err(Error::VerificationFailed(_))));
    }

    #[test]
    fn test_self_issued_authorization_rejected() {
        let mut f = fixture(KeyFamily::Ed25519);
        let delegate = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        // Signed by the delegate instead of the origin key
        let forged = Authorization::grant(
            delegate.private_key(),
            f.header.from.address_hash.clone(),
            delegate.public_key().clone(),
            days_from_now(30),
        )
        .unwrap();

        sign_header_on_behalf(&mut f.header, delegate.private_key(), forged).unwrap();
        assert!(verify_header(&f.header, &AcceptSignedAuthorizations).is_err());
    }

    #[test]
    fn test_authorization_must_match_sender_and_delegate() {
        let mut f = fixture(KeyFamily::Ed25519);
        let delegate = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let wrong_address = Authorization::grant(
            f.sender.private_key(),
            Address::parse("someone-else!").unwrap().hash(),
            delegate.public_key().clone(),
            days_from_now(30),
        )
        .unwrap();
        assert!(sign_header_on_behalf(&mut f.header, delegate.private_key(), wrong_address).is_err());

        let other = KeyPair::generate(KeyFamily::Ed25519).unwrap();
        let wrong_key = Authorization::grant(
            f.sender.private_key(),
            f.header.from.address_hash.clone(),
            other.public_key().clone(),
            days_from_now(30),
        )
        .unwrap();
        assert!(sign_header_on_behalf(&mut f.header, delegate.private_key(), wrong_key).is_err());
    }

    #[test]
    fn test_header_json_round_trip_keeps_signature_valid() {
        let mut f = fixture(KeyFamily::Ed25519);
        sign_header(&mut f.header, f.sender.private_key()).unwrap();

        let restored = Header::from_json(&f.header.to_json().unwrap()).unwrap();
        assert_eq!(restored, f.header);
        assert!(verify_header(&restored, &AcceptSignedAuthorizations).is_ok());
    }

    #[test]
    fn test_header_proof_of_work() {
        let mut f = fixture(KeyFamily::Ed25519);
        assert!(f.header.validate_proof_of_work().is_ok());

        f.header.from.proof_of_work = None;
        assert!(matches!(
            f.header.validate_proof_of_work(),
            Err(Error::ProofOfWorkInvalid(_))
        ));
    }
}
