//! # Checksum Set
//!
//! Ordered plaintext digests recorded for the catalog and for every part.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         CHECKSUM SET                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  bytes / reader ──┬──► crc32   (fast hash)                             │
//! │                   ├──► sha1    (legacy hash)                           │
//! │                   ├──► sha256  (strong hash)                           │
//! │                   └──► blake3  (strong hash)                           │
//! │                                                                         │
//! │  [ {hash: "crc32", value: "<hex>"}, {hash: "sha1", ...}, ... ]         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Checksums are for display and deduplication. They are not an
//! authenticity mechanism: the catalog's AEAD tag and the header signature
//! are what a recipient trusts. A mismatch is still reported as an error.
//!
//! New algorithms are added by appending a [`ChecksumAlgorithm`] to
//! [`ChecksumAlgorithm::ALL`]; no call site changes.

use std::fmt;
use std::io::Read;

use serde::{Deserialize, Serialize};
use sha2::Digest as _;

use crate::error::{Error, Result};

/// Read buffer size for streaming computation
const READ_CHUNK: usize = 8 * 1024;

// ============================================================================
// DIGESTERS
// ============================================================================

/// Incremental digest state
pub trait Checksummer: Send {
    /// Feed more input
    fn update(&mut self, data: &[u8]);

    /// Consume the state and return the digest bytes
    fn finish(self: Box<Self>) -> Vec<u8>;
}

impl Checksummer for crc32fast::Hasher {
    fn update(&mut self, data: &[u8]) {
        crc32fast::Hasher::update(self, data);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        self.finalize().to_be_bytes().to_vec()
    }
}

impl Checksummer for sha1::Sha1 {
    fn update(&mut self, data: &[u8]) {
        sha1::Digest::update(self, data);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        self.finalize().to_vec()
    }
}

impl Checksummer for sha2::Sha256 {
    fn update(&mut self, data: &[u8]) {
        sha2::Digest::update(self, data);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        self.finalize().to_vec()
    }
}

impl Checksummer for blake3::Hasher {
    fn update(&mut self, data: &[u8]) {
        blake3::Hasher::update(self, data);
    }

    fn finish(self: Box<Self>) -> Vec<u8> {
        self.finalize().as_bytes().to_vec()
    }
}

fn new_crc32() -> Box<dyn Checksummer> {
    Box::new(crc32fast::Hasher::new())
}

fn new_sha1() -> Box<dyn Checksummer> {
    Box::new(sha1::Sha1::new())
}

fn new_sha256() -> Box<dyn Checksummer> {
    Box::new(sha2::Sha256::new())
}

fn new_blake3() -> Box<dyn Checksummer> {
    Box::new(blake3::Hasher::new())
}

/// A named digest constructor
#[derive(Clone, Copy)]
pub struct ChecksumAlgorithm {
    name: &'static str,
    new: fn() -> Box<dyn Checksummer>,
}

impl ChecksumAlgorithm {
    /// CRC-32 (IEEE)
    pub const CRC32: Self = Self {
        name: "crc32",
        new: new_crc32,
    };

    /// SHA-1
    pub const SHA1: Self = Self {
        name: "sha1",
        new: new_sha1,
    };

    /// SHA-256
    pub const SHA256: Self = Self {
        name: "sha256",
        new: new_sha256,
    };

    /// BLAKE3 (unkeyed, 32-byte output)
    pub const BLAKE3: Self = Self {
        name: "blake3",
        new: new_blake3,
    };

    /// Every supported algorithm, in output order
    pub const ALL: &'static [Self] = &[Self::CRC32, Self::SHA1, Self::SHA256, Self::BLAKE3];

    /// Name recorded in the `hash` field
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Look up an algorithm by name
    pub fn by_name(name: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .find(|alg| alg.name == name)
            .copied()
            .ok_or_else(|| Error::InvalidMessage(format!("unknown checksum algorithm: {}", name)))
    }

    /// Resolve a list of names, keeping the given order
    pub fn resolve<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>> {
        names.iter().map(|n| Self::by_name(n.as_ref())).collect()
    }

    fn start(&self) -> Box<dyn Checksummer> {
        (self.new)()
    }
}

impl fmt::Debug for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChecksumAlgorithm({})", self.name)
    }
}

impl PartialEq for ChecksumAlgorithm {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ChecksumAlgorithm {}

// ============================================================================
// CHECKSUM SET
// ============================================================================

/// One recorded digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    /// Algorithm name
    pub hash: String,
    /// Lowercase hex digest
    pub value: String,
}

/// Ordered list of digests over the same input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChecksumSet(Vec<Checksum>);

/// Feeds every digester at once
struct MultiDigest {
    states: Vec<(&'static str, Box<dyn Checksummer>)>,
}

impl MultiDigest {
    fn new(algorithms: &[ChecksumAlgorithm]) -> Self {
        Self {
            states: algorithms.iter().map(|a| (a.name, a.start())).collect(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        for (_, state) in &mut self.states {
            state.update(data);
        }
    }

    fn finish(self) -> ChecksumSet {
        ChecksumSet(
            self.states
                .into_iter()
                .map(|(name, state)| Checksum {
                    hash: name.to_string(),
                    value: hex::encode(state.finish()),
                })
                .collect(),
        )
    }
}

impl ChecksumSet {
    /// Digest a buffer with every supported algorithm
    pub fn compute(bytes: &[u8]) -> Self {
        Self::compute_with(ChecksumAlgorithm::ALL, bytes)
    }

    /// Digest a buffer with the given algorithms
    pub fn compute_with(algorithms: &[ChecksumAlgorithm], bytes: &[u8]) -> Self {
        let mut digest = MultiDigest::new(algorithms);
        digest.update(bytes);
        digest.finish()
    }

    /// Digest a reader to its end with every supported algorithm
    pub fn compute_reader<R: Read>(reader: R) -> Result<Self> {
        Self::compute_reader_with(ChecksumAlgorithm::ALL, reader)
    }

    /// Digest a reader to its end with the given algorithms
    pub fn compute_reader_with<R: Read>(
        algorithms: &[ChecksumAlgorithm],
        mut reader: R,
    ) -> Result<Self> {
        let mut digest = MultiDigest::new(algorithms);
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            digest.update(&buf[..n]);
        }
        Ok(digest.finish())
    }

    /// Recorded value for an algorithm
    pub fn get(&self, hash: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|c| c.hash == hash)
            .map(|c| c.value.as_str())
    }

    /// Iterate in recorded order
    pub fn iter(&self) -> impl Iterator<Item = &Checksum> {
        self.0.iter()
    }

    /// Number of recorded digests
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check `bytes` against every recorded digest
    ///
    /// Digests under names this build does not know are skipped, but at
    /// least one known digest must be present. `part` names the part in
    /// the resulting `ChecksumMismatch`.
    pub fn verify(&self, part: &str, bytes: &[u8]) -> Result<()> {
        let algorithms: Vec<ChecksumAlgorithm> = self
            .0
            .iter()
            .filter_map(|c| ChecksumAlgorithm::by_name(&c.hash).ok())
            .collect();
        if algorithms.is_empty() {
            return Err(Error::ChecksumMismatch {
                part: part.to_string(),
                algorithm: "none".into(),
            });
        }

        let actual = Self::compute_with(&algorithms, bytes);
        for computed in actual.iter() {
            if self.get(&computed.hash) != Some(computed.value.as_str()) {
                return Err(Error::ChecksumMismatch {
                    part: part.to_string(),
                    algorithm: computed.hash.clone(),
                });
            }
        }
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_known_vectors() {
        let set = ChecksumSet::compute(b"abc");

        assert_eq!(set.get("crc32"), Some("352441c2"));
        assert_eq!(set.get("sha1"), Some("a9993e364706816aba3e25717850c26c9cd0d89d"));
        assert_eq!(
            set.get("sha256"),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
        assert_eq!(
            set.get("blake3"),
            Some("6437b3ac38465133ffb63b75273a8db548c558465d79db03fd359c6cd5bd9d85")
        );
    }

    #[test]
    fn test_order_is_stable() {
        let a = ChecksumSet::compute(b"hello");
        let b = ChecksumSet::compute(b"hello");
        assert_eq!(a, b);

        let names: Vec<&str> = a.iter().map(|c| c.hash.as_str()).collect();
        assert_eq!(names, vec!["crc32", "sha1", "sha256", "blake3"]);
    }

    #[test]
    fn test_reader_matches_buffer() {
        let data: Vec<u8> = (0..50_000u32).map(|i| (i % 253) as u8).collect();
        let from_reader = ChecksumSet::compute_reader(Cursor::new(&data)).unwrap();
        assert_eq!(from_reader, ChecksumSet::compute(&data));
    }

    #[test]
    fn test_verify_detects_change() {
        let set = ChecksumSet::compute(b"original");
        assert!(set.verify("block-0", b"original").is_ok());

        match set.verify("block-0", b"modified") {
            Err(Error::ChecksumMismatch { part, algorithm }) => {
                assert_eq!(part, "block-0");
                assert_eq!(algorithm, "crc32");
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_subset_of_algorithms() {
        let algorithms = ChecksumAlgorithm::resolve(&["sha256", "crc32"]).unwrap();
        let set = ChecksumSet::compute_with(&algorithms, b"abc");

        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().map(|c| c.hash.as_str()), Some("sha256"));
        assert!(set.get("blake3").is_none());
        assert!(set.verify("p", b"abc").is_ok());
    }

    #[test]
    fn test_empty_set_verifies_nothing() {
        let empty = ChecksumSet::default();
        assert!(matches!(
            empty.verify("block-0", b"anything"),
            Err(Error::ChecksumMismatch { ref algorithm, .. }) if algorithm == "none"
        ));

        let unknown: ChecksumSet = serde_json::from_str(r#"[{"hash":"md5","value":"00"}]"#).unwrap();
        assert!(unknown.verify("block-0", b"anything").is_err());
    }

    #[test]
    fn test_unknown_algorithm_name() {
        assert!(ChecksumAlgorithm::by_name("md5").is_err());
    }

    #[test]
    fn test_serde_shape() {
        let set = ChecksumSet::compute_with(&[ChecksumAlgorithm::CRC32], b"abc");
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"[{"hash":"crc32","value":"352441c2"}]"#);
    }
}
