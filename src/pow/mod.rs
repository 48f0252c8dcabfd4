//! # Proof of Work
//!
//! Hashcash-style work proofs that gate account and address creation.
//!
//! ## Validity
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PROOF VALIDITY                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   digest = SHA-256( proof as u64 big-endian ‖ data )                   │
//! │                                                                         │
//! │   valid  ⇔  leading_zero_bits(digest) ≥ bits                           │
//! │                                                                         │
//! │   bits = 0    → every proof is valid                                   │
//! │   bits > 256  → no proof is valid                                      │
//! │                                                                         │
//! │   Text form:  "<bits>$<base64 data>$<proof>"                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Search
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PARALLEL SEARCH                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │   caller token ──► child token ("found")                               │
//! │                        │                                                │
//! │        ┌───────────────┼───────────────┬───────────────┐               │
//! │        ▼               ▼               ▼               ▼               │
//! │   worker 0        worker 1        worker 2   ...  worker N-1          │
//! │   0, N, 2N…       1, N+1…         2, N+2…         N-1, 2N-1…          │
//! │        │                                                                │
//! │        └── first hit: send nonce on channel, cancel "found"            │
//! │                                                                         │
//! │   Each worker owns its nonce counter. The token is the only            │
//! │   shared state.                                                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! [`validate`] is the single check used by the solver and by verifiers.

use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use crossbeam::channel;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;

use crate::config::CoreConfig;
use crate::error::{Error, Result};

/// Largest difficulty that can ever be met (the digest is 256 bits)
pub const MAX_BITS: u32 = 256;

/// Nonces tested between cancellation checks
const CANCEL_CHECK_INTERVAL: u64 = 1024;

// ============================================================================
// VALIDATION
// ============================================================================

/// Count the leading zero bits of a digest
pub fn leading_zero_bits(digest: &[u8]) -> u32 {
    let mut bits = 0;
    for byte in digest {
        if *byte == 0 {
            bits += 8;
        } else {
            bits += byte.leading_zeros();
            break;
        }
    }
    bits
}

fn work_digest(data: &[u8], proof: u64) -> [u8; 32] {
    Sha256::new()
        .chain_update(proof.to_be_bytes())
        .chain_update(data)
        .finalize()
        .into()
}

/// Whether `proof` meets `bits` of difficulty over `data`
///
/// Pure and infallible.
pub fn validate(bits: u32, data: &[u8], proof: u64) -> bool {
    if bits == 0 {
        return true;
    }
    if bits > MAX_BITS {
        return false;
    }
    leading_zero_bits(&work_digest(data, proof)) >= bits
}

// ============================================================================
// SEARCH
// ============================================================================

/// Find a proof for `data` with at least `bits` leading zero bits
///
/// Runs `workers` scoped threads (at least one) and blocks until a proof is
/// found or `cancel` fires.
///
/// ## Errors
///
/// - `ProofOfWorkInvalid` if `bits` exceeds [`MAX_BITS`]
/// - `Cancelled` if `cancel` fired before a proof was found
pub fn solve(bits: u32, data: &[u8], workers: usize, cancel: &CancellationToken) -> Result<u64> {
    if bits > MAX_BITS {
        return Err(Error::ProofOfWorkInvalid(format!(
            "{} bits can never be satisfied",
            bits
        )));
    }

    let workers = workers.max(1);
    let started = Instant::now();
    tracing::debug!("Starting proof-of-work search: {} bits, {} workers", bits, workers);

    let found = cancel.child_token();
    let (tx, rx) = channel::bounded::<u64>(workers);

    std::thread::scope(|scope| {
        for index in 0..workers {
            let tx = tx.clone();
            let found = &found;
            scope.spawn(move || {
                search(bits, data, index as u64, workers as u64, found, &tx);
            });
        }
    });
    drop(tx);

    match rx.try_recv() {
        Ok(proof) => {
            tracing::info!(
                "Proof of work found: {} bits in {:?} (proof {})",
                bits,
                started.elapsed(),
                proof
            );
            Ok(proof)
        }
        Err(_) => {
            tracing::debug!("Proof-of-work search cancelled after {:?}", started.elapsed());
            Err(Error::Cancelled)
        }
    }
}

/// Test the strided sequence `start, start + stride, ...` until a hit or
/// cancellation
fn search(
    bits: u32,
    data: &[u8],
    start: u64,
    stride: u64,
    found: &CancellationToken,
    tx: &channel::Sender<u64>,
) {
    let mut nonce = start;
    let mut tested: u64 = 0;

    loop {
        if tested % CANCEL_CHECK_INTERVAL == 0 && found.is_cancelled() {
            return;
        }
        tested += 1;

        if validate(bits, data, nonce) {
            let _ = tx.send(nonce);
            found.cancel();
            return;
        }

        nonce = match nonce.checked_add(stride) {
            Some(next) => next,
            None => return,
        };
    }
}

/// [`solve`] on the blocking thread pool
pub async fn solve_async(
    bits: u32,
    data: Vec<u8>,
    workers: usize,
    cancel: CancellationToken,
) -> Result<u64> {
    tokio::task::spawn_blocking(move || solve(bits, &data, workers, &cancel))
        .await
        .map_err(|e| Error::Internal(format!("proof-of-work task failed: {}", e)))?
}

// ============================================================================
// PROOF OF WORK
// ============================================================================

/// A difficulty, the data it covers and the proof found for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofOfWork {
    /// Required leading zero bits
    pub bits: u32,
    /// Data the work is bound to
    pub data: Vec<u8>,
    /// The nonce
    pub proof: u64,
}

impl ProofOfWork {
    /// An unsolved proof (proof = 0)
    pub fn new(bits: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            bits,
            data: data.into(),
            proof: 0,
        }
    }

    /// Search for a proof and return the solved record
    pub fn generate(
        bits: u32,
        data: impl Into<Vec<u8>>,
        workers: usize,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let data = data.into();
        let proof = solve(bits, &data, workers, cancel)?;
        Ok(Self { bits, data, proof })
    }

    /// [`ProofOfWork::generate`] with the worker count from `config`
    pub fn generate_with_config(
        bits: u32,
        data: impl Into<Vec<u8>>,
        config: &CoreConfig,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        Self::generate(bits, data, config.pow_worker_count(), cancel)
    }

    /// [`ProofOfWork::generate_async`] with the worker count from `config`
    pub async fn generate_async_with_config(
        bits: u32,
        data: impl Into<Vec<u8>>,
        config: &CoreConfig,
        cancel: CancellationToken,
    ) -> Result<Self> {
        Self::generate_async(bits, data, config.pow_worker_count(), cancel).await
    }

    /// [`ProofOfWork::generate`] on the blocking thread pool
    pub async fn generate_async(
        bits: u32,
        data: impl Into<Vec<u8>>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let data = data.into();
        let proof = solve_async(bits, data.clone(), workers, cancel).await?;
        Ok(Self { bits, data, proof })
    }

    /// Whether the recorded proof meets the recorded difficulty
    pub fn is_valid(&self) -> bool {
        validate(self.bits, &self.data, self.proof)
    }

    /// Like [`ProofOfWork::is_valid`], as a `Result`
    pub fn validate(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(Error::ProofOfWorkInvalid(format!(
                "proof {} does not reach {} bits",
                self.proof, self.bits
            )))
        }
    }
}

impl fmt::Display for ProofOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}${}${}", self.bits, BASE64.encode(&self.data), self.proof)
    }
}

impl FromStr for ProofOfWork {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::ProofOfWorkInvalid(format!("malformed proof of work: {}", s));

        let mut fields = s.split('$');
        let (Some(bits), Some(data), Some(proof), None) =
            (fields.next(), fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };

        Ok(Self {
            bits: bits.parse().map_err(|_| malformed())?,
            data: BASE64.decode(data).map_err(|_| malformed())?,
            proof: proof.parse().map_err(|_| malformed())?,
        })
    }
}

impl Serialize for ProofOfWork {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ProofOfWork {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// TESTS
// ============================================================================
