//! Runtime configuration for composing, signing and proof-of-work.

use serde::{Deserialize, Serialize};

use crate::crypto::{ChecksumAlgorithm, DEFAULT_RSA_BITS};
use crate::error::{Error, Result};

/// Configuration shared by the composer and the proof-of-work engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Proof-of-work worker threads (`None` = one per CPU)
    pub pow_workers: Option<usize>,
    /// Modulus size for newly generated RSA keys
    pub rsa_bits: usize,
    /// Sign outgoing headers with the sender's key
    pub sign_headers: bool,
    /// Checksum algorithm names, in output order
    pub checksum_algorithms: Vec<String>,
    /// Largest accepted block or attachment in bytes (`None` = unlimited)
    pub max_block_size: Option<u64>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            pow_workers: None,
            rsa_bits: DEFAULT_RSA_BITS,
            sign_headers: true,
            checksum_algorithms: ChecksumAlgorithm::ALL
                .iter()
                .map(|a| a.name().to_string())
                .collect(),
            max_block_size: None,
        }
    }
}

impl CoreConfig {
    /// Number of proof-of-work threads to start
    pub fn pow_worker_count(&self) -> usize {
        self.pow_workers.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Resolve the configured checksum algorithms
    pub fn checksum_algorithms(&self) -> Result<Vec<ChecksumAlgorithm>> {
        ChecksumAlgorithm::resolve(&self.checksum_algorithms)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.checksum_algorithms.is_empty() {
            return Err(Error::Internal("at least one checksum algorithm is required".into()));
        }
        self.checksum_algorithms()?;
        if self.rsa_bits < 1024 {
            return Err(Error::Internal(format!("rsa_bits {} is too small", self.rsa_bits)));
        }
        Ok(())
    }

    /// Fail if `size` exceeds `max_block_size`
    pub fn check_part_size(&self, part: &str, size: u64) -> Result<()> {
        match self.max_block_size {
            Some(max) if size > max => Err(Error::InvalidMessage(format!(
                "{} is {} bytes, limit is {}",
                part, size, max
            ))),
            _ => Ok(()),
        }
    }
}
