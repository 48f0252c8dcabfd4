//! # Streaming Encryption
//!
//! AES-256-CTR readers for block and attachment bodies.
//!
//! Bodies may be arbitrarily large, so they are transformed incrementally as
//! they are read instead of being buffered. CTR mode carries no integrity tag;
//! the checksum set recorded in the catalog covers the plaintext instead.
//!
//! ```text
//!   source ──► EncryptingReader ──► upload        (key + IV generated inside)
//!   fetch  ──► DecryptingReader ──► caller        (key + IV from the catalog)
//! ```
//!
//! A fresh key and IV are created every time an [`EncryptingReader`] is
//! built. There is no constructor that accepts caller-supplied key material
//! on the encrypt side, so keystream reuse across parts cannot happen.

use std::io::{self, Read};

use aes::Aes256;
use ctr::cipher::{generic_array::GenericArray, KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::serde_base64;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Size of a stream key in bytes
pub const STREAM_KEY_SIZE: usize = 32;

/// Size of a stream IV in bytes
pub const STREAM_IV_SIZE: usize = 16;

/// Per-part key and IV
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct StreamKey {
    #[serde(with = "serde_base64::array")]
    key: [u8; STREAM_KEY_SIZE],
    #[serde(with = "serde_base64::array")]
    iv: [u8; STREAM_IV_SIZE],
}

impl StreamKey {
    fn generate() -> Self {
        let mut key = [0u8; STREAM_KEY_SIZE];
        let mut iv = [0u8; STREAM_IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut key);
        rand::rngs::OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Raw key bytes
    pub fn key(&self) -> &[u8; STREAM_KEY_SIZE] {
        &self.key
    }

    /// Raw IV bytes
    pub fn iv(&self) -> &[u8; STREAM_IV_SIZE] {
        &self.iv
    }

    fn cipher(&self) -> Aes256Ctr {
        Aes256Ctr::new(
            GenericArray::from_slice(&self.key),
            GenericArray::from_slice(&self.iv),
        )
    }
}

impl std::fmt::Debug for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StreamKey(<redacted>)")
    }
}

/// Applies the keystream to everything read from `inner`
struct CtrReader<R> {
    inner: R,
    cipher: Aes256Ctr,
}

impl<R: Read> Read for CtrReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

/// Encrypts a plaintext source as it is read
pub struct EncryptingReader<R> {
    inner: CtrReader<R>,
}

impl<R: Read> EncryptingReader<R> {
    /// Wrap `source` under a freshly generated key and IV
    ///
    /// The returned [`StreamKey`] must be stored in the part's catalog
    /// descriptor; it is the only way to decrypt the output.
    pub fn new(source: R) -> (StreamKey, Self) {
        let key = StreamKey::generate();
        let reader = Self {
            inner: CtrReader {
                inner: source,
                cipher: key.cipher(),
            },
        };
        (key, reader)
    }
}

impl<R: Read> Read for EncryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Decrypts a ciphertext source as it is read
///
/// Single-pass: the reader cannot seek or restart.
pub struct DecryptingReader<R> {
    inner: CtrReader<R>,
}

impl<R: Read> DecryptingReader<R> {
    /// Wrap `source` with the key and IV recorded for the part
    pub fn new(key: &StreamKey, source: R) -> Self {
        Self {
            inner: CtrReader {
                inner: source,
                cipher: key.cipher(),
            },
        }
    }
}

impl<R: Read> Read for DecryptingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Cursor;

    fn read_all(mut reader: impl Read) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_stream_round_trip() {
        let plaintext = b"a block body that spans more than one AES block of data".to_vec();

        let (key, enc) = EncryptingReader::new(Cursor::new(plaintext.clone()));
        let ciphertext = read_all(enc);
        assert_eq!(ciphertext.len(), plaintext.len());
        assert_ne!(ciphertext, plaintext);

        let dec = DecryptingReader::new(&key, Cursor::new(ciphertext));
        assert_eq!(read_all(dec), plaintext);
    }

    #[test]
    fn test_small_reads_match_bulk_reads() {
        let plaintext: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let (key, enc) = EncryptingReader::new(Cursor::new(plaintext.clone()));
        let ciphertext = read_all(enc);

        let mut dec = DecryptingReader::new(&key, Cursor::new(ciphertext));
        let mut out = Vec::new();
        let mut buf = [0u8; 7];
        loop {
            let n = dec.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, plaintext);
    }

    #[test]
    fn test_each_reader_gets_fresh_key_and_iv() {
        let mut keys = HashSet::new();
        let mut ivs = HashSet::new();
        for _ in 0..256 {
            let (key, _) = EncryptingReader::new(Cursor::new(Vec::<u8>::new()));
            assert!(keys.insert(*key.key()));
            assert!(ivs.insert(*key.iv()));
        }
    }

    #[test]
    fn test_stream_key_serde() {
        let (key, _) = EncryptingReader::new(Cursor::new(Vec::<u8>::new()));
        let json = serde_json::to_string(&key).unwrap();
        let restored: StreamKey = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, key);
    }

    #[test]
    fn test_wrong_key_yields_garbage_not_error() {
        let (_, enc) = EncryptingReader::new(Cursor::new(b"plaintext".to_vec()));
        let ciphertext = read_all(enc);
        let (other, _) = EncryptingReader::new(Cursor::new(Vec::<u8>::new()));

        let garbage = read_all(DecryptingReader::new(&other, Cursor::new(ciphertext)));
        assert_ne!(garbage, b"plaintext");
    }
}
