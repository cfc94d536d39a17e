use std::sync::Arc;

use sha2::Digest as _;
use thrap_types::Digest;

use crate::hasher::{ContentHasher, HashState};

/// A hash function strategy.
///
/// Stores hold an `Arc<dyn HashAlgorithm>` so the digest function can be
/// swapped without touching any store code. Every digest a store produces has
/// [`output_len`](Self::output_len) bytes, including the zero digest.
pub trait HashAlgorithm: Send + Sync {
    /// Stable name, used in configuration.
    fn name(&self) -> &'static str;

    /// Digest length in bytes.
    fn output_len(&self) -> usize;

    /// A fresh hasher.
    fn hasher(&self) -> ContentHasher;

    /// The all-zero digest for this algorithm.
    fn zero_digest(&self) -> Digest {
        Digest::zero(self.output_len())
    }

    /// Hash a byte slice in one shot.
    fn digest(&self, data: &[u8]) -> Digest {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }
}

/// BLAKE3, 32-byte output. The default.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3;

struct Blake3State(blake3::Hasher);

impl HashState for Blake3State {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().as_bytes().to_vec()
    }
}

impl HashAlgorithm for Blake3 {
    fn name(&self) -> &'static str {
        "blake3"
    }

    fn output_len(&self) -> usize {
        blake3::OUT_LEN
    }

    fn hasher(&self) -> ContentHasher {
        ContentHasher::new(Box::new(Blake3State(blake3::Hasher::new())))
    }
}

/// SHA-256, 32-byte output.
#[derive(Clone, Copy, Debug, Default)]
pub struct Sha256;

struct Sha256State(sha2::Sha256);

impl HashState for Sha256State {
    fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    fn finalize(self: Box<Self>) -> Vec<u8> {
        self.0.finalize().to_vec()
    }
}

impl HashAlgorithm for Sha256 {
    fn name(&self) -> &'static str {
        "sha256"
    }

    fn output_len(&self) -> usize {
        32
    }

    fn hasher(&self) -> ContentHasher {
        ContentHasher::new(Box::new(Sha256State(sha2::Sha256::new())))
    }
}

/// Look up a hash algorithm by its configuration name.
pub fn algorithm_from_name(name: &str) -> Result<Arc<dyn HashAlgorithm>, HashError> {
    match name.to_ascii_lowercase().as_str() {
        "blake3" => Ok(Arc::new(Blake3)),
        "sha256" | "sha-256" => Ok(Arc::new(Sha256)),
        other => Err(HashError::UnknownAlgorithm(other.to_string())),
    }
}

/// Errors from hash algorithm selection.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum HashError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
}
