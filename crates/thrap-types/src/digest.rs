use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content-addressed identifier for a stored object or chain header.
///
/// A `Digest` holds the raw output of whichever hash algorithm the store was
/// built with, so its length is a property of that algorithm (32 bytes for
/// BLAKE3 and SHA-256). Identical content always produces the same digest.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Digest(Vec<u8>);

impl Digest {
    /// Wrap raw digest bytes.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Copy raw digest bytes from a slice.
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// The zero digest of the given length. Marks "no predecessor".
    pub fn zero(len: usize) -> Self {
        Self(vec![0u8; len])
    }

    /// Returns `true` if every byte is zero.
    ///
    /// An empty digest is not a zero digest.
    pub fn is_zero(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|b| *b == 0)
    }

    /// Digest length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if the digest holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consume the digest, returning its bytes.
    pub fn into_vec(self) -> Vec<u8> {
        self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Short hex representation (first 8 characters).
    pub fn short_hex(&self) -> String {
        let end = self.0.len().min(4);
        hex::encode(&self.0[..end])
    }

    /// Parse from a hex string of any non-zero even length.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.is_empty() {
            return Err(TypeError::Empty);
        }
        Ok(Self(bytes))
    }

    /// Parse from a hex string, requiring an exact byte length.
    pub fn from_hex_len(s: &str, expected: usize) -> Result<Self, TypeError> {
        let digest = Self::from_hex(s)?;
        if digest.len() != expected {
            return Err(TypeError::InvalidLength {
                expected,
                actual: digest.len(),
            });
        }
        Ok(digest)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.short_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for Digest {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<Vec<u8>> for Digest {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}
