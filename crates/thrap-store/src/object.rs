use thrap_crypto::{ContentHasher, HashAlgorithm};
use thrap_types::Digest;

use crate::error::StoreResult;

/// The capability every storable entity implements.
///
/// Hashing and serialization are deliberately separate: the digest is
/// computed from [`hash_into`](Self::hash_into), never from the marshaled
/// bytes, so the wire encoding may change without changing any digest.
pub trait Object: Sized {
    /// Write a canonical encoding of every semantically relevant field.
    ///
    /// Map and set fields must be written in sorted-key order so that equal
    /// content always produces equal digests, whatever the in-memory
    /// iteration order. The caller finalizes the hasher.
    fn hash_into(&self, hasher: &mut ContentHasher);

    /// Serialize to bytes for storage.
    fn marshal(&self) -> StoreResult<Vec<u8>>;

    /// Deserialize from stored bytes.
    fn unmarshal(bytes: &[u8]) -> StoreResult<Self>;

    /// Compute this object's digest with `algorithm`.
    fn digest(&self, algorithm: &dyn HashAlgorithm) -> Digest {
        let mut hasher = algorithm.hasher();
        self.hash_into(&mut hasher);
        hasher.finalize()
    }
}

/// bincode helpers for serde-derived objects.
pub mod codec {
    use serde::de::DeserializeOwned;
    use serde::Serialize;

    use crate::error::{StoreError, StoreResult};

    /// Encode a value with bincode.
    pub fn encode<T: Serialize>(value: &T) -> StoreResult<Vec<u8>> {
        bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Decode a value with bincode.
    pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

/// Raw content object. Stored bytes are the content itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    pub data: Vec<u8>,
}

impl Blob {
    /// Create a new blob from raw bytes.
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl Object for Blob {
    fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher.update(&self.data);
    }

    fn marshal(&self) -> StoreResult<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn unmarshal(bytes: &[u8]) -> StoreResult<Self> {
        Ok(Self::new(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thrap_crypto::{Blake3, Sha256};

    #[test]
    fn blob_digest_is_plain_hash_of_content() {
        let blob = Blob::new(&b"hello"[..]);
        assert_eq!(blob.digest(&Sha256), Sha256.digest(b"hello"));
    }

    #[test]
    fn blob_marshal_is_identity() {
        let blob = Blob::new(vec![1, 2, 3]);
        let bytes = blob.marshal().unwrap();
        assert_eq!(bytes, vec![1, 2, 3]);
        assert_eq!(Blob::unmarshal(&bytes).unwrap(), blob);
    }

    #[test]
    fn digest_depends_on_algorithm() {
        let blob = Blob::new(&b"x"[..]);
        assert_ne!(blob.digest(&Blake3), blob.digest(&Sha256));
    }

    #[test]
    fn codec_rejects_truncated_input() {
        let bytes = codec::encode(&(42u64, String::from("payload"))).unwrap();
        let err = codec::decode::<(u64, String)>(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, crate::StoreError::Serialization(_)));
    }
}
