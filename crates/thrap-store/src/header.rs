use serde::{Deserialize, Serialize};
use thrap_crypto::ContentHasher;
use thrap_types::Digest;

use crate::error::StoreResult;
use crate::object::{codec, Object};

/// One version in a named entity's history.
///
/// Headers are objects themselves: each is stored under its own digest, and
/// that digest covers `previous`, so altering any historical header changes
/// every digest after it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainHeader {
    /// Digest of the preceding header; the zero digest for genesis.
    pub previous: Digest,
    /// Digest of the payload object; the zero digest for genesis.
    pub data_digest: Digest,
    /// Unix timestamp in nanoseconds.
    pub timestamp: i64,
    /// 0 for genesis, +1 per version. Assigned by the ref store.
    pub height: u64,
}

impl ChainHeader {
    /// A header extending `previous` with the payload at `data_digest`,
    /// stamped with the current time. Its height is assigned on write.
    pub fn new(previous: Digest, data_digest: Digest) -> Self {
        Self {
            previous,
            data_digest,
            timestamp: now_nanos(),
            height: 0,
        }
    }

    /// The genesis header for a chain whose digests are `zero.len()` bytes.
    pub fn genesis(zero: Digest) -> Self {
        Self::new(zero.clone(), zero)
    }

    /// Returns `true` if this header has no predecessor.
    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.previous.is_zero()
    }
}

impl Object for ChainHeader {
    fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher
            .update_u64(self.height)
            .update(self.previous.as_bytes())
            .update_i64(self.timestamp)
            .update(self.data_digest.as_bytes());
    }

    fn marshal(&self) -> StoreResult<Vec<u8>> {
        codec::encode(self)
    }

    fn unmarshal(bytes: &[u8]) -> StoreResult<Self> {
        codec::decode(bytes)
    }
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use thrap_crypto::{HashAlgorithm, Sha256};

    fn fixed(previous: Digest, data: Digest, timestamp: i64, height: u64) -> ChainHeader {
        ChainHeader {
            previous,
            data_digest: data,
            timestamp,
            height,
        }
    }

    #[test]
    fn genesis_links_to_zero() {
        let g = ChainHeader::genesis(Digest::zero(32));
        assert!(g.is_genesis());
        assert!(g.data_digest.is_zero());
        assert!(g.timestamp > 0);
    }

    #[test]
    fn hash_layout_is_height_previous_timestamp_data() {
        let h = fixed(Digest::from([1u8; 32]), Digest::from([2u8; 32]), 7, 3);
        let mut expected = Vec::new();
        expected.extend_from_slice(&3u64.to_be_bytes());
        expected.extend_from_slice(&[1u8; 32]);
        expected.extend_from_slice(&7i64.to_be_bytes());
        expected.extend_from_slice(&[2u8; 32]);
        assert_eq!(h.digest(&Sha256), Sha256.digest(&expected));
    }

    #[test]
    fn every_field_affects_digest() {
        let base = fixed(Digest::zero(32), Digest::from([5u8; 32]), 100, 1);
        let d = base.digest(&Sha256);

        let mut other = base.clone();
        other.height = 2;
        assert_ne!(other.digest(&Sha256), d);

        let mut other = base.clone();
        other.timestamp = 101;
        assert_ne!(other.digest(&Sha256), d);

        let mut other = base.clone();
        other.previous = Digest::from([9u8; 32]);
        assert_ne!(other.digest(&Sha256), d);

        let mut other = base;
        other.data_digest = Digest::from([6u8; 32]);
        assert_ne!(other.digest(&Sha256), d);
    }

    #[test]
    fn marshal_roundtrip() {
        let h = ChainHeader::new(Digest::from([3u8; 32]), Digest::from([4u8; 32]));
        let back = ChainHeader::unmarshal(&h.marshal().unwrap()).unwrap();
        assert_eq!(back, h);
    }
}
