use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thrap_store::{codec, ContentHasher, Digest, HashAlgorithm, Object, StoreResult};

use crate::component::sorted;
use crate::entity::Entity;
use crate::error::ValidationErrors;

/// A user or service identity and its public key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Identity {
    /// Defaults to `email` during validation.
    pub id: String,
    pub email: String,
    pub public_key: Vec<u8>,
    pub nonce: u64,
    pub meta: HashMap<String, String>,
    /// Signature over [`sig_hash`](Self::sig_hash).
    pub signature: Vec<u8>,
}

impl Identity {
    pub fn new(email: &str, public_key: Vec<u8>) -> Self {
        Self {
            email: email.to_string(),
            public_key,
            nonce: time_nonce(),
            ..Self::default()
        }
    }

    /// Require an email address and a public key; default the id to the
    /// email.
    pub fn validate(&mut self) -> Result<(), ValidationErrors> {
        let mut errs = ValidationErrors::new();
        if self.email.is_empty() {
            errs.add("email", "missing");
        } else if !self.email.contains('@') {
            errs.add("email", "invalid");
        }
        if self.public_key.is_empty() {
            errs.add("public_key", "missing");
        }
        errs.into_result()?;

        if self.id.is_empty() {
            self.id = self.email.clone();
        }
        Ok(())
    }

    /// Digest to sign: every field except the signature.
    pub fn sig_hash(&self, algorithm: &dyn HashAlgorithm) -> Digest {
        let mut hasher = algorithm.hasher();
        self.hash_unsigned(&mut hasher);
        hasher.finalize()
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(&self.public_key)
    }

    fn hash_unsigned(&self, hasher: &mut ContentHasher) {
        hasher
            .update_u64(self.nonce)
            .update_str(&self.id)
            .update_str(&self.email)
            .update_bytes(&self.public_key)
            .update_len(self.meta.len());
        for (key, value) in sorted(&self.meta) {
            hasher.update_str(key).update_str(value);
        }
    }
}

impl Object for Identity {
    fn hash_into(&self, hasher: &mut ContentHasher) {
        self.hash_unsigned(hasher);
        hasher.update_bytes(&self.signature);
    }

    fn marshal(&self) -> StoreResult<Vec<u8>> {
        codec::encode(self)
    }

    fn unmarshal(bytes: &[u8]) -> StoreResult<Self> {
        codec::decode(bytes)
    }
}

impl Entity for Identity {
    const KIND: &'static str = "identity";

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&mut self) -> Result<(), ValidationErrors> {
        Identity::validate(self)
    }
}

fn time_nonce() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}
