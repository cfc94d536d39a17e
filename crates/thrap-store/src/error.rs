use std::fmt;

use thrap_kv::KvError;
use thrap_types::Digest;

/// The stored entry an error refers to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Entry {
    /// A content-addressed object in a namespace.
    Object { namespace: String, digest: Digest },
    /// A named ref in a namespace.
    Ref { namespace: String, name: String },
}

impl Entry {
    pub(crate) fn object(namespace: &str, digest: &Digest) -> Self {
        Self::Object {
            namespace: namespace.to_string(),
            digest: digest.clone(),
        }
    }

    pub(crate) fn reference(namespace: &str, name: &str) -> Self {
        Self::Ref {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Object { namespace, digest } => {
                write!(f, "object {namespace}/{}", digest.short_hex())
            }
            Self::Ref { namespace, name } => write!(f, "ref {namespace}/{name}"),
        }
    }
}

/// Errors from object and ref store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A create-only write hit an existing object digest or ref name.
    #[error("{0} already exists")]
    AlreadyExists(Entry),

    /// Missing object, missing ref, or a predecessor digest that does not
    /// resolve to a stored header.
    #[error("{0} not found")]
    NotFound(Entry),

    /// A stored value could not be read back as the requested type.
    #[error("object {digest} is not a {expected}")]
    TypeMismatch {
        digest: Digest,
        expected: &'static str,
    },

    /// The ref moved since the caller read it.
    #[error("ref {namespace}/{name} points at {actual}, expected {expected}")]
    Conflict {
        namespace: String,
        name: String,
        expected: Digest,
        actual: Digest,
    },

    /// A chain header fails verification.
    #[error("corrupt chain at {digest}: {reason}")]
    CorruptChain { digest: Digest, reason: String },

    /// A namespace or ref name is unusable as a key segment.
    #[error("invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure surfaced unchanged from the key-value engine.
    #[error("engine error: {0}")]
    Engine(#[from] KvError),
}

impl StoreError {
    /// Returns `true` for [`StoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` for [`StoreError::AlreadyExists`].
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    /// Returns `true` for [`StoreError::Conflict`].
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
