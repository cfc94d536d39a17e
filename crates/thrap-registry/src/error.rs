use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;
use thrap_store::{Entry, StoreError};

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} {id:?} already registered")]
    AlreadyRegistered { kind: &'static str, id: String },

    #[error("{kind} {id:?} not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} id missing")]
    MissingId { kind: &'static str },

    #[error("{kind} {id:?} was updated concurrently, reload and retry")]
    Conflict { kind: &'static str, id: String },

    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },

    #[error("internal error: {0}")]
    Store(#[from] StoreError),
}

impl RegistryError {
    /// Translate a store error raised while operating on entity `id`.
    ///
    /// Ref-level outcomes become registry outcomes; anything else, including
    /// a missing payload object, stays an internal error.
    pub(crate) fn from_store(kind: &'static str, id: &str, err: StoreError) -> Self {
        match err {
            StoreError::AlreadyExists(Entry::Ref { .. }) => Self::AlreadyRegistered {
                kind,
                id: id.to_string(),
            },
            StoreError::NotFound(Entry::Ref { .. }) => Self::NotFound {
                kind,
                id: id.to_string(),
            },
            StoreError::Conflict { .. } => Self::Conflict {
                kind,
                id: id.to_string(),
            },
            StoreError::InvalidName { name, reason } => Self::Invalid {
                kind,
                reason: format!("id {name:?}: {reason}"),
            },
            other => Self::Store(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_registered(&self) -> bool {
        matches!(self, Self::AlreadyRegistered { .. })
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Validation failures keyed by the field path they concern, for example
/// `component.web`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.0.insert(field.into(), reason.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, reason) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {reason}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}
