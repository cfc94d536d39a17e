//! Content-addressed, hash-chained object store.
//!
//! This crate backs durable registration and versioning of thrap entities.
//! It layers three things over an ordered transactional key-value engine:
//!
//! - [`ObjectStore`]: immutable objects keyed by the digest of their
//!   canonical encoding, partitioned by namespace
//! - [`ChainHeader`]: one version of a named entity, linked to the digest of
//!   its predecessor (analogous to a commit)
//! - [`RefStore`]: mutable named pointers to the latest chain header, with
//!   compare-and-swap advancement and full-history traversal
//!
//! # Key Layout
//!
//! ```text
//! <prefix>/<namespace>/objects/<raw digest bytes>
//! <prefix>/<namespace>/refs/<name>
//! ```
//!
//! # Design Rules
//!
//! 1. Objects are immutable once written; writing an existing digest fails
//!    with [`StoreError::AlreadyExists`].
//! 2. A chain header and the ref pointing at it are written in one engine
//!    transaction.
//! 3. Deleting a ref never deletes objects; history stays reachable by digest.
//! 4. Every engine error is propagated unchanged to the caller.

pub mod error;
pub mod header;
pub mod keys;
pub mod names;
pub mod object;
pub mod objects;
pub mod refs;

pub use error::{Entry, StoreError, StoreResult};
pub use header::ChainHeader;
pub use keys::Keyspace;
pub use names::{validate_namespace, validate_ref_name};
pub use object::{codec, Blob, Object};
pub use objects::ObjectStore;
pub use refs::RefStore;

pub use thrap_crypto::{ContentHasher, HashAlgorithm};
pub use thrap_types::Digest;
