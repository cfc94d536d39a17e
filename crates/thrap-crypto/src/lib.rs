//! Content hashing for the thrap store.
//!
//! The store never hard-codes a hash function. It is handed a
//! [`HashAlgorithm`] strategy at construction time and asks it for a fresh
//! [`ContentHasher`] every time a digest is needed. Objects write their
//! canonical encoding into the hasher; the store finalizes it.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod algorithm;
pub mod hasher;

pub use algorithm::{algorithm_from_name, Blake3, HashAlgorithm, HashError, Sha256};
pub use hasher::ContentHasher;
