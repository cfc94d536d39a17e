//! Foundation types for the thrap store.
//!
//! Every other thrap crate depends on `thrap-types`.
//!
//! # Key Types
//!
//! - [`Digest`]: content-addressed identifier produced by a pluggable hash
//!   algorithm. Also the value a ref points to.

pub mod digest;
pub mod error;

pub use digest::Digest;
pub use error::TypeError;
