//! Versioned registries of thrap entities.
//!
//! Every entity id is its own namespace in the underlying store and owns one
//! ref, [`LATEST`], whose chain is the entity's version history:
//!
//! ```text
//! genesis (height 0) -> first registration (1) -> update (2) -> ...
//! ```
//!
//! [`EntityStore`] implements the convention once for any [`Entity`];
//! [`StackStore`] and [`IdentityStore`] are the two registries thrap ships.

pub mod component;
pub mod entity;
pub mod error;
pub mod identity;
pub mod registry;
pub mod stack;

pub use component::{Build, Component, ComponentKind, EnvConfig, Secrets, Volume};
pub use entity::{Entity, EntityStore, Version, LATEST};
pub use error::{RegistryError, RegistryResult, ValidationErrors};
pub use identity::Identity;
pub use registry::{IdentityStore, Registry, StackStore, IDENTITY_PREFIX, STACK_PREFIX};
pub use stack::Stack;
