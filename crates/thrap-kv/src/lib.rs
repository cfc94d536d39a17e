//! Ordered, transactional byte-key storage for the thrap store.
//!
//! The object and ref stores never talk to a database directly. They consume
//! the narrow [`KvEngine`] contract: a read-only snapshot (`view`), a
//! read-write transaction (`update`), point get/set/delete, and ordered prefix
//! scans.
//!
//! # Engines
//!
//! - [`MemoryEngine`]: `BTreeMap` behind a `RwLock`, for tests and embedding
//! - [`RedbEngine`]: durable, crash-consistent engine on top of `redb`
//!
//! # Transaction Rules
//!
//! 1. `update` applies every write or none of them: the closure's `Err`
//!    discards the transaction.
//! 2. Readers inside `view` see one consistent snapshot.
//! 3. Writers are serialized by the engine; no extra locking is layered on top.
//! 4. Closures running inside a transaction must not open another write
//!    transaction on the same engine.

pub mod engine;
pub mod error;
pub mod memory;
pub mod redb_engine;

pub use engine::{KvEngine, KvRead, KvWrite, ScanVisitor};
pub use error::{KvError, KvResult};
pub use memory::MemoryEngine;
pub use redb_engine::RedbEngine;
