use std::ops::ControlFlow;
use std::sync::Arc;

use crate::error::{KvError, KvResult};

/// Visitor for [`KvRead::scan_prefix`]. Return `ControlFlow::Break(())` to
/// stop early.
pub type ScanVisitor<'a> = dyn FnMut(&[u8], &[u8]) -> ControlFlow<()> + 'a;

/// Read access inside a transaction.
pub trait KvRead {
    /// Read the value stored at `key`.
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>>;

    /// Visit every `(key, value)` whose key starts with `prefix`, in
    /// ascending key order.
    fn scan_prefix(&self, prefix: &[u8], visit: &mut ScanVisitor<'_>) -> KvResult<()>;

    /// Returns `true` if a value is stored at `key`.
    fn contains(&self, key: &[u8]) -> KvResult<bool> {
        Ok(self.get(key)?.is_some())
    }
}

/// Write access inside a read-write transaction.
pub trait KvWrite: KvRead {
    /// Store `value` at `key`, replacing any previous value.
    fn set(&mut self, key: &[u8], value: &[u8]) -> KvResult<()>;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&mut self, key: &[u8]) -> KvResult<()>;
}

/// A transactional ordered byte-key store.
///
/// Implementations must be safe to share across threads. Closures receive a
/// transaction handle and may return any error type that can absorb a
/// [`KvError`], so callers keep their own error taxonomy end to end.
pub trait KvEngine: Send + Sync {
    /// Run `f` against a read-only snapshot.
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<KvError>,
        F: FnOnce(&dyn KvRead) -> Result<T, E>;

    /// Run `f` inside a read-write transaction. The transaction commits only
    /// if `f` returns `Ok`.
    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<KvError>,
        F: FnOnce(&mut dyn KvWrite) -> Result<T, E>;
}

impl<K: KvEngine> KvEngine for Arc<K> {
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<KvError>,
        F: FnOnce(&dyn KvRead) -> Result<T, E>,
    {
        (**self).view(f)
    }

    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<KvError>,
        F: FnOnce(&mut dyn KvWrite) -> Result<T, E>,
    {
        (**self).update(f)
    }
}
