use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::engine::{KvEngine, KvRead, KvWrite, ScanVisitor};
use crate::error::{KvError, KvResult};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory, `BTreeMap`-based engine.
///
/// Intended for tests and embedding. Readers share the lock; a write
/// transaction holds the exclusive lock for its whole duration and stages its
/// changes, applying them only when the closure succeeds. Data is lost when
/// the engine is dropped.
pub struct MemoryEngine {
    data: RwLock<Map>,
}

impl MemoryEngine {
    /// Create a new empty engine.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.data.read().map(|m| m.len()).unwrap_or(0)
    }

    /// Returns `true` if no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("key_count", &self.len())
            .finish()
    }
}

impl KvEngine for MemoryEngine {
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<KvError>,
        F: FnOnce(&dyn KvRead) -> Result<T, E>,
    {
        let map = self.data.read().map_err(|_| KvError::LockPoisoned)?;
        f(&Snapshot { map: &*map })
    }

    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<KvError>,
        F: FnOnce(&mut dyn KvWrite) -> Result<T, E>,
    {
        let mut map = self.data.write().map_err(|_| KvError::LockPoisoned)?;
        let (out, staged) = {
            let mut txn = StagedTxn {
                base: &*map,
                staged: BTreeMap::new(),
            };
            let out = f(&mut txn)?;
            (out, txn.staged)
        };
        for (key, value) in staged {
            match value {
                Some(v) => {
                    map.insert(key, v);
                }
                None => {
                    map.remove(&key);
                }
            }
        }
        Ok(out)
    }
}

fn scan_map(map: &Map, prefix: &[u8], visit: &mut ScanVisitor<'_>) {
    for (k, v) in map.range(prefix.to_vec()..) {
        if !k.starts_with(prefix) {
            break;
        }
        if visit(k, v).is_break() {
            break;
        }
    }
}

struct Snapshot<'a> {
    map: &'a Map,
}

impl KvRead for Snapshot<'_> {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8], visit: &mut ScanVisitor<'_>) -> KvResult<()> {
        scan_map(self.map, prefix, visit);
        Ok(())
    }
}

/// Write transaction: reads fall through staged changes to the base map.
/// `None` in `staged` is a pending delete.
struct StagedTxn<'a> {
    base: &'a Map,
    staged: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl KvRead for StagedTxn<'_> {
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        match self.staged.get(key) {
            Some(pending) => Ok(pending.clone()),
            None => Ok(self.base.get(key).cloned()),
        }
    }

    fn scan_prefix(&self, prefix: &[u8], visit: &mut ScanVisitor<'_>) -> KvResult<()> {
        if self.staged.is_empty() {
            scan_map(self.base, prefix, visit);
            return Ok(());
        }
        let mut merged: Map = BTreeMap::new();
        for (k, v) in self.base.range(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            merged.insert(k.clone(), v.clone());
        }
        for (k, pending) in self.staged.range(prefix.to_vec()..) {
            if !k.starts_with(prefix) {
                break;
            }
            match pending {
                Some(v) => merged.insert(k.clone(), v.clone()),
                None => merged.remove(k),
            };
        }
        scan_map(&merged, prefix, visit);
        Ok(())
    }
}

impl KvWrite for StagedTxn<'_> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.staged.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> KvResult<()> {
        self.staged.insert(key.to_vec(), None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::ControlFlow;
    use std::sync::Arc;
    use std::thread;

    #[derive(Debug, thiserror::Error)]
    enum TestError {
        #[error("engine: {0}")]
        Kv(#[from] KvError),
        #[error("abort")]
        Abort,
    }

    fn keys_with_prefix(engine: &MemoryEngine, prefix: &[u8]) -> Vec<Vec<u8>> {
        engine
            .view(|txn| -> KvResult<Vec<Vec<u8>>> {
                let mut out = Vec::new();
                txn.scan_prefix(prefix, &mut |k, _| {
                    out.push(k.to_vec());
                    ControlFlow::Continue(())
                })?;
                Ok(out)
            })
            .unwrap()
    }

    #[test]
    fn set_then_get() {
        let engine = MemoryEngine::new();
        engine
            .update(|txn| -> KvResult<()> { txn.set(b"a", b"1") })
            .unwrap();
        let v = engine.view(|txn| txn.get(b"a")).unwrap();
        assert_eq!(v.as_deref(), Some(&b"1"[..]));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn failed_update_applies_nothing() {
        let engine = MemoryEngine::new();
        let res: Result<(), TestError> = engine.update(|txn| {
            txn.set(b"a", b"1")?;
            txn.set(b"b", b"2")?;
            Err(TestError::Abort)
        });
        assert!(matches!(res, Err(TestError::Abort)));
        assert!(engine.is_empty());
    }

    #[test]
    fn reads_inside_update_see_staged_writes() {
        let engine = MemoryEngine::new();
        engine
            .update(|txn| -> KvResult<()> { txn.set(b"k", b"old") })
            .unwrap();
        engine
            .update(|txn| -> KvResult<()> {
                txn.set(b"k", b"new")?;
                assert_eq!(txn.get(b"k")?.as_deref(), Some(&b"new"[..]));
                txn.delete(b"k")?;
                assert!(!txn.contains(b"k")?);
                Ok(())
            })
            .unwrap();
        assert!(engine.view(|txn| txn.get(b"k")).unwrap().is_none());
    }

    #[test]
    fn prefix_scan_is_ordered_and_bounded() {
        let engine = MemoryEngine::new();
        engine
            .update(|txn| -> KvResult<()> {
                txn.set(b"/s/b", b"")?;
                txn.set(b"/s/a", b"")?;
                txn.set(b"/t/a", b"")?;
                txn.set(b"/r", b"")
            })
            .unwrap();
        assert_eq!(
            keys_with_prefix(&engine, b"/s/"),
            vec![b"/s/a".to_vec(), b"/s/b".to_vec()]
        );
    }

    #[test]
    fn prefix_scan_merges_staged_changes() {
        let engine = MemoryEngine::new();
        engine
            .update(|txn| -> KvResult<()> {
                txn.set(b"p/1", b"")?;
                txn.set(b"p/2", b"")
            })
            .unwrap();
        engine
            .update(|txn| -> KvResult<()> {
                txn.delete(b"p/1")?;
                txn.set(b"p/3", b"")?;
                let mut seen = Vec::new();
                txn.scan_prefix(b"p/", &mut |k, _| {
                    seen.push(k.to_vec());
                    ControlFlow::Continue(())
                })?;
                assert_eq!(seen, vec![b"p/2".to_vec(), b"p/3".to_vec()]);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn scan_stops_on_break() {
        let engine = MemoryEngine::new();
        engine
            .update(|txn| -> KvResult<()> {
                for i in 0..5u8 {
                    txn.set(&[b'x', i], b"")?;
                }
                Ok(())
            })
            .unwrap();
        let count = engine
            .view(|txn| -> KvResult<usize> {
                let mut n = 0;
                txn.scan_prefix(b"x", &mut |_, _| {
                    n += 1;
                    if n == 2 {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                })?;
                Ok(n)
            })
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn concurrent_writers_are_serialized() {
        let engine = Arc::new(MemoryEngine::new());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let engine = Arc::clone(&engine);
                thread::spawn(move || {
                    engine
                        .update(|txn| -> KvResult<()> { txn.set(&[i], &[i]) })
                        .unwrap();
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert_eq!(engine.len(), 8);
    }
}
