use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, warn};

use crate::engine::{KvEngine, KvRead, KvWrite, ScanVisitor};
use crate::error::{KvError, KvResult};

/// File name of the database inside the data directory.
pub const DB_FILE: &str = "thrap.redb";

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("thrap");

/// Durable engine backed by a single redb table of byte keys to byte values.
///
/// redb provides the transactional guarantees: one writer at a time, MVCC
/// snapshots for readers, and crash-consistent commits.
pub struct RedbEngine {
    db: Database,
    path: PathBuf,
}

impl RedbEngine {
    /// Open (or create) the engine in `dir`.
    pub fn open(dir: impl AsRef<Path>) -> KvResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE);
        let db = Database::create(&path).map_err(KvError::redb)?;

        // Read transactions fail on tables that were never created.
        let txn = db.begin_write().map_err(KvError::redb)?;
        txn.open_table(TABLE).map_err(KvError::redb)?;
        txn.commit().map_err(KvError::redb)?;

        debug!(path = %path.display(), "opened redb engine");
        Ok(Self { db, path })
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for RedbEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbEngine")
            .field("path", &self.path)
            .finish()
    }
}

impl KvEngine for RedbEngine {
    fn view<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<KvError>,
        F: FnOnce(&dyn KvRead) -> Result<T, E>,
    {
        let txn = self.db.begin_read().map_err(KvError::redb)?;
        let table = txn.open_table(TABLE).map_err(KvError::redb)?;
        f(&TableHandle { table })
    }

    fn update<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<KvError>,
        F: FnOnce(&mut dyn KvWrite) -> Result<T, E>,
    {
        let txn = self.db.begin_write().map_err(KvError::redb)?;
        let result = {
            let table = txn.open_table(TABLE).map_err(KvError::redb)?;
            let mut handle = TableHandle { table };
            f(&mut handle)
        };
        match result {
            Ok(out) => {
                txn.commit().map_err(KvError::redb)?;
                Ok(out)
            }
            Err(e) => {
                if let Err(abort) = txn.abort() {
                    warn!(error = %abort, "failed to abort write transaction");
                }
                Err(e)
            }
        }
    }
}

/// Adapter from a redb table (read-only or writable) to the engine traits.
struct TableHandle<T> {
    table: T,
}

fn table_get<T>(table: &T, key: &[u8]) -> KvResult<Option<Vec<u8>>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let value = table.get(key).map_err(KvError::redb)?;
    Ok(value.map(|guard| guard.value().to_vec()))
}

fn table_scan<T>(table: &T, prefix: &[u8], visit: &mut ScanVisitor<'_>) -> KvResult<()>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    for entry in table.range(prefix..).map_err(KvError::redb)? {
        let (key, value) = entry.map_err(KvError::redb)?;
        let key = key.value();
        if !key.starts_with(prefix) {
            break;
        }
        if let ControlFlow::Break(()) = visit(key, value.value()) {
            break;
        }
    }
    Ok(())
}

impl<T> KvRead for TableHandle<T>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    fn get(&self, key: &[u8]) -> KvResult<Option<Vec<u8>>> {
        table_get(&self.table, key)
    }

    fn scan_prefix(&self, prefix: &[u8], visit: &mut ScanVisitor<'_>) -> KvResult<()> {
        table_scan(&self.table, prefix, visit)
    }
}

impl KvWrite for TableHandle<redb::Table<'_, &'static [u8], &'static [u8]>> {
    fn set(&mut self, key: &[u8], value: &[u8]) -> KvResult<()> {
        self.table.insert(key, value).map_err(KvError::redb)?;
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> KvResult<()> {
        self.table.remove(key).map_err(KvError::redb)?;
        Ok(())
    }
}
