/// Errors surfaced by a key-value engine.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Failure reported by the redb engine (I/O, corruption, commit failure).
    #[error("redb: {0}")]
    Redb(#[from] redb::Error),

    /// I/O error while preparing the engine's directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A thread panicked while holding the in-memory engine's lock.
    #[error("engine lock poisoned")]
    LockPoisoned,
}

impl KvError {
    pub(crate) fn redb<E: Into<redb::Error>>(e: E) -> Self {
        Self::Redb(e.into())
    }
}

/// Result alias for engine operations.
pub type KvResult<T> = Result<T, KvError>;
