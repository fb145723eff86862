// ── Device state persistence ──
//
// A small typed key-value layer with two backends (in-memory and redb)
// and the light-state cache built on top of it.

mod kv;
mod state_cache;

pub use kv::{KeyValueStore, MemoryStore, RedbStore};
pub use state_cache::LightStateCache;

use thiserror::Error;

/// Failure inside a [`KeyValueStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot open state database: {0}")]
    Open(#[from] redb::DatabaseError),

    #[error("transaction failed: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("table unavailable: {0}")]
    Table(#[from] redb::TableError),

    #[error("storage I/O failed: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("commit failed: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("cannot create state directory: {0}")]
    Io(#[from] std::io::Error),
}
