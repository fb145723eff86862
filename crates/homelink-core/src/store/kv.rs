use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use redb::{Database, DatabaseError, TableDefinition, WriteTransaction};

use super::StoreError;

const INTS: TableDefinition<&str, i64> = TableDefinition::new("ints");
const STRINGS: TableDefinition<&str, &str> = TableDefinition::new("strings");

/// Typed key-value storage for cached device attributes.
///
/// Integer and string values live in separate namespaces: `put_int("k")`
/// does not affect `get_str("k")`.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError>;
    fn put_int(&self, key: &str, value: i64) -> Result<(), StoreError>;
    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put_str(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// ── In-memory backend ────────────────────────────────────────────────

/// Process-lifetime store. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    ints: DashMap<String, i64>,
    strings: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.ints.get(key).map(|v| *v.value()))
    }

    fn put_int(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.ints.insert(key.to_owned(), value);
        Ok(())
    }

    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.strings.get(key).map(|v| v.value().clone()))
    }

    fn put_str(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.strings.insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

// ── redb backend ─────────────────────────────────────────────────────

const LOCK_RETRIES: u32 = 100;
const LOCK_BACKOFF: Duration = Duration::from_millis(20);

/// File-backed store; values survive restarts.
///
/// redb holds an exclusive lock on an open database, so the file is
/// opened for each operation and closed again. Several hubs (a `watch`
/// and a one-shot command, say) can then share one state file; an
/// operation that finds the lock held waits for it. Calls block and
/// must be kept off async worker threads.
#[derive(Debug, Clone)]
pub struct RedbStore {
    path: PathBuf,
}

impl RedbStore {
    /// Create the database at `path` if needed, along with its parent
    /// directories and both tables.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let store = Self {
            path: path.to_owned(),
        };
        store.write(|txn| {
            txn.open_table(INTS)?;
            txn.open_table(STRINGS)?;
            Ok(())
        })?;

        tracing::debug!(path = %path.display(), "opened state database");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn database(&self) -> Result<Database, StoreError> {
        let mut attempt = 0;
        loop {
            match Database::create(&self.path) {
                Err(DatabaseError::DatabaseAlreadyOpen) if attempt < LOCK_RETRIES => {
                    attempt += 1;
                    std::thread::sleep(LOCK_BACKOFF);
                }
                result => return result.map_err(StoreError::from),
            }
        }
    }

    fn write(
        &self,
        apply: impl FnOnce(&WriteTransaction) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let db = self.database()?;
        let txn = db.begin_write()?;
        apply(&txn)?;
        txn.commit()?;
        Ok(())
    }
}

impl KeyValueStore for RedbStore {
    fn get_int(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let db = self.database()?;
        let txn = db.begin_read()?;
        let table = txn.open_table(INTS)?;
        Ok(table.get(key)?.map(|v| v.value()))
    }

    fn put_int(&self, key: &str, value: i64) -> Result<(), StoreError> {
        self.write(|txn| {
            txn.open_table(INTS)?.insert(key, value)?;
            Ok(())
        })
    }

    fn get_str(&self, key: &str) -> Result<Option<String>, StoreError> {
        let db = self.database()?;
        let txn = db.begin_read()?;
        let table = txn.open_table(STRINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_owned()))
    }

    fn put_str(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.write(|txn| {
            txn.open_table(STRINGS)?.insert(key, value)?;
            Ok(())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn exercise(store: &dyn KeyValueStore) {
        assert_eq!(store.get_int("a").unwrap(), None);
        store.put_int("a", 45).unwrap();
        store.put_int("a", 50).unwrap();
        assert_eq!(store.get_int("a").unwrap(), Some(50));

        assert_eq!(store.get_str("a").unwrap(), None, "namespaces are separate");
        store.put_str("a", "warm").unwrap();
        assert_eq!(store.get_str("a").unwrap().as_deref(), Some("warm"));
        assert_eq!(store.get_int("a").unwrap(), Some(50));
    }

    #[test]
    fn memory_store_semantics() {
        exercise(&MemoryStore::new());
    }

    #[test]
    fn redb_store_semantics() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&RedbStore::open(dir.path().join("state.redb")).unwrap());
    }

    #[test]
    fn redb_stores_share_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        let first = RedbStore::open(&path).unwrap();
        let second = RedbStore::open(&path).unwrap();

        first.put_int("light_a_brightness", 30).unwrap();
        assert_eq!(second.get_int("light_a_brightness").unwrap(), Some(30));
        second.put_str("light_a_power", "OFF").unwrap();
        assert_eq!(first.get_str("light_a_power").unwrap().as_deref(), Some("OFF"));
    }

    #[test]
    fn concurrent_writers_wait_for_the_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.redb");
        let stores = [RedbStore::open(&path).unwrap(), RedbStore::open(&path).unwrap()];

        std::thread::scope(|scope| {
            for (n, store) in stores.iter().enumerate() {
                scope.spawn(move || {
                    for i in 0..20 {
                        store.put_int(&format!("w{n}_{i}"), i).unwrap();
                    }
                });
            }
        });

        for n in 0..2 {
            for i in 0..20 {
                assert_eq!(stores[0].get_int(&format!("w{n}_{i}")).unwrap(), Some(i));
            }
        }
    }

    #[test]
    fn redb_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            store.put_int("light_a_brightness", 12).unwrap();
            store.put_str("light_a_power", "OFF").unwrap();
        }
        let store = RedbStore::open(&path).unwrap();
        assert_eq!(store.get_int("light_a_brightness").unwrap(), Some(12));
        assert_eq!(store.get_str("light_a_power").unwrap().as_deref(), Some("OFF"));
    }
}
