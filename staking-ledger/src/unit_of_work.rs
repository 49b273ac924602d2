//! Scoped, all-or-nothing unit of work
//!
//! A [`UnitOfWork`] stages every write of one ledger operation in memory and
//! serves reads through the staged set first (read-your-writes). Nothing
//! reaches RocksDB until [`UnitOfWork::commit`], which applies the whole set
//! as a single `WriteBatch`.
//!
//! Dropping an uncommitted unit of work discards the staged set. That covers
//! `?` early returns and panics unwinding through an operation alike, so a
//! half-applied operation is never observable.
//!
//! Only one unit of work is open at a time: it holds the storage writer
//! guard for its whole lifetime, which serializes read-validate-write
//! sequences against each other.

use crate::{
    error::Result,
    storage::{keys, ReadStore, Storage, Table},
};
use parking_lot::MutexGuard;
use serde::Serialize;
use std::collections::BTreeMap;

/// Staged write set of one operation
pub struct UnitOfWork<'a> {
    storage: &'a Storage,
    _writer: MutexGuard<'a, ()>,
    label: &'static str,
    staged: BTreeMap<(Table, Vec<u8>), Option<Vec<u8>>>,
    committed: bool,
}

impl std::fmt::Debug for UnitOfWork<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("label", &self.label)
            .field("staged", &self.staged.len())
            .field("committed", &self.committed)
            .finish()
    }
}

impl<'a> UnitOfWork<'a> {
    pub(crate) fn new(storage: &'a Storage, label: &'static str) -> Self {
        let writer = storage.lock_writer();
        tracing::trace!(label, "Unit of work opened");

        Self {
            storage,
            _writer: writer,
            label,
            staged: BTreeMap::new(),
            committed: false,
        }
    }

    /// Stage an upsert
    pub fn put<T: Serialize>(&mut self, table: Table, key: Vec<u8>, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value)?;
        self.staged.insert((table, key), Some(bytes));
        Ok(())
    }

    /// Stage a delete
    pub fn delete(&mut self, table: Table, key: Vec<u8>) {
        self.staged.insert((table, key), None);
    }

    /// Allocate the next id from a named sequence (first id is 1)
    pub fn next_id(&mut self, sequence: &str) -> Result<u64> {
        let key = keys::sequence(sequence);
        let current: u64 = self.get(Table::Indices, &key)?.unwrap_or(0);
        let next = current + 1;
        self.put(Table::Indices, key, &next)?;
        Ok(next)
    }

    /// Number of staged writes
    pub fn staged_len(&self) -> usize {
        self.staged.len()
    }

    /// Apply every staged write atomically
    pub fn commit(mut self) -> Result<()> {
        if !self.staged.is_empty() {
            self.storage.commit_staged(&self.staged)?;
        }
        self.committed = true;

        tracing::debug!(
            label = self.label,
            writes = self.staged.len(),
            "Unit of work committed"
        );

        Ok(())
    }

    /// Discard every staged write
    pub fn rollback(self) {
        // Drop does the work
    }
}

impl ReadStore for UnitOfWork<'_> {
    fn get_raw(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.staged.get(&(table, key.to_vec())) {
            Some(staged) => Ok(staged.clone()),
            None => self.storage.get_raw(table, key),
        }
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.staged.is_empty() {
            tracing::debug!(
                label = self.label,
                discarded = self.staged.len(),
                "Unit of work rolled back"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PoolId;
    use crate::Config;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Storage::open(&config).unwrap(), temp_dir)
    }

    #[test]
    fn test_read_your_writes_before_commit() {
        let (storage, _temp) = test_storage();
        let key = keys::pool(PoolId(1));

        let mut uow = storage.begin("test");
        uow.put(Table::Indices, key.clone(), &42u64).unwrap();

        let staged: Option<u64> = uow.get(Table::Indices, &key).unwrap();
        assert_eq!(staged, Some(42));

        uow.delete(Table::Indices, key.clone());
        let deleted: Option<u64> = uow.get(Table::Indices, &key).unwrap();
        assert_eq!(deleted, None);
    }

    #[test]
    fn test_drop_discards_staged_writes() {
        let (storage, _temp) = test_storage();
        let key = keys::sequence("pools");

        {
            let mut uow = storage.begin("test");
            uow.put(Table::Indices, key.clone(), &7u64).unwrap();
            assert!(storage.get_raw(Table::Indices, &key).unwrap().is_none());
        }

        assert!(storage.get_raw(Table::Indices, &key).unwrap().is_none());
    }

    #[test]
    fn test_commit_applies_all_writes() {
        let (storage, _temp) = test_storage();

        let mut uow = storage.begin("test");
        uow.put(Table::Indices, keys::sequence("a"), &1u64).unwrap();
        uow.put(Table::Indices, keys::sequence("b"), &2u64).unwrap();
        assert_eq!(uow.staged_len(), 2);
        uow.commit().unwrap();

        let a: Option<u64> = storage.get(Table::Indices, &keys::sequence("a")).unwrap();
        let b: Option<u64> = storage.get(Table::Indices, &keys::sequence("b")).unwrap();
        assert_eq!((a, b), (Some(1), Some(2)));
    }

    #[test]
    fn test_panic_inside_unit_of_work_rolls_back() {
        let (storage, _temp) = test_storage();
        let key = keys::sequence("pools");

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut uow = storage.begin("test");
            uow.put(Table::Indices, key.clone(), &1u64).unwrap();
            panic!("fault mid-operation");
        }));

        assert!(result.is_err());
        assert!(storage.get_raw(Table::Indices, &key).unwrap().is_none());

        // Writer guard was released by the unwind
        let uow = storage.begin("after-panic");
        uow.rollback();
    }

    #[test]
    fn test_next_id_sequence() {
        let (storage, _temp) = test_storage();

        let mut uow = storage.begin("test");
        assert_eq!(uow.next_id("assets").unwrap(), 1);
        assert_eq!(uow.next_id("assets").unwrap(), 2);
        assert_eq!(uow.next_id("pools").unwrap(), 1);
        uow.commit().unwrap();

        let mut uow = storage.begin("test");
        assert_eq!(uow.next_id("assets").unwrap(), 3);
    }
}
