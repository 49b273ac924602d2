//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `assets` - Asset definitions (key: asset_id)
//! - `balances` - Per-user holdings (key: user_id || asset_id)
//! - `pools` - Launch pools (key: pool_id)
//! - `positions` - Live stake positions (key: user_id || pool_id)
//! - `transactions` - Append-only trail (key: user_id || record_id)
//! - `indices` - Symbol lookup and id sequences
//!
//! All ids are encoded big-endian so a prefix scan over `user_id` returns a
//! user's rows in id order, and trail records in creation order (UUIDv7).
//!
//! Writes never go straight to the database: they are staged in a
//! [`UnitOfWork`] and land as one `WriteBatch` on commit.

use crate::{
    error::{Error, Result},
    types::{
        Asset, AssetId, Pool, PoolId, StakePosition, TransactionRecord, UserAssetBalance, UserId,
    },
    unit_of_work::UnitOfWork,
    Config,
};
use parking_lot::{Mutex, MutexGuard};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, Snapshot,
    WriteBatch, WriteOptions, DB,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Column family names
const CF_ASSETS: &str = "assets";
const CF_BALANCES: &str = "balances";
const CF_POOLS: &str = "pools";
const CF_POSITIONS: &str = "positions";
const CF_TRANSACTIONS: &str = "transactions";
const CF_INDICES: &str = "indices";

/// Logical table, one per column family
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Table {
    /// Asset definitions
    Assets,
    /// User balances
    Balances,
    /// Pools
    Pools,
    /// Stake positions
    Positions,
    /// Transaction trail
    Transactions,
    /// Secondary indices and sequences
    Indices,
}

impl Table {
    /// Every table
    pub const ALL: [Table; 6] = [
        Table::Assets,
        Table::Balances,
        Table::Pools,
        Table::Positions,
        Table::Transactions,
        Table::Indices,
    ];

    /// Backing column family
    pub fn cf_name(self) -> &'static str {
        match self {
            Table::Assets => CF_ASSETS,
            Table::Balances => CF_BALANCES,
            Table::Pools => CF_POOLS,
            Table::Positions => CF_POSITIONS,
            Table::Transactions => CF_TRANSACTIONS,
            Table::Indices => CF_INDICES,
        }
    }
}

/// Key encoding
pub mod keys {
    use super::*;

    /// `asset_id`
    pub fn asset(asset_id: AssetId) -> Vec<u8> {
        asset_id.to_key().to_vec()
    }

    /// `user_id || asset_id`
    pub fn balance(user_id: UserId, asset_id: AssetId) -> Vec<u8> {
        let mut key = user_id.to_key().to_vec();
        key.extend_from_slice(&asset_id.to_key());
        key
    }

    /// `pool_id`
    pub fn pool(pool_id: PoolId) -> Vec<u8> {
        pool_id.to_key().to_vec()
    }

    /// `user_id || pool_id`
    pub fn position(user_id: UserId, pool_id: PoolId) -> Vec<u8> {
        let mut key = user_id.to_key().to_vec();
        key.extend_from_slice(&pool_id.to_key());
        key
    }

    /// `user_id || record_id`
    pub fn transaction(user_id: UserId, record_id: Uuid) -> Vec<u8> {
        let mut key = user_id.to_key().to_vec();
        key.extend_from_slice(record_id.as_bytes());
        key
    }

    /// Prefix shared by all rows of one user
    pub fn user_prefix(user_id: UserId) -> Vec<u8> {
        user_id.to_key().to_vec()
    }

    /// Symbol -> asset_id index entry
    pub fn asset_symbol(symbol: &str) -> Vec<u8> {
        let mut key = b"sym|".to_vec();
        key.extend_from_slice(symbol.as_bytes());
        key
    }

    /// Id sequence counter
    pub fn sequence(name: &str) -> Vec<u8> {
        let mut key = b"seq|".to_vec();
        key.extend_from_slice(name.as_bytes());
        key
    }
}

/// Point reads shared by committed storage and an open unit of work
pub trait ReadStore {
    /// Raw value for `key` in `table`
    fn get_raw(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Decoded value for `key` in `table`
    fn get<T: DeserializeOwned>(&self, table: Table, key: &[u8]) -> Result<Option<T>> {
        match self.get_raw(table, key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Asset by id
    fn asset(&self, asset_id: AssetId) -> Result<Option<Asset>> {
        self.get(Table::Assets, &keys::asset(asset_id))
    }

    /// Asset id registered for `symbol`, read from the symbol index
    fn asset_id_by_symbol(&self, symbol: &str) -> Result<Option<AssetId>> {
        self.get(Table::Indices, &keys::asset_symbol(symbol))
    }

    /// Asset by symbol
    fn asset_by_symbol(&self, symbol: &str) -> Result<Option<Asset>> {
        match self.asset_id_by_symbol(symbol)? {
            Some(asset_id) => self.asset(asset_id),
            None => Ok(None),
        }
    }

    /// Pool by id
    fn pool(&self, pool_id: PoolId) -> Result<Option<Pool>> {
        self.get(Table::Pools, &keys::pool(pool_id))
    }

    /// Balance row for (user, asset)
    fn balance(&self, user_id: UserId, asset_id: AssetId) -> Result<Option<UserAssetBalance>> {
        self.get(Table::Balances, &keys::balance(user_id, asset_id))
    }

    /// Live position for (user, pool)
    fn position(&self, user_id: UserId, pool_id: PoolId) -> Result<Option<StakePosition>> {
        self.get(Table::Positions, &keys::position(user_id, pool_id))
    }
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,

    /// Held by the one open unit of work
    writer: Mutex<()>,

    /// fsync the WAL on commit
    sync_writes: bool,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl Storage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = Table::ALL
            .iter()
            .map(|table| ColumnFamilyDescriptor::new(table.cf_name(), Self::cf_options(*table)))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(
            path = ?path,
            column_families = Table::ALL.len(),
            "Opened RocksDB"
        );

        Ok(Self {
            db: Arc::new(db),
            writer: Mutex::new(()),
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options(table: Table) -> Options {
        let mut opts = Options::default();
        match table {
            Table::Transactions => {
                // Append-only and rarely read back
                opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
                opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
            }
            Table::Indices => {
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                let mut block_opts = rocksdb::BlockBasedOptions::default();
                block_opts.set_bloom_filter(10.0, false);
                opts.set_block_based_table_factory(&block_opts);
            }
            _ => {
                // Hot rows, read on every operation
                opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
            }
        }
        opts
    }

    fn cf_handle(&self, table: Table) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(table.cf_name())
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", table.cf_name())))
    }

    /// Open a unit of work; blocks while another one is open
    pub fn begin(&self, label: &'static str) -> UnitOfWork<'_> {
        UnitOfWork::new(self, label)
    }

    /// Point-in-time view of committed state
    pub fn snapshot(&self) -> StorageSnapshot<'_> {
        StorageSnapshot {
            storage: self,
            snapshot: self.db.snapshot(),
        }
    }

    pub(crate) fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock()
    }

    /// Apply staged writes as one atomic batch
    pub(crate) fn commit_staged(
        &self,
        staged: &BTreeMap<(Table, Vec<u8>), Option<Vec<u8>>>,
    ) -> Result<()> {
        let mut batch = WriteBatch::default();

        for ((table, key), value) in staged {
            let cf = self.cf_handle(*table)?;
            match value {
                Some(value) => batch.put_cf(cf, key, value),
                None => batch.delete_cf(cf, key),
            }
        }

        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        self.db.write_opt(batch, &write_opts)?;

        Ok(())
    }

    // Scans (committed state only)

    /// All rows of `table` whose key starts with `prefix`
    pub fn scan_prefix<T: DeserializeOwned>(&self, table: Table, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.cf_handle(table)?;
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        collect_prefix(iter, prefix)
    }

    /// Every row of `table`
    pub fn scan_all<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>> {
        self.scan_prefix(table, &[])
    }

    /// A user's positions, ordered by pool id
    pub fn positions_for_user(&self, user_id: UserId) -> Result<Vec<StakePosition>> {
        self.scan_prefix(Table::Positions, &keys::user_prefix(user_id))
    }

    /// Live positions in one pool (full scan)
    pub fn positions_in_pool(&self, pool_id: PoolId) -> Result<Vec<StakePosition>> {
        let positions: Vec<StakePosition> = self.scan_all(Table::Positions)?;
        Ok(positions
            .into_iter()
            .filter(|position| position.pool_id == pool_id)
            .collect())
    }

    /// A user's balance rows, ordered by asset id
    pub fn balances_for_user(&self, user_id: UserId) -> Result<Vec<UserAssetBalance>> {
        self.scan_prefix(Table::Balances, &keys::user_prefix(user_id))
    }

    /// A user's trail, oldest first
    pub fn transactions_for_user(&self, user_id: UserId) -> Result<Vec<TransactionRecord>> {
        self.scan_prefix(Table::Transactions, &keys::user_prefix(user_id))
    }

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            approximate_pools: self.approximate_count(Table::Pools)?,
            approximate_positions: self.approximate_count(Table::Positions)?,
            approximate_transactions: self.approximate_count(Table::Transactions)?,
        })
    }

    fn approximate_count(&self, table: Table) -> Result<u64> {
        let cf = self.cf_handle(table)?;
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);

        Ok(prop)
    }
}

impl ReadStore for Storage {
    fn get_raw(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf_handle(table)?;
        Ok(self.db.get_cf(cf, key)?)
    }
}

/// Consistent read view over several rows and column families
///
/// Commits made after the snapshot was taken are invisible through it.
pub struct StorageSnapshot<'a> {
    storage: &'a Storage,
    snapshot: Snapshot<'a>,
}

impl std::fmt::Debug for StorageSnapshot<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageSnapshot")
            .field("storage", self.storage)
            .finish_non_exhaustive()
    }
}

impl StorageSnapshot<'_> {
    /// All rows of `table` whose key starts with `prefix`, as of the snapshot
    pub fn scan_prefix<T: DeserializeOwned>(&self, table: Table, prefix: &[u8]) -> Result<Vec<T>> {
        let cf = self.storage.cf_handle(table)?;
        let iter = self
            .snapshot
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));

        collect_prefix(iter, prefix)
    }

    /// A user's positions, ordered by pool id
    pub fn positions_for_user(&self, user_id: UserId) -> Result<Vec<StakePosition>> {
        self.scan_prefix(Table::Positions, &keys::user_prefix(user_id))
    }

    /// A user's balance rows, ordered by asset id
    pub fn balances_for_user(&self, user_id: UserId) -> Result<Vec<UserAssetBalance>> {
        self.scan_prefix(Table::Balances, &keys::user_prefix(user_id))
    }
}

impl ReadStore for StorageSnapshot<'_> {
    fn get_raw(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.storage.cf_handle(table)?;
        Ok(self.snapshot.get_cf(cf, key)?)
    }
}

fn collect_prefix<T, I>(iter: I, prefix: &[u8]) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    I: Iterator<Item = std::result::Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>>,
{
    let mut rows = Vec::new();
    for item in iter {
        let (key, value) = item?;
        if !key.starts_with(prefix) {
            break;
        }
        rows.push(bincode::deserialize(&value)?);
    }

    Ok(rows)
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Estimated pool count
    pub approximate_pools: u64,
    /// Estimated live position count
    pub approximate_positions: u64,
    /// Estimated trail length
    pub approximate_transactions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        config.rocksdb.sync_writes = false;
        (Storage::open(&config).unwrap(), temp_dir)
    }

    fn balance(user: u64, asset: u64) -> UserAssetBalance {
        let mut row = UserAssetBalance::new(UserId(user), AssetId(asset), Utc::now());
        row.available = dec!(10);
        row
    }

    #[test]
    fn test_storage_open_creates_column_families() {
        let (storage, _temp) = test_storage();
        for table in Table::ALL {
            assert!(storage.db.cf_handle(table.cf_name()).is_some());
        }
    }

    #[test]
    fn test_prefix_scan_stays_within_user() {
        let (storage, _temp) = test_storage();

        let mut uow = storage.begin("seed");
        for (user, asset) in [(1, 1), (1, 2), (2, 1), (256, 1)] {
            uow.put(
                Table::Balances,
                keys::balance(UserId(user), AssetId(asset)),
                &balance(user, asset),
            )
            .unwrap();
        }
        uow.commit().unwrap();

        let rows = storage.balances_for_user(UserId(1)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].asset_id, AssetId(1));
        assert_eq!(rows[1].asset_id, AssetId(2));

        assert_eq!(storage.balances_for_user(UserId(2)).unwrap().len(), 1);
        assert!(storage.balances_for_user(UserId(3)).unwrap().is_empty());
    }

    #[test]
    fn test_snapshot_ignores_later_commits() {
        let (storage, _temp) = test_storage();

        let original = balance(1, 1);
        let mut uow = storage.begin("seed");
        uow.put(Table::Balances, keys::balance(UserId(1), AssetId(1)), &original)
            .unwrap();
        uow.commit().unwrap();

        let snapshot = storage.snapshot();

        let mut uow = storage.begin("later");
        let mut row = original.clone();
        row.available = dec!(1);
        uow.put(Table::Balances, keys::balance(UserId(1), AssetId(1)), &row)
            .unwrap();
        uow.put(Table::Balances, keys::balance(UserId(1), AssetId(2)), &balance(1, 2))
            .unwrap();
        uow.commit().unwrap();

        let seen = snapshot.balances_for_user(UserId(1)).unwrap();
        assert_eq!(seen, vec![original.clone()]);
        assert_eq!(
            snapshot.balance(UserId(1), AssetId(1)).unwrap(),
            Some(original)
        );
        assert_eq!(storage.balances_for_user(UserId(1)).unwrap().len(), 2);
    }

    #[test]
    fn test_symbol_index_lookup() {
        let (storage, _temp) = test_storage();

        let asset = Asset {
            id: AssetId(9),
            symbol: "ETH".to_string(),
            name: "Ether".to_string(),
            created_at: Utc::now(),
        };

        let mut uow = storage.begin("seed");
        uow.put(Table::Assets, keys::asset(asset.id), &asset).unwrap();
        uow.put(Table::Indices, keys::asset_symbol("ETH"), &asset.id)
            .unwrap();
        uow.commit().unwrap();

        assert_eq!(storage.asset_id_by_symbol("ETH").unwrap(), Some(AssetId(9)));
        assert_eq!(storage.asset_by_symbol("ETH").unwrap(), Some(asset));
        assert_eq!(storage.asset_by_symbol("BTC").unwrap(), None);
    }
}
