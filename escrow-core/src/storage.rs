//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `locks` - Lock per account (key: address)
//! - `global_points` - Global point log (key: epoch)
//! - `user_points` - Per-account point logs (key: address || epoch)
//! - `slope_changes` - Slope schedule (key: week timestamp)
//! - `meta` - Totals and governance
//!
//! Integer keys are big-endian so iteration order matches epoch/time order.

use crate::{
    checkpoint::CheckpointStore,
    error::{Error, Result},
    escrow::{EscrowState, Governance, StateChange},
    types::{AccountId, Lock, Point, ADDRESS_LEN},
    Config,
};
use rocksdb::{
    AsColumnFamilyRef, BoundColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options,
    WriteBatch, DB,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Column family names
const CF_LOCKS: &str = "locks";
const CF_GLOBAL_POINTS: &str = "global_points";
const CF_USER_POINTS: &str = "user_points";
const CF_SLOPE_CHANGES: &str = "slope_changes";
const CF_META: &str = "meta";

const META_TOTALS: &[u8] = b"totals";
const META_GOVERNANCE: &[u8] = b"governance";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct Totals {
    supply: u128,
    penalty_accumulated: u128,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<DB>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage").field("path", &self.db.path()).finish()
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

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_LOCKS, Self::cf_options_lookup()),
            ColumnFamilyDescriptor::new(CF_GLOBAL_POINTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_USER_POINTS, Self::cf_options_log()),
            ColumnFamilyDescriptor::new(CF_SLOPE_CHANGES, Self::cf_options_lookup()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;
        tracing::info!(path = ?path, "Opened escrow RocksDB");

        Ok(Self { db: Arc::new(db) })
    }

    // Column family options

    fn cf_options_log() -> Options {
        let mut opts = Options::default();
        // Append-only, rarely read back
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_lookup() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    // Batch operations (atomic)

    /// Commit the changes of one operation in a single write batch
    pub fn apply(&self, changes: &[StateChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut batch = WriteBatch::default();

        for change in changes {
            match change {
                StateChange::Lock { account, lock } => {
                    let cf = self.cf_handle(CF_LOCKS)?;
                    batch.put_cf(&cf, account.as_bytes(), bincode::serialize(lock)?);
                }
                StateChange::GlobalPoint { epoch, point } => {
                    let cf = self.cf_handle(CF_GLOBAL_POINTS)?;
                    batch.put_cf(&cf, epoch.to_be_bytes(), bincode::serialize(point)?);
                }
                StateChange::UserPoint {
                    account,
                    epoch,
                    point,
                } => {
                    let cf = self.cf_handle(CF_USER_POINTS)?;
                    batch.put_cf(
                        &cf,
                        Self::user_point_key(account, *epoch),
                        bincode::serialize(point)?,
                    );
                }
                StateChange::SlopeChange { time, delta } => {
                    let cf = self.cf_handle(CF_SLOPE_CHANGES)?;
                    if *delta == 0 {
                        batch.delete_cf(&cf, time.to_be_bytes());
                    } else {
                        batch.put_cf(&cf, time.to_be_bytes(), bincode::serialize(delta)?);
                    }
                }
                StateChange::Totals {
                    supply,
                    penalty_accumulated,
                } => {
                    let cf = self.cf_handle(CF_META)?;
                    let totals = Totals {
                        supply: *supply,
                        penalty_accumulated: *penalty_accumulated,
                    };
                    batch.put_cf(&cf, META_TOTALS, bincode::serialize(&totals)?);
                }
                StateChange::Governance(governance) => {
                    let cf = self.cf_handle(CF_META)?;
                    batch.put_cf(&cf, META_GOVERNANCE, bincode::serialize(governance)?);
                }
            }
        }

        self.db.write(batch)?;
        tracing::debug!(changes = changes.len(), "Committed escrow changes");
        Ok(())
    }

    /// Rebuild the escrow state; `None` for a fresh database
    pub fn load_state(&self) -> Result<Option<EscrowState>> {
        let cf_meta = self.cf_handle(CF_META)?;
        let governance: Governance = match self.db.get_cf(&cf_meta, META_GOVERNANCE)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => return Ok(None),
        };
        let totals: Totals = match self.db.get_cf(&cf_meta, META_TOTALS)? {
            Some(bytes) => bincode::deserialize(&bytes)?,
            None => Totals::default(),
        };

        let mut locks = HashMap::new();
        let cf_locks = self.cf_handle(CF_LOCKS)?;
        for item in self.db.iterator_cf(&cf_locks, IteratorMode::Start) {
            let (key, value) = item?;
            let lock: Lock = bincode::deserialize(&value)?;
            locks.insert(Self::account_from_key(&key)?, lock);
        }

        let mut global = Vec::new();
        let cf_global = self.cf_handle(CF_GLOBAL_POINTS)?;
        for item in self.db.iterator_cf(&cf_global, IteratorMode::Start) {
            let (_, value) = item?;
            global.push(bincode::deserialize::<Point>(&value)?);
        }
        if global.is_empty() {
            return Err(Error::Storage("Global point log is empty".to_string()));
        }

        let mut users: HashMap<AccountId, Vec<Point>> = HashMap::new();
        let cf_users = self.cf_handle(CF_USER_POINTS)?;
        for item in self.db.iterator_cf(&cf_users, IteratorMode::Start) {
            let (key, value) = item?;
            let account = Self::account_from_key(&key[..ADDRESS_LEN.min(key.len())])?;
            users
                .entry(account)
                .or_default()
                .push(bincode::deserialize(&value)?);
        }

        let mut slope_changes = BTreeMap::new();
        let cf_slopes = self.cf_handle(CF_SLOPE_CHANGES)?;
        for item in self.db.iterator_cf(&cf_slopes, IteratorMode::Start) {
            let (key, value) = item?;
            let time_bytes: [u8; 8] = key
                .as_ref()
                .try_into()
                .map_err(|_| Error::Storage("Malformed slope change key".to_string()))?;
            slope_changes.insert(u64::from_be_bytes(time_bytes), bincode::deserialize(&value)?);
        }

        tracing::info!(
            locks = locks.len(),
            global_points = global.len(),
            accounts = users.len(),
            "Loaded escrow state"
        );

        Ok(Some(EscrowState {
            locks,
            checkpoints: CheckpointStore::from_parts(global, users, slope_changes),
            supply: totals.supply,
            penalty_accumulated: totals.penalty_accumulated,
            governance,
        }))
    }

    /// Get lock by account
    pub fn get_lock(&self, account: &AccountId) -> Result<Option<Lock>> {
        let cf = self.cf_handle(CF_LOCKS)?;
        match self.db.get_cf(&cf, account.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Get global point by epoch
    pub fn get_global_point(&self, epoch: u64) -> Result<Option<Point>> {
        let cf = self.cf_handle(CF_GLOBAL_POINTS)?;
        match self.db.get_cf(&cf, epoch.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    // Key helpers

    fn user_point_key(account: &AccountId, epoch: u64) -> Vec<u8> {
        let mut key = account.as_bytes().to_vec();
        key.extend_from_slice(&epoch.to_be_bytes());
        key
    }

    fn account_from_key(key: &[u8]) -> Result<AccountId> {
        let bytes: [u8; ADDRESS_LEN] = key
            .try_into()
            .map_err(|_| Error::Storage(format!("Malformed account key ({} bytes)", key.len())))?;
        Ok(AccountId::new(bytes))
    }

    // Statistics

    /// Get storage statistics
    pub fn get_stats(&self) -> Result<StorageStats> {
        Ok(StorageStats {
            locks: self.approximate_count(&self.cf_handle(CF_LOCKS)?)?,
            global_points: self.approximate_count(&self.cf_handle(CF_GLOBAL_POINTS)?)?,
            user_points: self.approximate_count(&self.cf_handle(CF_USER_POINTS)?)?,
        })
    }

    fn approximate_count(&self, cf: &impl AsColumnFamilyRef) -> Result<u64> {
        let prop = self
            .db
            .property_int_value_cf(cf, "rocksdb.estimate-num-keys")?
            .unwrap_or(0);
        Ok(prop)
    }
}

/// Storage statistics (approximate key counts)
#[derive(Debug, Clone)]
pub struct StorageStats {
    /// Lock records
    pub locks: u64,
    /// Global points
    pub global_points: u64,
    /// Account points across all accounts
    pub user_points: u64,
}
