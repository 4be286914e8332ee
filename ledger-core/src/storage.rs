//! Storage layer
//!
//! [`LedgerStorage`] is the persistence seam. [`RocksStorage`] is the durable
//! backend; [`MemoryStorage`] keeps everything in process.
//!
//! # Column Families (RocksDB)
//!
//! - `balance` - The single balance row (key: `balance`)
//! - `audit` - Append-only audit records (key: big-endian record id)
//! - `meta` - Ledger metadata (key: `initial_budget`)

use crate::{
    error::{Error, Result},
    types::{AuditRecord, Balance},
    Config,
};
use parking_lot::RwLock;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, DBCompactionStyle, IteratorMode, Options, WriteBatch,
    WriteOptions, DB,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Column family names
const CF_BALANCE: &str = "balance";
const CF_AUDIT: &str = "audit";
const CF_META: &str = "meta";

/// Fixed keys
const KEY_BALANCE: &[u8] = b"balance";
const KEY_INITIAL_BUDGET: &[u8] = b"initial_budget";

/// Iteration order over audit records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOrder {
    /// Oldest first (replay order)
    Ascending,
    /// Newest first
    Descending,
}

/// Persistence backend for the ledger
///
/// `commit` is the only mutation after initialization and must be atomic:
/// the balance row and the audit record land together or not at all.
pub trait LedgerStorage: Send + Sync {
    /// Current balance, `None` before initialization
    fn load_balance(&self) -> Result<Option<Balance>>;

    /// Budget the ledger was created with
    fn initial_budget(&self) -> Result<Option<Decimal>>;

    /// Write the first balance row and remember it as the initial budget
    fn initialize(&self, balance: &Balance) -> Result<()>;

    /// Highest committed record id
    fn last_record_id(&self) -> Result<Option<u64>>;

    /// Atomically replace the balance and append the record
    fn commit(&self, balance: &Balance, record: &AuditRecord) -> Result<()>;

    /// Look up one record
    fn get_record(&self, id: u64) -> Result<Option<AuditRecord>>;

    /// Visit records in id order until the visitor breaks
    fn scan_records(
        &self,
        order: ScanOrder,
        visit: &mut dyn FnMut(AuditRecord) -> ControlFlow<()>,
    ) -> Result<()>;
}

/// RocksDB-backed storage
pub struct RocksStorage {
    db: Arc<DB>,
    sync_writes: bool,
}

impl std::fmt::Debug for RocksStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksStorage")
            .field("path", &self.db.path())
            .field("sync_writes", &self.sync_writes)
            .finish()
    }
}

impl RocksStorage {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        // Tuning from config
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        // Append-mostly workload
        db_opts.set_compaction_style(DBCompactionStyle::Universal);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_BALANCE, Self::cf_options_balance()),
            ColumnFamilyDescriptor::new(CF_AUDIT, Self::cf_options_audit()),
            ColumnFamilyDescriptor::new(CF_META, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, sync_writes = config.sync_writes, "Opened RocksDB ledger");

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.sync_writes,
        })
    }

    // Column family options

    fn cf_options_balance() -> Options {
        let mut opts = Options::default();
        // Single hot row, read on every request
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_audit() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    // Helper: get column family handle

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    fn write_options(&self) -> WriteOptions {
        let mut opts = WriteOptions::default();
        opts.set_sync(self.sync_writes);
        opts
    }

    fn decode_id(key: &[u8]) -> Result<u64> {
        let bytes: [u8; 8] = key
            .try_into()
            .map_err(|_| Error::Storage(format!("Malformed audit key of {} bytes", key.len())))?;
        Ok(u64::from_be_bytes(bytes))
    }
}

impl LedgerStorage for RocksStorage {
    fn load_balance(&self) -> Result<Option<Balance>> {
        let cf = self.cf_handle(CF_BALANCE)?;
        match self.db.get_cf(cf, KEY_BALANCE)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn initial_budget(&self) -> Result<Option<Decimal>> {
        let cf = self.cf_handle(CF_META)?;
        match self.db.get_cf(cf, KEY_INITIAL_BUDGET)? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn initialize(&self, balance: &Balance) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(self.cf_handle(CF_BALANCE)?, KEY_BALANCE, bincode::serialize(balance)?);
        batch.put_cf(
            self.cf_handle(CF_META)?,
            KEY_INITIAL_BUDGET,
            bincode::serialize(&balance.remaining_budget)?,
        );
        self.db.write_opt(batch, &self.write_options())?;

        tracing::info!(initial_budget = %balance.remaining_budget, "Ledger initialized");
        Ok(())
    }

    fn last_record_id(&self) -> Result<Option<u64>> {
        let cf = self.cf_handle(CF_AUDIT)?;
        match self.db.iterator_cf(cf, IteratorMode::End).next() {
            Some(item) => {
                let (key, _) = item?;
                Ok(Some(Self::decode_id(&key)?))
            }
            None => Ok(None),
        }
    }

    fn commit(&self, balance: &Balance, record: &AuditRecord) -> Result<()> {
        let mut batch = WriteBatch::default();

        // 1. Balance row
        let cf_balance = self.cf_handle(CF_BALANCE)?;
        batch.put_cf(cf_balance, KEY_BALANCE, bincode::serialize(balance)?);

        // 2. Audit record
        let cf_audit = self.cf_handle(CF_AUDIT)?;
        batch.put_cf(cf_audit, record.id.to_be_bytes(), bincode::serialize(record)?);

        // Atomic commit
        self.db.write_opt(batch, &self.write_options())?;

        tracing::debug!(
            audit_id = record.id,
            status = %record.status,
            balance = %balance.remaining_budget,
            "Balance and audit record committed"
        );

        Ok(())
    }

    fn get_record(&self, id: u64) -> Result<Option<AuditRecord>> {
        let cf = self.cf_handle(CF_AUDIT)?;
        match self.db.get_cf(cf, id.to_be_bytes())? {
            Some(value) => Ok(Some(bincode::deserialize(&value)?)),
            None => Ok(None),
        }
    }

    fn scan_records(
        &self,
        order: ScanOrder,
        visit: &mut dyn FnMut(AuditRecord) -> ControlFlow<()>,
    ) -> Result<()> {
        let cf = self.cf_handle(CF_AUDIT)?;
        let mode = match order {
            ScanOrder::Ascending => IteratorMode::Start,
            ScanOrder::Descending => IteratorMode::End,
        };

        for item in self.db.iterator_cf(cf, mode) {
            let (_, value) = item?;
            let record: AuditRecord = bincode::deserialize(&value)?;
            if visit(record).is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    balance: Option<Balance>,
    initial_budget: Option<Decimal>,
    records: BTreeMap<u64, AuditRecord>,
}

/// In-process storage
///
/// Commits are atomic under a single write lock. A commit failure can be
/// injected to exercise rollback paths.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<MemoryState>,
    fail_commits: AtomicBool,
}

impl MemoryStorage {
    /// Create empty storage
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail until cleared
    pub fn inject_commit_failure(&self, enabled: bool) {
        self.fail_commits.store(enabled, Ordering::SeqCst);
    }

    /// Number of stored records
    pub fn record_count(&self) -> usize {
        self.state.read().records.len()
    }

    /// Overwrite a stored record, bypassing the ledger
    #[cfg(test)]
    pub(crate) fn put_raw_record(&self, record: AuditRecord) {
        self.state.write().records.insert(record.id, record);
    }

    /// Delete a stored record, bypassing the ledger
    #[cfg(test)]
    pub(crate) fn delete_raw_record(&self, id: u64) {
        self.state.write().records.remove(&id);
    }
}

impl LedgerStorage for MemoryStorage {
    fn load_balance(&self) -> Result<Option<Balance>> {
        Ok(self.state.read().balance.clone())
    }

    fn initial_budget(&self) -> Result<Option<Decimal>> {
        Ok(self.state.read().initial_budget)
    }

    fn initialize(&self, balance: &Balance) -> Result<()> {
        let mut state = self.state.write();
        state.balance = Some(balance.clone());
        state.initial_budget = Some(balance.remaining_budget);
        Ok(())
    }

    fn last_record_id(&self) -> Result<Option<u64>> {
        Ok(self.state.read().records.keys().next_back().copied())
    }

    fn commit(&self, balance: &Balance, record: &AuditRecord) -> Result<()> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(Error::Storage("injected commit failure".to_string()));
        }

        let mut state = self.state.write();
        if state.records.contains_key(&record.id) {
            return Err(Error::InvariantViolation(format!(
                "audit record {} already exists",
                record.id
            )));
        }
        state.records.insert(record.id, record.clone());
        state.balance = Some(balance.clone());
        Ok(())
    }

    fn get_record(&self, id: u64) -> Result<Option<AuditRecord>> {
        Ok(self.state.read().records.get(&id).cloned())
    }

    fn scan_records(
        &self,
        order: ScanOrder,
        visit: &mut dyn FnMut(AuditRecord) -> ControlFlow<()>,
    ) -> Result<()> {
        // Snapshot so the visitor never runs under the lock
        let records: Vec<AuditRecord> = {
            let state = self.state.read();
            match order {
                ScanOrder::Ascending => state.records.values().cloned().collect(),
                ScanOrder::Descending => state.records.values().rev().cloned().collect(),
            }
        };

        for record in records {
            if visit(record).is_break() {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuditStatus, ExecutionIntent, Purpose, RequestType};
    use crate::Config;
    use chrono::{FixedOffset, Utc};
    use tempfile::TempDir;
    use uuid::Uuid;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = Config {
            data_dir: temp_dir.path().to_path_buf(),
            sync_writes: false,
            ..Config::default()
        };
        (config, temp_dir)
    }

    fn balance(amount: Decimal) -> Balance {
        Balance {
            remaining_budget: amount,
            last_updated_at: Utc::now().with_timezone(&FixedOffset::east_opt(0).unwrap()),
        }
    }

    fn record(id: u64, balance_after: Decimal) -> AuditRecord {
        AuditRecord {
            id,
            execution_id: Uuid::new_v4(),
            timestamp: Utc::now().with_timezone(&FixedOffset::east_opt(9 * 3600).unwrap()),
            request_type: RequestType::ExternalCall,
            requester_id: "alice".to_string(),
            budget_owner_id: "alice".to_string(),
            intent: Some(ExecutionIntent::new(Purpose::Debug, "storage round trip")),
            target: Some("https://upstream.test/v1".to_string()),
            input: "in".to_string(),
            input_digest: "ab".to_string(),
            output: "out".to_string(),
            cost: Decimal::ONE,
            balance_after,
            status: AuditStatus::Success,
            risk: None,
            integrity_hash: "00".to_string(),
        }
    }

    fn exercise(storage: &dyn LedgerStorage) {
        assert!(storage.load_balance().unwrap().is_none());
        assert!(storage.last_record_id().unwrap().is_none());

        storage.initialize(&balance(Decimal::from(10))).unwrap();
        assert_eq!(storage.initial_budget().unwrap(), Some(Decimal::from(10)));

        for id in 1..=3u64 {
            let after = Decimal::from(10 - id as i64);
            storage.commit(&balance(after), &record(id, after)).unwrap();
        }

        assert_eq!(storage.last_record_id().unwrap(), Some(3));
        assert_eq!(
            storage.load_balance().unwrap().unwrap().remaining_budget,
            Decimal::from(7)
        );
        let second = storage.get_record(2).unwrap().unwrap();
        assert_eq!(second.balance_after, Decimal::from(8));
        assert_eq!(second.intent.map(|i| i.purpose), Some(Purpose::Debug));
        assert_eq!(second.target.as_deref(), Some("https://upstream.test/v1"));
        assert!(storage.get_record(9).unwrap().is_none());

        let mut ascending = Vec::new();
        storage
            .scan_records(ScanOrder::Ascending, &mut |r| {
                ascending.push(r.id);
                ControlFlow::Continue(())
            })
            .unwrap();
        assert_eq!(ascending, vec![1, 2, 3]);

        let mut newest = Vec::new();
        storage
            .scan_records(ScanOrder::Descending, &mut |r| {
                newest.push(r.id);
                if newest.len() == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .unwrap();
        assert_eq!(newest, vec![3, 2]);
    }

    #[test]
    fn test_rocks_storage() {
        let (config, _temp) = test_config();
        let storage = RocksStorage::open(&config).unwrap();
        exercise(&storage);
    }

    #[test]
    fn test_memory_storage() {
        exercise(&MemoryStorage::new());
    }

    #[test]
    fn test_rocks_storage_reopen() {
        let (config, _temp) = test_config();
        {
            let storage = RocksStorage::open(&config).unwrap();
            storage.initialize(&balance(Decimal::from(5))).unwrap();
            storage
                .commit(&balance(Decimal::from(4)), &record(1, Decimal::from(4)))
                .unwrap();
        }

        let storage = RocksStorage::open(&config).unwrap();
        assert_eq!(storage.last_record_id().unwrap(), Some(1));
        assert_eq!(
            storage.load_balance().unwrap().unwrap().remaining_budget,
            Decimal::from(4)
        );
    }

    #[test]
    fn test_injected_failure_leaves_state_untouched() {
        let storage = MemoryStorage::new();
        storage.initialize(&balance(Decimal::from(10))).unwrap();
        storage.inject_commit_failure(true);

        let result = storage.commit(&balance(Decimal::from(9)), &record(1, Decimal::from(9)));
        assert!(result.is_err());
        assert_eq!(storage.record_count(), 0);
        assert_eq!(
            storage.load_balance().unwrap().unwrap().remaining_budget,
            Decimal::from(10)
        );
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let storage = MemoryStorage::new();
        storage.initialize(&balance(Decimal::from(10))).unwrap();
        storage.commit(&balance(Decimal::from(9)), &record(1, Decimal::from(9))).unwrap();

        assert!(storage
            .commit(&balance(Decimal::from(8)), &record(1, Decimal::from(8)))
            .is_err());
        assert_eq!(
            storage.load_balance().unwrap().unwrap().remaining_budget,
            Decimal::from(9)
        );
    }
}
