//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! - `clans` - Clan balance rows (key: clan_id)
//! - `ledger` - Append-only points ledger (key: clan_id || sequence)
//! - `ledger_slots` - Idempotency slots (key: clan_id || war_id -> sequence)
//! - `war_stats` - Derived war counters (key: clan_id)
//!
//! Writes go through [`LedgerTxn`], a pessimistic transaction: every row a
//! settlement touches is locked with `get_for_update`, so two settlements
//! sharing a clan serialize inside RocksDB and a slot can only be claimed
//! once. Reads that must not block writers go through [`LedgerSnapshot`].

use crate::{
    error::{Error, Result},
    types::{ClanId, ClanRecord, PointsLedgerEntry, WarId, WarStats},
    Config,
};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, MultiThreaded, Options,
    SnapshotWithThreadMode, Transaction, TransactionDB, TransactionDBOptions, TransactionOptions,
    WriteOptions,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Column family names
const CF_CLANS: &str = "clans";
const CF_LEDGER: &str = "ledger";
const CF_SLOTS: &str = "ledger_slots";
const CF_WAR_STATS: &str = "war_stats";

type Db = TransactionDB<MultiThreaded>;

/// Storage wrapper for RocksDB
pub struct Storage {
    db: Arc<Db>,
    path: PathBuf,
    lock_timeout_ms: i64,
    sync_writes: bool,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.path)
            .field("lock_timeout_ms", &self.lock_timeout_ms)
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

        let mut txn_db_opts = TransactionDBOptions::default();
        txn_db_opts.set_txn_lock_timeout(config.rocksdb.lock_timeout_ms);
        txn_db_opts.set_default_lock_timeout(config.rocksdb.lock_timeout_ms);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_CLANS, Self::cf_options_rows()),
            ColumnFamilyDescriptor::new(CF_LEDGER, Self::cf_options_ledger()),
            ColumnFamilyDescriptor::new(CF_SLOTS, Self::cf_options_slots()),
            ColumnFamilyDescriptor::new(CF_WAR_STATS, Self::cf_options_rows()),
        ];

        let db = Db::open_cf_descriptors(&db_opts, &txn_db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened clan ledger store");

        Ok(Self {
            db: Arc::new(db),
            path: path.clone(),
            lock_timeout_ms: config.rocksdb.lock_timeout_ms,
            sync_writes: config.rocksdb.sync_writes,
        })
    }

    // Column family options

    fn cf_options_rows() -> Options {
        let mut opts = Options::default();
        // Rows are read on every settlement, use LZ4 for speed
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        opts
    }

    fn cf_options_ledger() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_bottommost_compression_type(rocksdb::DBCompressionType::Zstd);
        opts
    }

    fn cf_options_slots() -> Options {
        let mut opts = Options::default();
        opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
        // Slot lookups are point reads, mostly misses
        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        opts.set_block_based_table_factory(&block_opts);
        opts
    }

    fn cf_handle<'a>(db: &'a Db, name: &str) -> Result<Arc<BoundColumnFamily<'a>>> {
        db.cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", name)))
    }

    /// Begin a read-write unit of work.
    ///
    /// Dropping the returned transaction without [`LedgerTxn::commit`]
    /// discards every write and releases every lock.
    pub fn transaction(&self) -> Result<LedgerTxn<'_>> {
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(self.sync_writes);

        let mut txn_opts = TransactionOptions::default();
        txn_opts.set_lock_timeout(self.lock_timeout_ms);
        txn_opts.set_deadlock_detect(true);

        Ok(LedgerTxn {
            txn: self.db.transaction_opt(&write_opts, &txn_opts),
            clans: Self::cf_handle(&self.db, CF_CLANS)?,
            ledger: Self::cf_handle(&self.db, CF_LEDGER)?,
            slots: Self::cf_handle(&self.db, CF_SLOTS)?,
            war_stats: Self::cf_handle(&self.db, CF_WAR_STATS)?,
        })
    }

    /// Consistent read view of every column family
    pub fn snapshot(&self) -> Result<LedgerSnapshot<'_>> {
        Ok(LedgerSnapshot {
            snapshot: self.db.snapshot(),
            clans: Self::cf_handle(&self.db, CF_CLANS)?,
            ledger: Self::cf_handle(&self.db, CF_LEDGER)?,
            war_stats: Self::cf_handle(&self.db, CF_WAR_STATS)?,
        })
    }

    // Clan registration (clan-management side)

    /// Register a clan if absent; an existing row is returned untouched
    pub fn register_clan(&self, record: ClanRecord) -> Result<ClanRecord> {
        let txn = self.transaction()?;

        if let Some(existing) = txn.lock_clan(record.clan_id)? {
            tracing::debug!(clan_id = %record.clan_id, "Clan already registered");
            return Ok(existing);
        }

        txn.put_clan(&record)?;
        txn.commit()?;

        tracing::info!(
            clan_id = %record.clan_id,
            initial_points = record.initial_points,
            level = record.level,
            "Clan registered"
        );

        Ok(record)
    }

    /// Change non-point attributes of a clan (member count, activity)
    pub fn update_clan_profile<F>(&self, clan_id: ClanId, update: F) -> Result<ClanRecord>
    where
        F: FnOnce(&mut ClanRecord),
    {
        let txn = self.transaction()?;
        let mut record = txn
            .lock_clan(clan_id)?
            .ok_or(Error::ClanNotFound(clan_id))?;

        let (points, level, seq) = (record.total_points, record.level, record.ledger_seq);
        update(&mut record);
        if record.total_points != points || record.level != level || record.ledger_seq != seq {
            return Err(Error::InvariantViolation(format!(
                "profile update of clan {} touched ledger-owned fields",
                clan_id
            )));
        }
        record.updated_at = chrono::Utc::now();

        txn.put_clan(&record)?;
        txn.commit()?;
        Ok(record)
    }

    // Point reads (latest committed state)

    /// Get clan record
    pub fn get_clan(&self, clan_id: ClanId) -> Result<Option<ClanRecord>> {
        self.snapshot()?.get_clan(clan_id)
    }

    /// Get war stats, if the clan has fought
    pub fn get_war_stats(&self, clan_id: ClanId) -> Result<Option<WarStats>> {
        self.snapshot()?.get_war_stats(clan_id)
    }

    /// Ledger entries of a clan, newest first
    pub fn clan_history(&self, clan_id: ClanId, limit: usize) -> Result<Vec<PointsLedgerEntry>> {
        self.snapshot()?.clan_entries_newest_first(clan_id, limit)
    }

    // Key helpers

    fn ledger_key(clan_id: ClanId, sequence: u64) -> [u8; 16] {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&clan_id.to_key());
        key[8..].copy_from_slice(&sequence.to_be_bytes());
        key
    }

    fn slot_key(clan_id: ClanId, war_id: &WarId) -> Vec<u8> {
        let mut key = clan_id.to_key().to_vec();
        key.extend_from_slice(war_id.as_str().as_bytes());
        key
    }

    fn decode_sequence(value: &[u8]) -> Result<u64> {
        let raw: [u8; 8] = value
            .try_into()
            .map_err(|_| Error::Storage("Malformed ledger slot".to_string()))?;
        Ok(u64::from_be_bytes(raw))
    }
}

/// Read-write transaction over the ledger column families
pub struct LedgerTxn<'db> {
    txn: Transaction<'db, Db>,
    clans: Arc<BoundColumnFamily<'db>>,
    ledger: Arc<BoundColumnFamily<'db>>,
    slots: Arc<BoundColumnFamily<'db>>,
    war_stats: Arc<BoundColumnFamily<'db>>,
}

impl fmt::Debug for LedgerTxn<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerTxn").finish_non_exhaustive()
    }
}

impl<'db> LedgerTxn<'db> {
    /// Lock the `(clan_id, war_id)` slot; returns the sequence of the entry
    /// already holding it.
    ///
    /// The lock is exclusive until commit or rollback, so a concurrent
    /// settlement of the same war blocks here and then sees this one's entry.
    pub fn lock_slot(&self, clan_id: ClanId, war_id: &WarId) -> Result<Option<u64>> {
        let key = Storage::slot_key(clan_id, war_id);
        self.txn
            .get_for_update_cf(&self.slots, key, true)?
            .map(|value| Storage::decode_sequence(&value))
            .transpose()
    }

    /// Lock and read a clan row
    pub fn lock_clan(&self, clan_id: ClanId) -> Result<Option<ClanRecord>> {
        self.txn
            .get_for_update_cf(&self.clans, clan_id.to_key(), true)?
            .map(|value| bincode::deserialize(&value).map_err(Error::from))
            .transpose()
    }

    /// Lock and read a stats row, starting a fresh one for first-timers
    pub fn lock_war_stats(&self, clan_id: ClanId) -> Result<WarStats> {
        match self
            .txn
            .get_for_update_cf(&self.war_stats, clan_id.to_key(), true)?
        {
            Some(value) => Ok(bincode::deserialize(&value)?),
            None => Ok(WarStats::new(clan_id)),
        }
    }

    /// Read a committed ledger entry
    pub fn get_entry(&self, clan_id: ClanId, sequence: u64) -> Result<Option<PointsLedgerEntry>> {
        self.txn
            .get_cf(&self.ledger, Storage::ledger_key(clan_id, sequence))?
            .map(|value| bincode::deserialize(&value).map_err(Error::from))
            .transpose()
    }

    /// Entry already holding a slot, if any
    pub fn find_slot_entry(
        &self,
        clan_id: ClanId,
        war_id: &WarId,
    ) -> Result<Option<PointsLedgerEntry>> {
        match self.lock_slot(clan_id, war_id)? {
            Some(sequence) => self.get_entry(clan_id, sequence)?.map(Some).ok_or_else(|| {
                Error::InvariantViolation(format!(
                    "slot ({}, {}) points at missing entry {}",
                    clan_id, war_id, sequence
                ))
            }),
            None => Ok(None),
        }
    }

    /// Write a clan row
    pub fn put_clan(&self, record: &ClanRecord) -> Result<()> {
        let value = bincode::serialize(record)?;
        self.txn.put_cf(&self.clans, record.clan_id.to_key(), value)?;
        Ok(())
    }

    /// Append a ledger entry and claim its slot
    pub fn append_entry(&self, entry: &PointsLedgerEntry) -> Result<()> {
        let value = bincode::serialize(entry)?;
        self.txn.put_cf(
            &self.ledger,
            Storage::ledger_key(entry.clan_id, entry.sequence),
            value,
        )?;
        self.txn.put_cf(
            &self.slots,
            Storage::slot_key(entry.clan_id, &entry.war_id),
            entry.sequence.to_be_bytes(),
        )?;

        tracing::debug!(
            clan_id = %entry.clan_id,
            war_id = %entry.war_id,
            sequence = entry.sequence,
            points_change = entry.points_change,
            "Ledger entry staged"
        );

        Ok(())
    }

    /// Write a stats row
    pub fn put_war_stats(&self, stats: &WarStats) -> Result<()> {
        let value = bincode::serialize(stats)?;
        self.txn.put_cf(&self.war_stats, stats.clan_id.to_key(), value)?;
        Ok(())
    }

    /// Atomic commit of everything staged
    pub fn commit(self) -> Result<()> {
        self.txn.commit()?;
        Ok(())
    }

    /// Discard everything staged and release locks
    pub fn rollback(self) -> Result<()> {
        self.txn.rollback()?;
        Ok(())
    }
}

/// Point-in-time read view; never blocks or is blocked by writers
pub struct LedgerSnapshot<'db> {
    snapshot: SnapshotWithThreadMode<'db, Db>,
    clans: Arc<BoundColumnFamily<'db>>,
    ledger: Arc<BoundColumnFamily<'db>>,
    war_stats: Arc<BoundColumnFamily<'db>>,
}

impl fmt::Debug for LedgerSnapshot<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerSnapshot").finish_non_exhaustive()
    }
}

impl<'db> LedgerSnapshot<'db> {
    /// Get clan record
    pub fn get_clan(&self, clan_id: ClanId) -> Result<Option<ClanRecord>> {
        self.snapshot
            .get_cf(&self.clans, clan_id.to_key())?
            .map(|value| bincode::deserialize(&value).map_err(Error::from))
            .transpose()
    }

    /// Get war stats
    pub fn get_war_stats(&self, clan_id: ClanId) -> Result<Option<WarStats>> {
        self.snapshot
            .get_cf(&self.war_stats, clan_id.to_key())?
            .map(|value| bincode::deserialize(&value).map_err(Error::from))
            .transpose()
    }

    /// All clan rows in id order
    pub fn all_clans(&self) -> Result<Vec<ClanRecord>> {
        let mut clans = Vec::new();
        for item in self.snapshot.iterator_cf(&self.clans, IteratorMode::Start) {
            let (_, value) = item?;
            clans.push(bincode::deserialize(&value)?);
        }
        Ok(clans)
    }

    /// Full history of a clan, oldest first
    pub fn clan_entries(&self, clan_id: ClanId) -> Result<Vec<PointsLedgerEntry>> {
        let prefix = clan_id.to_key();
        let start = Storage::ledger_key(clan_id, 0);
        let iter = self
            .snapshot
            .iterator_cf(&self.ledger, IteratorMode::From(&start, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }

    /// Most recent `limit` entries of a clan, newest first
    pub fn clan_entries_newest_first(
        &self,
        clan_id: ClanId,
        limit: usize,
    ) -> Result<Vec<PointsLedgerEntry>> {
        let prefix = clan_id.to_key();
        let end = Storage::ledger_key(clan_id, u64::MAX);
        let iter = self
            .snapshot
            .iterator_cf(&self.ledger, IteratorMode::From(&end, Direction::Reverse));

        let mut entries = Vec::new();
        for item in iter {
            if entries.len() >= limit {
                break;
            }
            let (key, value) = item?;
            if !key.starts_with(&prefix) {
                break;
            }
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }
}
