//! # Database Engine
//!
//! `Database` composes the data file, the primary-key index, the lock
//! manager and per-lock transaction staging into the eight-operation
//! engine: `read`, `create`, `update`, `delete`, `find`, `lock`, `unlock`
//! and `is_locked`.
//!
//! ## Transaction Protocol
//!
//! A record is changed in three steps, all attributed to one caller:
//!
//! ```text
//! lock(caller, n)          creates the transaction context
//! update / delete          stage into the context; the file is untouched
//! unlock(caller, n)        commit: apply staged change, refresh index,
//!                          release the lock (rollback on any fault)
//! ```
//!
//! `read` always returns the last committed state; staged changes are
//! invisible to every caller, the owner included, until unlock commits
//! them. Changing a record's primary key through this protocol is refused
//! at commit time: callers rename by delete + create.
//!
//! ## Search
//!
//! `find` matches non-null criteria positions as trimmed prefixes. When the
//! criteria pin every primary-key column the index answers directly; on an
//! index miss the fallback scan is restricted to the key columns and feeds
//! every match back into the index. Everything else is a block-buffered
//! linear scan in ascending record order.
//!
//! ## Caller Identity
//!
//! Operations that touch a transaction take an explicit [`CallerId`]. The
//! surrounding layer mints one per session and calls
//! [`Database::release_all`] when the session ends, rolling back whatever
//! the session still held.

pub mod builder;

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

pub use builder::{DatabaseBuilder, DatabaseConfig};

use crate::codec::Charset;
use crate::error::{DbError, Result};
use crate::index::{PrimaryKey, PrimaryKeyIndex};
use crate::lock::cell::LockCell;
use crate::lock::context::TransactionContext;
use crate::lock::manager::LockManager;
use crate::lock::CallerId;
use crate::schema::table::TableSchema;
use crate::schema::FieldDef;
use crate::storage::{DataFile, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    /// Non-null criteria must equal the field value after trimming.
    Exact,
    /// Non-null criteria must be a prefix of the trimmed field value.
    Prefix,
}

/// The record storage engine. One instance per data file, shared by every
/// session thread.
#[derive(Debug)]
pub struct Database {
    file: DataFile,
    table: TableSchema,
    index: PrimaryKeyIndex,
    locks: LockManager,
    create_monitor: Mutex<()>,
    config: DatabaseConfig,
}

impl Database {
    pub fn builder() -> DatabaseBuilder {
        DatabaseBuilder::new()
    }

    /// Open a data file with the default configuration.
    pub fn open<P: AsRef<Path>>(path: P, table: TableSchema) -> Result<Database> {
        Database::open_with_config(path, table, DatabaseConfig::default())
    }

    pub(crate) fn open_with_config<P: AsRef<Path>>(
        path: P,
        table: TableSchema,
        config: DatabaseConfig,
    ) -> Result<Database> {
        let charset = Charset::from_name(&config.charset)?;
        let mut file = DataFile::open(path, charset)?;
        align_file_schema(&mut file, &table)?;

        let db = Database {
            file,
            index: PrimaryKeyIndex::new(),
            locks: LockManager::new(config.max_cached_locks, config.lock_expiry),
            create_monitor: Mutex::new(()),
            table,
            config,
        };
        db.rebuild_index()?;
        Ok(db)
    }

    /// The logical schema this engine was opened with.
    pub fn schema(&self) -> &TableSchema {
        &self.table
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Fetch the persisted values of record `record_no`, in column order.
    /// Staged, uncommitted changes are never visible here.
    pub fn read(&self, record_no: u32) -> Result<Vec<String>> {
        let record = self.retrieve(record_no)?;
        record.values(self.file.schema(), self.file.charset())
    }

    /// Insert a new row into the first free slot and index it. Fails with
    /// `DuplicateKey` when a live record already carries the same primary
    /// key.
    pub fn create(&self, values: &[String]) -> Result<u32> {
        let _monitor = self.create_monitor.lock();

        let key = PrimaryKey::from_values(&self.table, values);
        let duplicate = self.index.lookup(&key).is_some() || {
            let key_criteria = self.table.pk_criteria(values);
            !self.scan(&key_criteria, MatchMode::Exact, |_, _| {})?.is_empty()
        };
        if duplicate {
            return Err(DbError::DuplicateKey(key.to_string()));
        }

        let mut record = self.file.empty_record();
        record.set_values(self.file.schema(), values, self.file.charset())?;
        let record_no = self.file.append(&record)?;

        // index the values as stored, which may be truncated to field width
        let stored = record.values(self.file.schema(), self.file.charset())?;
        self.index
            .insert(PrimaryKey::from_values(&self.table, &stored), record_no);

        // a reused slot may carry a lock left over from its previous life
        if let Some(cell) = self.locks.get(record_no) {
            cell.release();
        }

        debug!(record = record_no, "created record");
        Ok(record_no)
    }

    /// Acquire the row lock for `record_no`, blocking while another caller
    /// holds it. On success a fresh transaction context is attached for
    /// this caller's staged changes.
    pub fn lock(&self, caller: CallerId, record_no: u32) -> Result<()> {
        // fail fast on records that cannot be locked at all
        self.retrieve(record_no)?;

        let cell = self.locks.get_or_create(record_no)?;
        cell.acquire(
            caller,
            TransactionContext::new(record_no),
            self.config.lock_recheck_interval,
        );
        trace!(record = record_no, %caller, "lock acquired");
        Ok(())
    }

    /// Whether any caller currently holds the row lock for `record_no`.
    pub fn is_locked(&self, record_no: u32) -> bool {
        match self.locks.get(record_no) {
            Some(cell) => !cell.is_available(),
            None => false,
        }
    }

    /// Stage deletion of `record_no` into the caller's transaction. The
    /// file is not touched until unlock.
    pub fn delete(&self, caller: CallerId, record_no: u32) -> Result<()> {
        let cell = self.transactional_cell(record_no)?;
        cell.stage_delete(caller)
    }

    /// Stage new values for `record_no` into the caller's transaction. The
    /// file is not touched until unlock. Ignored if the transaction has
    /// already staged a delete.
    pub fn update(&self, caller: CallerId, record_no: u32, values: &[String]) -> Result<()> {
        let cell = self.transactional_cell(record_no)?;
        cell.stage_update(caller, values.to_vec())
    }

    /// Commit the caller's staged change for `record_no` and release the
    /// lock. With nothing staged this is a plain release. The lock is
    /// released on every path; when the commit fails the staged change is
    /// lost and the persisted state is unchanged.
    pub fn unlock(&self, caller: CallerId, record_no: u32) -> Result<()> {
        let cell = self.transactional_cell(record_no)?;
        let tx = cell.transaction_snapshot(caller)?;

        let outcome = self.commit(record_no, &tx);

        // conditional so an expired-and-reacquired lock is never clobbered
        cell.release_if_owned_by(caller);
        trace!(record = record_no, %caller, "lock released");
        outcome
    }

    fn commit(&self, record_no: u32, tx: &TransactionContext) -> Result<()> {
        if tx.is_deleted() {
            let pre_image = self.retrieve(record_no)?;
            self.file.delete(record_no)?;
            let values = pre_image.values(self.file.schema(), self.file.charset())?;
            self.index.remove(&PrimaryKey::from_values(&self.table, &values));
            debug!(record = record_no, "deleted record");
        } else if let Some(values) = tx.pending() {
            let on_disk = self.retrieve(record_no)?;
            let disk_values = on_disk.values(self.file.schema(), self.file.charset())?;
            let disk_key = PrimaryKey::from_values(&self.table, &disk_values);
            let new_key = PrimaryKey::from_values(&self.table, values);
            if new_key != disk_key {
                return Err(DbError::Fatal(format!(
                    "update would change the primary key of record {record_no} \
                     from {disk_key} to {new_key}; delete and re-create instead"
                )));
            }

            let mut record = on_disk;
            record.set_values(self.file.schema(), values, self.file.charset())?;
            self.file.write(record_no, &record)?;
            debug!(record = record_no, "updated record");
        }
        Ok(())
    }

    /// Search for records matching `criteria`: a null position matches any
    /// value, a non-null position matches fields starting with it (both
    /// sides trimmed). Criteria shorter than the column count leave the
    /// remaining columns unconstrained. Matching nothing is an error, not
    /// an empty result.
    pub fn find(&self, criteria: &[Option<String>]) -> Result<Vec<u32>> {
        let matches = match PrimaryKey::from_criteria(&self.table, criteria) {
            Some(key) => {
                if let Some(record_no) = self.index.lookup(&key) {
                    return Ok(vec![record_no]);
                }
                // index miss: scan the key columns and remember what we see
                let key_criteria = key.to_criteria(&self.table);
                self.scan(&key_criteria, MatchMode::Prefix, |record_no, record| {
                    if let Ok(values) = record.values(self.file.schema(), self.file.charset()) {
                        self.index
                            .insert(PrimaryKey::from_values(&self.table, &values), record_no);
                    }
                })?
            }
            None => self.scan(criteria, MatchMode::Prefix, |_, _| {})?,
        };

        if matches.is_empty() {
            return Err(DbError::RecordNotFound(format!(
                "no records match the criteria {criteria:?}"
            )));
        }
        Ok(matches)
    }

    /// Roll back and release every lock held by `caller`. Invoked by the
    /// surrounding layer when the session ends.
    pub fn release_all(&self, caller: CallerId) {
        self.locks.release_all_owned_by(caller);
    }

    fn retrieve(&self, record_no: u32) -> Result<Record> {
        self.file
            .record(record_no)?
            .ok_or_else(|| DbError::record_missing(record_no))
    }

    fn transactional_cell(&self, record_no: u32) -> Result<Arc<LockCell>> {
        self.locks
            .get(record_no)
            .ok_or_else(|| DbError::not_locked(record_no))
    }

    /// Linear scan over every live record in ascending order, `block_size`
    /// slots per buffered read. `on_match` runs for each hit.
    fn scan<F>(&self, criteria: &[Option<String>], mode: MatchMode, mut on_match: F) -> Result<Vec<u32>>
    where
        F: FnMut(u32, &Record),
    {
        let mut matches = Vec::new();
        let mut record_no: u32 = 0;

        while let Some(block) = self
            .file
            .read_block(record_no, self.config.find_block_size)?
        {
            for record in block.iter() {
                if !record.is_deleted() && self.matches_criteria(&record, criteria, mode) {
                    matches.push(record_no);
                    on_match(record_no, &record);
                }
                record_no += 1;
            }
        }

        Ok(matches)
    }

    fn matches_criteria(
        &self,
        record: &Record,
        criteria: &[Option<String>],
        mode: MatchMode,
    ) -> bool {
        for (field_no, criterion) in criteria.iter().enumerate() {
            let Some(wanted) = criterion else {
                continue;
            };
            // a criteria position beyond the schema matches nothing
            let Ok(value) = record.value(self.file.schema(), field_no, self.file.charset())
            else {
                return false;
            };
            let wanted = wanted.trim();
            let hit = match mode {
                MatchMode::Exact => value == wanted,
                MatchMode::Prefix => value.starts_with(wanted),
            };
            if !hit {
                return false;
            }
        }
        true
    }

    /// Populate the index from a full scan of the data section.
    fn rebuild_index(&self) -> Result<()> {
        let everything = vec![None; self.table.column_count()];
        let matched = self.scan(&everything, MatchMode::Prefix, |record_no, record| {
            if let Ok(values) = record.values(self.file.schema(), self.file.charset()) {
                self.index
                    .insert(PrimaryKey::from_values(&self.table, &values), record_no);
            }
        })?;

        if matched.is_empty() {
            warn!("data file holds no live records; primary key index starts empty");
        }
        Ok(())
    }
}

/// Align the physical schema to the logical one, splitting wide physical
/// fields into runs of contiguous logical columns where the lengths allow
/// it. A file whose schema already matches column for column aligns
/// without change, so the mapping is idempotent across reopens.
fn align_file_schema(file: &mut DataFile, table: &TableSchema) -> Result<()> {
    let mut field_no = 0usize;
    let mut column_no = 0usize;

    while column_no < table.column_count() {
        let column = table.column(column_no).expect("column index in range");
        let field = file
            .schema()
            .field(field_no)
            .map_err(|_| {
                DbError::Format(format!(
                    "data file has no field backing column '{}'",
                    column.name()
                ))
            })?
            .clone();

        if field.name() == column.name() && field.length() == column.length() {
            field_no += 1;
            column_no += 1;
            continue;
        }

        if field.name() == column.name() && field.length() > column.length() {
            // collect the run of columns covering this physical field
            let mut run = vec![FieldDef::new(column.name(), column.length())];
            let mut covered = column.length();
            let mut next = column_no + 1;
            while covered < field.length() && next < table.column_count() {
                let extra = table.column(next).expect("column index in range");
                run.push(FieldDef::new(extra.name(), extra.length()));
                covered += extra.length();
                next += 1;
            }
            if covered != field.length() {
                return Err(DbError::Format(format!(
                    "columns starting at '{}' cover {covered} bytes but field '{}' holds {}",
                    column.name(),
                    field.name(),
                    field.length()
                )));
            }

            let split_into = run.len();
            if !file.split_field(field_no, run) {
                return Err(DbError::Format(format!(
                    "failed to split field '{}'",
                    field.name()
                )));
            }
            debug!(
                field = field.name(),
                into = split_into,
                "split physical field to match the table schema"
            );
            field_no += split_into;
            column_no = next;
            continue;
        }

        return Err(DbError::Format(format!(
            "field '{}' ({} bytes) does not match column '{}' ({} bytes)",
            field.name(),
            field.length(),
            column.name(),
            column.length()
        )));
    }

    if field_no != file.schema().field_count() {
        return Err(DbError::Format(format!(
            "data file declares {} fields but the table schema maps only {field_no}",
            file.schema().field_count()
        )));
    }
    Ok(())
}
