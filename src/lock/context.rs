//! # Transaction Context
//!
//! The scratch buffer attached to a held lock. `update` and `delete` write
//! here instead of the data file, so the file sees either the whole staged
//! change at commit time or nothing at all. Discarding a context is the
//! entire rollback mechanism.
//!
//! Delete wins: once a delete is staged, later update stagings are ignored.
//! The record is going away; there is nothing left to update.

/// Staged changes for one locked record.
#[derive(Debug, Clone)]
pub struct TransactionContext {
    record_no: u32,
    pending: Option<Vec<String>>,
    deleted: bool,
}

impl TransactionContext {
    pub fn new(record_no: u32) -> TransactionContext {
        TransactionContext {
            record_no,
            pending: None,
            deleted: false,
        }
    }

    /// The record this context was created for.
    pub fn record_no(&self) -> u32 {
        self.record_no
    }

    /// Stage new row values. Ignored when a delete is already staged.
    pub fn stage_update(&mut self, values: Vec<String>) {
        if !self.deleted {
            self.pending = Some(values);
        }
    }

    /// Stage deletion. Any pending row values are dropped.
    pub fn stage_delete(&mut self) {
        self.deleted = true;
        self.pending = None;
    }

    /// The staged row, if an update is pending and no delete superseded it.
    pub fn pending(&self) -> Option<&[String]> {
        self.pending.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}
