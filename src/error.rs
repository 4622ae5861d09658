//! Error types for the storage engine.
//!
//! Five failure kinds make up the public contract. `RecordNotFound`,
//! `DuplicateKey` and `Transaction` are ordinary, recoverable outcomes the
//! caller is expected to handle. `Format` means the data file violated a
//! structural invariant and the engine refuses to touch it. `Fatal` and
//! `Io` mean an operation died mid-flight; the engine itself stays usable,
//! but any staged change involved in the failure has been discarded and the
//! caller must re-read to observe actual state.

use std::io;
use thiserror::Error;

/// Result type for all engine operations.
pub type Result<T> = std::result::Result<T, DbError>;

/// Errors surfaced by the storage engine.
#[derive(Debug, Error)]
pub enum DbError {
    /// The target slot is deleted or past EOF, or a search matched nothing.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// A create collided with an existing primary key.
    #[error("duplicate primary key: {0}")]
    DuplicateKey(String),

    /// A staging or commit operation was issued without a valid held lock.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// The data file violated a structural invariant.
    #[error("invalid data file format: {0}")]
    Format(String),

    /// A non-recoverable engine fault outside the I/O layer.
    #[error("fatal: {0}")]
    Fatal(String),

    /// An underlying I/O failure mid-operation.
    #[error("i/o failure: {0}")]
    Io(#[from] io::Error),
}

impl DbError {
    pub(crate) fn record_missing(record: u32) -> Self {
        DbError::RecordNotFound(format!("record {record} is deleted or does not exist"))
    }

    pub(crate) fn not_locked(record: u32) -> Self {
        DbError::Transaction(format!("record {record} is not locked by the caller"))
    }
}
