//! # slotdb - Embedded Fixed-Width Record Store
//!
//! slotdb is an embedded, record-oriented storage engine backed by a single
//! fixed-width binary data file. It provides row-level pessimistic locking,
//! per-record transactional staging with rollback, an in-memory primary-key
//! index, and a deadlock watchdog.
//!
//! ## Quick Start
//!
//! ```ignore
//! use slotdb::{CallerId, Column, Database, TableSchema};
//!
//! let schema = TableSchema::new(vec![
//!     Column::primary_key("name", 56),
//!     Column::primary_key("room", 8),
//!     Column::primary_key("location", 64),
//!     Column::new("size", 4),
//! ]);
//!
//! let db = Database::builder()
//!     .path("./rooms.db")
//!     .table_schema(schema)
//!     .open()?;
//!
//! let caller = CallerId::mint();
//! let rec = db.create(&row)?;
//! db.lock(caller, rec)?;
//! db.update(caller, rec, &updated)?;
//! db.unlock(caller, rec)?;            // commit happens here
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │        Public API (Database)             │
//! ├──────────────────────────────────────────┤
//! │ Lock manager │ Tx staging │ PK index     │
//! ├──────────────────────────────────────────┤
//! │   Logical schema / on-disk schema map    │
//! ├──────────────────────────────────────────┤
//! │  DataFile (mutex-serialized slot I/O)    │
//! └──────────────────────────────────────────┘
//! ```
//!
//! ## Write Path
//!
//! Mutations never touch the file directly. `lock` attaches a transaction
//! context to the record's lock cell; `update`/`delete` stage changes into
//! that context; `unlock` commits the staged change to the file and index,
//! then releases the lock. Any fault before the commit point discards the
//! staged data, so a record either changes completely or not at all.
//!
//! ## File Format
//!
//! The on-disk format is a legacy fixed-width layout preserved bit for bit:
//!
//! ```text
//! Offset  Size  Description
//! 0       4     Magic cookie (opaque)
//! 4       4     Record length R (big-endian u32)
//! 8       2     Field count F (big-endian u16)
//! 10      ...   F schema entries: name length (u16), name, field length (u16)
//! ...     1+R   Data slots: deletion flag byte, then R bytes of fields
//! ```
//!
//! A logical schema may declare more columns than the file stores; the
//! on-disk schema is then split in memory (never on disk) so that one wide
//! physical field backs several logical columns.
//!
//! ## Module Overview
//!
//! - [`codec`]: big-endian integer and bounded ASCII string (de)serialization
//! - [`schema`]: on-disk and logical schema definitions
//! - [`storage`]: slot images and the mutex-serialized data file
//! - [`index`]: composite primary key and the in-memory index
//! - [`lock`]: lock cells, transaction contexts, lock manager, watchdog
//! - [`db`]: the `Database` engine and its builder

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod index;
pub mod lock;
pub mod schema;
pub mod storage;

pub use db::{Database, DatabaseBuilder, DatabaseConfig};
pub use error::{DbError, Result};
pub use index::PrimaryKey;
pub use lock::CallerId;
pub use schema::table::{Column, TableSchema};
pub use schema::{FieldDef, FileSchema};
pub use storage::{DataFile, Record, RecordBlock};
