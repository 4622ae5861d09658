//! # Database Builder
//!
//! Fluent configuration for opening a [`Database`]. Every knob has a
//! documented default from [`crate::config`]; tests and embedders with
//! unusual deployments (many sessions, short-lived locks) override what
//! they need and leave the rest.
//!
//! | Option                | Default   | Description                           |
//! |-----------------------|-----------|---------------------------------------|
//! | charset               | US-ASCII  | string encoding of the data file      |
//! | max_cached_locks      | 1000      | lock cell pool capacity               |
//! | lock_expiry           | 60 s      | watchdog force-release age            |
//! | lock_recheck_interval | 10 s      | waiter re-check backstop              |
//! | find_block_size       | 1000      | records per buffered scan read        |

use std::path::PathBuf;
use std::time::Duration;

use crate::config;
use crate::db::Database;
use crate::error::{DbError, Result};
use crate::schema::table::TableSchema;

/// Runtime configuration of one database instance.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub charset: String,
    pub max_cached_locks: usize,
    pub lock_expiry: Duration,
    pub lock_recheck_interval: Duration,
    pub find_block_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> DatabaseConfig {
        DatabaseConfig {
            charset: config::CHARSET.to_string(),
            max_cached_locks: config::MAX_CACHED_LOCKS,
            lock_expiry: config::LOCK_EXPIRY,
            lock_recheck_interval: config::LOCK_RECHECK_INTERVAL,
            find_block_size: config::FIND_BLOCK_SIZE,
        }
    }
}

/// Builder for [`Database`].
#[derive(Debug, Default)]
pub struct DatabaseBuilder {
    path: Option<PathBuf>,
    table: Option<TableSchema>,
    config: DatabaseConfig,
}

impl DatabaseBuilder {
    pub fn new() -> DatabaseBuilder {
        DatabaseBuilder::default()
    }

    /// Path of the data file. Required.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Logical schema of the table the file stores. Required.
    pub fn table_schema(mut self, table: TableSchema) -> Self {
        self.table = Some(table);
        self
    }

    pub fn charset(mut self, name: impl Into<String>) -> Self {
        self.config.charset = name.into();
        self
    }

    pub fn max_cached_locks(mut self, capacity: usize) -> Self {
        self.config.max_cached_locks = capacity;
        self
    }

    pub fn lock_expiry(mut self, expiry: Duration) -> Self {
        self.config.lock_expiry = expiry;
        self
    }

    pub fn lock_recheck_interval(mut self, interval: Duration) -> Self {
        self.config.lock_recheck_interval = interval;
        self
    }

    pub fn find_block_size(mut self, records: usize) -> Self {
        self.config.find_block_size = records;
        self
    }

    pub fn open(self) -> Result<Database> {
        let path = self
            .path
            .ok_or_else(|| DbError::Fatal("database builder requires a data file path".into()))?;
        let table = self
            .table
            .ok_or_else(|| DbError::Fatal("database builder requires a table schema".into()))?;
        Database::open_with_config(path, table, self.config)
    }
}
