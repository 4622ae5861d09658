//! # Configuration Constants
//!
//! This module centralizes the engine's tunable constants. Each value here is
//! the compile-time default; `DatabaseConfig` carries the runtime value and is
//! populated from these through `DatabaseBuilder`.
//!
//! ## Relationships
//!
//! ```text
//! LOCK_EXPIRY (60s)
//!       │
//!       └─> watchdog sweep period; a held lock survives at most one full
//!           sweep past its expiry, so worst-case hold time is ~2x this value
//!
//! LOCK_RECHECK_INTERVAL (10s)
//!       │
//!       └─> upper bound on how long a lock waiter sleeps between retries
//!           when a release notification is missed
//!
//! MAX_CACHED_LOCKS (1000)
//!       │
//!       └─> lock cells are recycled only when unoccupied, so this also
//!           bounds the number of concurrently held record locks
//! ```

use std::time::Duration;

/// Maximum number of lock cells cached by the lock manager. When the pool is
/// full, a request for a new cell evicts an unoccupied one; if every cell is
/// occupied the request fails fatally.
pub const MAX_CACHED_LOCKS: usize = 1000;

/// How long a lock may be held before the deadlock watchdog force-releases
/// it. Expiry is a rollback: staged changes are discarded, never committed.
pub const LOCK_EXPIRY: Duration = Duration::from_millis(60_000);

/// How long a lock waiter sleeps before re-checking cell availability. This
/// is a backstop against missed notifications, not a fairness mechanism.
pub const LOCK_RECHECK_INTERVAL: Duration = Duration::from_millis(10_000);

/// Number of records fetched per buffered read during a linear scan.
pub const FIND_BLOCK_SIZE: usize = 1000;

/// Canonical name of the only charset the legacy file format supports.
pub const CHARSET: &str = "US-ASCII";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        assert_eq!(MAX_CACHED_LOCKS, 1000);
        assert_eq!(LOCK_EXPIRY, Duration::from_secs(60));
        assert_eq!(LOCK_RECHECK_INTERVAL, Duration::from_secs(10));
        assert_eq!(FIND_BLOCK_SIZE, 1000);
        assert_eq!(CHARSET, "US-ASCII");
    }
}
