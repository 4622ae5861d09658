//! # Lock Manager
//!
//! The bounded pool of lock cells and the deadlock watchdog.
//!
//! ## Cell Pool
//!
//! Cells are created lazily, one per record number on first request, and
//! cached so that every caller contending for a record synchronizes on the
//! same cell. The pool holds at most `capacity` cells; at capacity, a
//! request for a new record evicts some currently unoccupied cell. An
//! occupied cell is never evicted, so an active transaction can only end
//! through its owner, a session cleanup, or the watchdog. When every cached
//! cell is occupied the request fails fatally: that many concurrently held
//! row locks means the system is past its configured limit.
//!
//! ## Watchdog
//!
//! A dedicated thread wakes every expiry period and force-releases any cell
//! that has been occupied longer than the period. Expiry is a rollback: the
//! staged transaction is discarded, never committed, and every waiter is
//! woken. The original owner finds out the next time it touches the record
//! and gets a transaction error.
//!
//! The manager owns the watchdog thread and joins it on drop, so a dropped
//! engine leaves no background thread behind.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::error::{DbError, Result};
use crate::lock::cell::LockCell;
use crate::lock::CallerId;

#[derive(Debug)]
struct LockTable {
    cells: Mutex<HashMap<u32, Arc<LockCell>>>,
    capacity: usize,
    expiry: Duration,
    shutdown: Mutex<bool>,
    shutdown_signal: Condvar,
}

impl LockTable {
    /// One watchdog pass: release every cell held longer than the expiry.
    fn sweep(&self) {
        let snapshot: Vec<Arc<LockCell>> = self.cells.lock().values().cloned().collect();
        for cell in snapshot {
            if let Some(owner) = cell.expire_older_than(self.expiry) {
                warn!(
                    record = cell.record_no(),
                    %owner,
                    "lock held past expiry; rolling back and releasing"
                );
            }
        }
    }
}

/// Bounded pool of per-record lock cells with a deadlock watchdog.
#[derive(Debug)]
pub struct LockManager {
    table: Arc<LockTable>,
    watchdog: Option<JoinHandle<()>>,
}

impl LockManager {
    pub fn new(capacity: usize, expiry: Duration) -> LockManager {
        let table = Arc::new(LockTable {
            cells: Mutex::new(HashMap::new()),
            capacity,
            expiry,
            shutdown: Mutex::new(false),
            shutdown_signal: Condvar::new(),
        });

        let watchdog_table = Arc::clone(&table);
        let watchdog = thread::Builder::new()
            .name("slotdb-lock-watchdog".into())
            .spawn(move || loop {
                {
                    let mut stop = watchdog_table.shutdown.lock();
                    if !*stop {
                        let _ = watchdog_table
                            .shutdown_signal
                            .wait_for(&mut stop, watchdog_table.expiry);
                    }
                    if *stop {
                        break;
                    }
                }
                trace!("lock watchdog sweep");
                watchdog_table.sweep();
            })
            .expect("failed to spawn lock watchdog thread");

        LockManager {
            table,
            watchdog: Some(watchdog),
        }
    }

    /// The cell for `record_no`, creating it if needed. Creation at
    /// capacity evicts some unoccupied cell; with nothing evictable the
    /// pool is genuinely exhausted and the request fails.
    pub fn get_or_create(&self, record_no: u32) -> Result<Arc<LockCell>> {
        let mut cells = self.table.cells.lock();

        if let Some(cell) = cells.get(&record_no) {
            return Ok(Arc::clone(cell));
        }

        if cells.len() >= self.table.capacity {
            debug!(
                cached = cells.len(),
                capacity = self.table.capacity,
                "lock pool full, evicting an idle cell"
            );
            let idle = cells
                .iter()
                .find(|(_, cell)| cell.is_available())
                .map(|(record, _)| *record);
            match idle {
                Some(record) => {
                    cells.remove(&record);
                }
                None => {
                    return Err(DbError::Fatal(
                        "lock pool exhausted: every cached lock is occupied".into(),
                    ))
                }
            }
        }

        let cell = Arc::new(LockCell::new(record_no));
        cells.insert(record_no, Arc::clone(&cell));
        Ok(cell)
    }

    /// The cell for `record_no` if one is cached. Never creates.
    pub fn get(&self, record_no: u32) -> Option<Arc<LockCell>> {
        self.table.cells.lock().get(&record_no).cloned()
    }

    pub fn contains(&self, record_no: u32) -> bool {
        self.table.cells.lock().contains_key(&record_no)
    }

    /// Release every cell held by `caller`, discarding staged transactions
    /// and waking waiters. Called when a session ends.
    pub fn release_all_owned_by(&self, caller: CallerId) {
        let snapshot: Vec<Arc<LockCell>> = self.table.cells.lock().values().cloned().collect();
        for cell in snapshot {
            if cell.release_if_owned_by(caller) {
                debug!(record = cell.record_no(), %caller, "released lock on session end");
            }
        }
    }

    /// Number of cached cells (occupied or not).
    pub fn cell_count(&self) -> usize {
        self.table.cells.lock().len()
    }
}

impl Drop for LockManager {
    fn drop(&mut self) {
        *self.table.shutdown.lock() = true;
        self.table.shutdown_signal.notify_all();
        if let Some(watchdog) = self.watchdog.take() {
            let _ = watchdog.join();
        }
    }
}
