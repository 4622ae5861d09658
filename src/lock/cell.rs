//! # Lock Cell
//!
//! One record's lock: a two-state cell (unoccupied ↔ occupied) carrying the
//! owner, the occupation start time and the owner's transaction context,
//! plus the condition variable contending callers wait on.
//!
//! ## Waiting Protocol
//!
//! `acquire` loops: take the state mutex, occupy if free, otherwise wait on
//! the condvar with a bounded timeout and retry. The timeout is a backstop
//! against missed notifications, not a fairness device; when several
//! waiters are eligible after a release they are all woken and race.
//!
//! ## Ownership Checks
//!
//! Every staging and snapshot operation re-verifies the owner under the
//! state mutex. A watchdog expiry between an engine-level check and the
//! cell operation therefore surfaces as a transaction error, never as a
//! write attributed to the wrong session.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{DbError, Result};
use crate::lock::context::TransactionContext;
use crate::lock::CallerId;

#[derive(Debug, Default)]
struct CellState {
    owner: Option<CallerId>,
    held_since: Option<Instant>,
    tx: Option<TransactionContext>,
}

/// The lock state for one record number.
#[derive(Debug)]
pub struct LockCell {
    record_no: u32,
    state: Mutex<CellState>,
    released: Condvar,
}

impl LockCell {
    pub fn new(record_no: u32) -> LockCell {
        LockCell {
            record_no,
            state: Mutex::new(CellState::default()),
            released: Condvar::new(),
        }
    }

    pub fn record_no(&self) -> u32 {
        self.record_no
    }

    /// Block until the cell is free, then occupy it for `owner` with a
    /// fresh transaction context. Waits are re-checked every `recheck` in
    /// case a wake-up was missed; spurious wakes simply retry.
    pub fn acquire(&self, owner: CallerId, tx: TransactionContext, recheck: Duration) {
        let mut state = self.state.lock();
        while state.owner.is_some() {
            // timing out is indistinguishable from a spurious wake: retry
            let _ = self.released.wait_for(&mut state, recheck);
        }
        state.owner = Some(owner);
        state.held_since = Some(Instant::now());
        state.tx = Some(tx);
    }

    /// Occupy the cell immediately. Returns false when it is already held.
    pub fn try_occupy(&self, owner: CallerId, tx: TransactionContext) -> bool {
        let mut state = self.state.lock();
        if state.owner.is_some() {
            return false;
        }
        state.owner = Some(owner);
        state.held_since = Some(Instant::now());
        state.tx = Some(tx);
        true
    }

    /// Reset the cell to unoccupied, discarding any staged transaction, and
    /// wake every waiter.
    pub fn release(&self) {
        let mut state = self.state.lock();
        Self::clear(&mut state);
        self.released.notify_all();
    }

    /// Release only if `owner` still holds the cell. Returns whether a
    /// release happened.
    pub fn release_if_owned_by(&self, owner: CallerId) -> bool {
        let mut state = self.state.lock();
        if state.owner != Some(owner) {
            return false;
        }
        Self::clear(&mut state);
        self.released.notify_all();
        true
    }

    /// Release the cell when it has been occupied for at least `max_age`.
    /// Returns the expired owner when a release happened.
    pub fn expire_older_than(&self, max_age: Duration) -> Option<CallerId> {
        let mut state = self.state.lock();
        let owner = state.owner?;
        let held_since = state.held_since?;
        if held_since.elapsed() < max_age {
            return None;
        }
        Self::clear(&mut state);
        self.released.notify_all();
        Some(owner)
    }

    fn clear(state: &mut CellState) {
        state.owner = None;
        state.held_since = None;
        state.tx = None;
    }

    pub fn is_available(&self) -> bool {
        self.state.lock().owner.is_none()
    }

    pub fn owner(&self) -> Option<CallerId> {
        self.state.lock().owner
    }

    /// Stage new row values into the held transaction.
    pub fn stage_update(&self, caller: CallerId, values: Vec<String>) -> Result<()> {
        let mut state = self.state.lock();
        self.verify_owner(&state, caller)?;
        state
            .tx
            .as_mut()
            .expect("occupied cell carries a transaction")
            .stage_update(values);
        Ok(())
    }

    /// Stage deletion into the held transaction.
    pub fn stage_delete(&self, caller: CallerId) -> Result<()> {
        let mut state = self.state.lock();
        self.verify_owner(&state, caller)?;
        state
            .tx
            .as_mut()
            .expect("occupied cell carries a transaction")
            .stage_delete();
        Ok(())
    }

    /// Copy of the held transaction, for the commit path.
    pub fn transaction_snapshot(&self, caller: CallerId) -> Result<TransactionContext> {
        let state = self.state.lock();
        self.verify_owner(&state, caller)?;
        Ok(state
            .tx
            .clone()
            .expect("occupied cell carries a transaction"))
    }

    fn verify_owner(&self, state: &CellState, caller: CallerId) -> Result<()> {
        match state.owner {
            None => Err(DbError::not_locked(self.record_no)),
            Some(owner) if owner != caller => Err(DbError::Transaction(format!(
                "record {} is locked by {owner}, not by {caller}",
                self.record_no
            ))),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn tx(record_no: u32) -> TransactionContext {
        TransactionContext::new(record_no)
    }

    #[test]
    fn test_occupy_and_release() {
        let cell = LockCell::new(5);
        let owner = CallerId::mint();

        assert!(cell.is_available());
        assert!(cell.try_occupy(owner, tx(5)));
        assert!(!cell.is_available());
        assert_eq!(cell.owner(), Some(owner));
        assert!(!cell.try_occupy(CallerId::mint(), tx(5)));

        cell.release();
        assert!(cell.is_available());
        assert_eq!(cell.owner(), None);
    }

    #[test]
    fn test_release_if_owned_by_checks_identity() {
        let cell = LockCell::new(5);
        let owner = CallerId::mint();
        cell.try_occupy(owner, tx(5));

        assert!(!cell.release_if_owned_by(CallerId::mint()));
        assert!(!cell.is_available());
        assert!(cell.release_if_owned_by(owner));
        assert!(cell.is_available());
    }

    #[test]
    fn test_staging_requires_ownership() {
        let cell = LockCell::new(5);
        let owner = CallerId::mint();
        let stranger = CallerId::mint();

        assert!(cell.stage_delete(owner).is_err());

        cell.try_occupy(owner, tx(5));
        assert!(cell.stage_update(stranger, vec!["x".into()]).is_err());
        assert!(cell.stage_update(owner, vec!["x".into()]).is_ok());

        let snapshot = cell.transaction_snapshot(owner).unwrap();
        assert_eq!(snapshot.pending(), Some(vec!["x".to_string()].as_slice()));
        assert!(cell.transaction_snapshot(stranger).is_err());
    }

    #[test]
    fn test_expire_older_than() {
        let cell = LockCell::new(5);
        let owner = CallerId::mint();
        cell.try_occupy(owner, tx(5));

        assert_eq!(cell.expire_older_than(Duration::from_secs(60)), None);
        thread::sleep(Duration::from_millis(30));
        assert_eq!(cell.expire_older_than(Duration::from_millis(10)), Some(owner));
        assert!(cell.is_available());
    }

    #[test]
    fn test_acquire_blocks_until_release() {
        let cell = Arc::new(LockCell::new(5));
        let first = CallerId::mint();
        let second = CallerId::mint();
        cell.try_occupy(first, tx(5));

        let contender = {
            let cell = Arc::clone(&cell);
            thread::spawn(move || {
                cell.acquire(second, tx(5), Duration::from_millis(20));
                cell.owner()
            })
        };

        thread::sleep(Duration::from_millis(60));
        assert_eq!(cell.owner(), Some(first));

        cell.release();
        assert_eq!(contender.join().unwrap(), Some(second));
    }
}
