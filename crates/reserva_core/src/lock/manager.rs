//! Lock manager.

use crate::error::{CoreError, CoreResult};
use crate::types::{ItemKey, Xid};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Lock mode for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock; compatible with other read locks.
    Read,
    /// Exclusive lock; incompatible with every other holder.
    Write,
}

/// Lock state for a single key: which transactions hold it, in which mode.
///
/// Invariant: either any number of `Read` holders, or exactly one `Write`
/// holder, never both.
#[derive(Debug, Default)]
struct KeyLocks {
    holders: HashMap<Xid, LockMode>,
}

impl KeyLocks {
    /// Whether `xid` could be granted `mode` right now.
    ///
    /// A transaction never conflicts with itself: re-acquiring is a no-op and
    /// a lone reader may upgrade to write in place.
    fn can_grant(&self, xid: Xid, mode: LockMode) -> bool {
        match mode {
            LockMode::Read => self
                .holders
                .iter()
                .all(|(holder, held)| *holder == xid || *held == LockMode::Read),
            LockMode::Write => self.holders.keys().all(|holder| *holder == xid),
        }
    }

    /// Records the grant. Upgrades strengthen the held mode, never weaken it.
    fn grant(&mut self, xid: Xid, mode: LockMode) {
        let held = self.holders.entry(xid).or_insert(mode);
        if mode == LockMode::Write {
            *held = LockMode::Write;
        }
    }
}

/// Grants and releases record-level locks per transaction.
///
/// A request that is incompatible with the current holders blocks the calling
/// thread until the holders release, or until the wait bound elapses. The
/// wait bound is the deadlock policy: a wait that exceeds it fails with
/// [`CoreError::Deadlock`], and the transaction manager aborts the waiter.
/// There is no wait-for graph; bounded waiting alone guarantees forward
/// progress because `release_all` wakes every waiter.
pub struct LockManager {
    table: Mutex<HashMap<ItemKey, KeyLocks>>,
    released: Condvar,
    wait_bound: Duration,
}

impl LockManager {
    /// Creates a lock manager with the given wait bound.
    #[must_use]
    pub fn new(wait_bound: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            wait_bound,
        }
    }

    /// Acquires `mode` on `key` for `xid`, blocking while incompatible.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Deadlock`] if the wait bound elapses before the
    /// lock becomes available.
    pub fn acquire(&self, xid: Xid, key: &ItemKey, mode: LockMode) -> CoreResult<()> {
        let deadline = Instant::now() + self.wait_bound;
        let mut table = self.table.lock();

        loop {
            let state = table.entry(key.clone()).or_default();
            if state.can_grant(xid, mode) {
                state.grant(xid, mode);
                tracing::debug!(%xid, %key, ?mode, "lock granted");
                return Ok(());
            }

            if self.released.wait_until(&mut table, deadline).timed_out() {
                // Drop the entry if the failed request was the only reason it exists.
                if table.get(key).is_some_and(|s| s.holders.is_empty()) {
                    table.remove(key);
                }
                tracing::warn!(%xid, %key, ?mode, "lock wait timed out, treating as deadlock");
                return Err(CoreError::Deadlock {
                    xid,
                    key: key.clone(),
                });
            }
        }
    }

    /// Releases every lock held by `xid` and wakes all waiters.
    ///
    /// Idempotent: releasing for a transaction that holds nothing is a no-op.
    /// Returns the number of locks released.
    pub fn release_all(&self, xid: Xid) -> usize {
        let mut table = self.table.lock();
        let mut released = 0;

        table.retain(|_, state| {
            if state.holders.remove(&xid).is_some() {
                released += 1;
            }
            !state.holders.is_empty()
        });

        if released > 0 {
            tracing::debug!(%xid, released, "released all locks");
            self.released.notify_all();
        }
        released
    }

    /// Returns the mode `xid` currently holds on `key`, if any.
    #[must_use]
    pub fn mode_held(&self, xid: Xid, key: &ItemKey) -> Option<LockMode> {
        self.table
            .lock()
            .get(key)
            .and_then(|state| state.holders.get(&xid).copied())
    }

    /// Returns the number of transactions holding `key`.
    #[must_use]
    pub fn holder_count(&self, key: &ItemKey) -> usize {
        self.table.lock().get(key).map_or(0, |s| s.holders.len())
    }

    /// Returns the keys currently held by `xid`.
    #[must_use]
    pub fn held_keys(&self, xid: Xid) -> Vec<ItemKey> {
        self.table
            .lock()
            .iter()
            .filter(|(_, state)| state.holders.contains_key(&xid))
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("locked_keys", &self.table.lock().len())
            .field("wait_bound", &self.wait_bound)
            .finish()
    }
}
