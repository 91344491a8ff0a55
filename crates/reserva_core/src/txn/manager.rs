//! Transaction manager.

use crate::config::TxnConfig;
use crate::error::{CoreError, CoreResult};
use crate::lock::{LockManager, LockMode};
use crate::txn::participant::Participant;
use crate::txn::state::Transaction;
use crate::types::{CustomerId, ItemKey, Xid};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

/// Which part of the system a lock acquisition touched.
enum Touch<'a> {
    /// A remote resource node, identified by registered name.
    Node(&'a str),
    /// The coordinator-local customer store.
    Customers,
}

/// The outcome fanned out to participants at termination.
#[derive(Clone, Copy)]
enum Outcome {
    Commit,
    Abort,
}

struct TmInner {
    config: TxnConfig,
    locks: LockManager,
    next_xid: AtomicU64,
    active: Mutex<HashMap<Xid, Transaction>>,
    nodes: RwLock<HashMap<String, Arc<dyn Participant>>>,
    customer_store: RwLock<Option<Arc<dyn Participant>>>,
    sweeper_started: AtomicBool,
}

/// Owns transaction identifiers and their lifecycle.
///
/// The manager provides:
/// - Fresh, never-reused transaction ids via `start()`
/// - Validation of every xid-bearing operation
/// - Two-phase locking through the embedded [`LockManager`], recording which
///   resource nodes each transaction touches
/// - A background sweep that force-aborts transactions whose time-to-live
///   elapsed — the only cleanup for clients that vanish without finishing
/// - Best-effort commit/abort fan-out to registered participants
///
/// Cloning the manager is cheap; clones share state. The sweep thread holds
/// only a weak reference and exits once every handle is dropped.
///
/// Fan-out is not a two-phase commit: there is no prepare round and no commit
/// record, so an unreachable participant simply misses the outcome. This
/// weakness is inherited from the design and left intact.
#[derive(Clone)]
pub struct TransactionManager {
    inner: Arc<TmInner>,
}

impl TransactionManager {
    /// Creates a transaction manager with the given configuration.
    #[must_use]
    pub fn new(config: TxnConfig) -> Self {
        let locks = LockManager::new(config.lock_wait);
        Self {
            inner: Arc::new(TmInner {
                config,
                locks,
                next_xid: AtomicU64::new(1),
                active: Mutex::new(HashMap::new()),
                nodes: RwLock::new(HashMap::new()),
                customer_store: RwLock::new(None),
                sweeper_started: AtomicBool::new(false),
            }),
        }
    }

    /// Registers a resource node participant under its logical name.
    pub fn register_node(&self, name: impl Into<String>, participant: Arc<dyn Participant>) {
        self.inner.nodes.write().insert(name.into(), participant);
    }

    /// Registers the coordinator's customer store as the customers participant.
    pub fn register_customer_store(&self, participant: Arc<dyn Participant>) {
        *self.inner.customer_store.write() = Some(participant);
    }

    /// Returns the embedded lock manager.
    #[must_use]
    pub fn locks(&self) -> &LockManager {
        &self.inner.locks
    }

    /// Starts a new transaction and returns its id.
    ///
    /// The first call also starts the background expiry sweep.
    pub fn start(&self) -> Xid {
        let xid = Xid::new(self.inner.next_xid.fetch_add(1, Ordering::SeqCst));
        let txn = Transaction::new(xid, self.inner.config.time_to_live);
        self.inner.active.lock().insert(xid, txn);

        self.ensure_sweeper();

        tracing::info!(%xid, "transaction started");
        xid
    }

    /// Fails with [`CoreError::InvalidTransaction`] unless `xid` is active.
    pub fn validate(&self, xid: Xid) -> CoreResult<()> {
        if self.inner.active.lock().contains_key(&xid) {
            Ok(())
        } else {
            Err(CoreError::invalid_transaction(xid))
        }
    }

    /// Returns true while `xid` is active.
    #[must_use]
    pub fn is_active(&self, xid: Xid) -> bool {
        self.inner.active.lock().contains_key(&xid)
    }

    /// Returns the number of active transactions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// Pushes a transaction's deadline out to a full time-to-live from now.
    ///
    /// Unknown or finished transactions are ignored with a warning, matching
    /// the tolerant behavior of the other bookkeeping paths.
    pub fn reset_time_to_live(&self, xid: Xid) {
        let mut active = self.inner.active.lock();
        match active.get_mut(&xid) {
            Some(txn) => txn.reset_time_to_live(self.inner.config.time_to_live),
            None => tracing::warn!(%xid, "time-to-live reset for inactive transaction"),
        }
    }

    /// Acquires a read lock on an item owned by `node` for `xid`.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] if `xid` is not active;
    /// [`CoreError::TransactionAborted`] if the lock wait deadlocked — the
    /// transaction has been aborted by the time this returns.
    pub fn read_lock_item(&self, xid: Xid, key: &ItemKey, node: &str) -> CoreResult<()> {
        self.lock_with(xid, key, LockMode::Read, Touch::Node(node))
    }

    /// Acquires a write lock on an item owned by `node` for `xid`.
    ///
    /// # Errors
    ///
    /// Same contract as [`TransactionManager::read_lock_item`].
    pub fn write_lock_item(&self, xid: Xid, key: &ItemKey, node: &str) -> CoreResult<()> {
        self.lock_with(xid, key, LockMode::Write, Touch::Node(node))
    }

    /// Acquires a read lock on a customer record for `xid`.
    ///
    /// # Errors
    ///
    /// Same contract as [`TransactionManager::read_lock_item`].
    pub fn read_lock_customer(&self, xid: Xid, customer: CustomerId) -> CoreResult<()> {
        self.lock_with(xid, &ItemKey::customer(customer), LockMode::Read, Touch::Customers)
    }

    /// Acquires a write lock on a customer record for `xid`.
    ///
    /// # Errors
    ///
    /// Same contract as [`TransactionManager::read_lock_item`].
    pub fn write_lock_customer(&self, xid: Xid, customer: CustomerId) -> CoreResult<()> {
        self.lock_with(xid, &ItemKey::customer(customer), LockMode::Write, Touch::Customers)
    }

    /// Commits a transaction: notify participants, release locks, retire the id.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] if `xid` is not active (including a
    /// second commit of the same id).
    pub fn commit(&self, xid: Xid) -> CoreResult<()> {
        let txn = self
            .inner
            .active
            .lock()
            .remove(&xid)
            .ok_or_else(|| CoreError::invalid_transaction(xid))?;

        tracing::info!(%xid, participants = txn.participants().len(), "committing transaction");
        self.notify(&txn, Outcome::Commit);
        self.inner.locks.release_all(xid);
        Ok(())
    }

    /// Aborts a transaction: notify participants (restoring their undo logs),
    /// release locks, retire the id.
    ///
    /// # Errors
    ///
    /// [`CoreError::InvalidTransaction`] if `xid` is not active.
    pub fn abort(&self, xid: Xid) -> CoreResult<()> {
        let txn = self
            .inner
            .active
            .lock()
            .remove(&xid)
            .ok_or_else(|| CoreError::invalid_transaction(xid))?;

        tracing::info!(%xid, participants = txn.participants().len(), "aborting transaction");
        self.notify(&txn, Outcome::Abort);
        self.inner.locks.release_all(xid);
        Ok(())
    }

    fn lock_with(&self, xid: Xid, key: &ItemKey, mode: LockMode, touch: Touch<'_>) -> CoreResult<()> {
        self.validate(xid)?;

        match self.inner.locks.acquire(xid, key, mode) {
            Ok(()) => {
                let mut active = self.inner.active.lock();
                let Some(txn) = active.get_mut(&xid) else {
                    // The sweep aborted the transaction while we waited; the
                    // grant above arrived too late and must not survive.
                    drop(active);
                    self.inner.locks.release_all(xid);
                    return Err(CoreError::invalid_transaction(xid));
                };
                match touch {
                    Touch::Node(node) => txn.add_participant(node),
                    Touch::Customers => txn.touch_customers(),
                }
                txn.reset_time_to_live(self.inner.config.time_to_live);
                Ok(())
            }
            Err(CoreError::Deadlock { .. }) => {
                tracing::warn!(%xid, %key, "deadlock on lock acquisition, aborting transaction");
                if let Err(err) = self.abort(xid) {
                    tracing::debug!(%xid, %err, "transaction already gone during deadlock abort");
                }
                Err(CoreError::transaction_aborted(xid))
            }
            Err(other) => Err(other),
        }
    }

    /// Forwards the outcome to the customer store (if touched) and to every
    /// participant node. Failures are logged and skipped, never retried.
    fn notify(&self, txn: &Transaction, outcome: Outcome) {
        let xid = txn.xid();

        if txn.touched_customers() {
            if let Some(customers) = self.inner.customer_store.read().clone() {
                Self::deliver(&*customers, xid, outcome);
            } else {
                tracing::warn!(%xid, "transaction touched customers but no customer store is registered");
            }
        }

        let nodes = self.inner.nodes.read();
        for name in txn.participants() {
            match nodes.get(name) {
                Some(node) => Self::deliver(&**node, xid, outcome),
                None => tracing::warn!(%xid, node = %name, "participant not registered, outcome dropped"),
            }
        }
    }

    fn deliver(participant: &dyn Participant, xid: Xid, outcome: Outcome) {
        let result = match outcome {
            Outcome::Commit => participant.commit(xid),
            Outcome::Abort => participant.abort(xid),
        };
        if let Err(err) = result {
            tracing::warn!(%xid, node = participant.participant_name(), %err,
                "participant notification failed, outcome dropped");
        }
    }

    /// Spawns the expiry sweep once.
    ///
    /// The sweep snapshots expired ids under the table lock, then aborts them
    /// outside it so participant fan-out never runs with the table held.
    fn ensure_sweeper(&self) {
        if self.inner.sweeper_started.swap(true, Ordering::SeqCst) {
            return;
        }

        let weak: Weak<TmInner> = Arc::downgrade(&self.inner);
        let interval = self.inner.config.sweep_interval;

        thread::spawn(move || loop {
            thread::sleep(interval);

            let Some(inner) = weak.upgrade() else {
                break;
            };
            let tm = TransactionManager { inner };

            let expired: Vec<Xid> = tm
                .inner
                .active
                .lock()
                .iter()
                .filter(|(_, txn)| txn.is_expired())
                .map(|(xid, _)| *xid)
                .collect();

            for xid in expired {
                tracing::warn!(%xid, "transaction ran out of time to live, forcing abort");
                if let Err(err) = tm.abort(xid) {
                    tracing::debug!(%xid, %err, "expired transaction finished before the sweep");
                }
            }
        });
    }
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("active_count", &self.active_count())
            .finish_non_exhaustive()
    }
}
