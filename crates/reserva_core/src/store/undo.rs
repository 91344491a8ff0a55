//! Per-transaction before-image logging.

use crate::types::Xid;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

/// A saved pre-transaction value of one key: the cloned value, or `None` when
/// the key did not exist when the transaction first touched it.
type BeforeImage<K, V> = (K, Option<V>);

/// Records before-images so a transaction's writes can be undone on abort.
///
/// Generic over the key and value types: resource nodes log reservable items,
/// the coordinator logs customer records.
///
/// Only the first image per `(xid, key)` pair is kept. Later writes to the
/// same key within the same transaction are no-ops here, so an abort restores
/// the value from before the transaction began touching the key, not some
/// intermediate state.
#[derive(Debug)]
pub struct UndoLog<K, V> {
    images: Mutex<HashMap<Xid, Vec<BeforeImage<K, V>>>>,
}

impl<K: Eq + Hash + Clone, V: Clone> UndoLog<K, V> {
    /// Creates an empty undo log.
    #[must_use]
    pub fn new() -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
        }
    }

    /// Records the current value of `key` before a write by `xid`.
    ///
    /// Must be called exactly before every mutation of `key`. The first call
    /// per `(xid, key)` snapshots `current`; subsequent calls are ignored.
    pub fn before_write(&self, xid: Xid, key: K, current: Option<&V>) {
        let mut images = self.images.lock();
        let list = images.entry(xid).or_default();

        if list.iter().any(|(logged, _)| *logged == key) {
            return;
        }

        tracing::debug!(%xid, "saving before-image");
        list.push((key, current.cloned()));
    }

    /// Discards every before-image recorded by `xid`.
    pub fn commit(&self, xid: Xid) {
        self.images.lock().remove(&xid);
    }

    /// Drains the before-images recorded by `xid`, for the caller to restore.
    #[must_use]
    pub fn take_images(&self, xid: Xid) -> Vec<BeforeImage<K, V>> {
        self.images.lock().remove(&xid).unwrap_or_default()
    }

    /// Returns the number of images currently recorded for `xid`.
    #[must_use]
    pub fn image_count(&self, xid: Xid) -> usize {
        self.images.lock().get(&xid).map_or(0, Vec::len)
    }
}

impl<K: Eq + Hash + Clone, V: Clone> Default for UndoLog<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
