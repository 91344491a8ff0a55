//! Mutex-guarded associative store of reservable items.

use crate::store::item::ReservableItem;
use crate::types::ItemKey;
use parking_lot::Mutex;
use std::collections::HashMap;

/// The in-memory item store of a resource node.
///
/// A single mutex linearizes every access. Reads hand out clones so callers
/// can never mutate stored state without going through [`ResourceStore::write`];
/// record-level isolation between transactions is the lock manager's job, not
/// this type's.
#[derive(Debug, Default)]
pub struct ResourceStore {
    data: Mutex<HashMap<ItemKey, ReservableItem>>,
}

impl ResourceStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a clone of the item at `key`, or `None` if absent.
    #[must_use]
    pub fn read(&self, key: &ItemKey) -> Option<ReservableItem> {
        self.data.lock().get(key).cloned()
    }

    /// Stores `value` at `key`, replacing any previous item.
    pub fn write(&self, key: ItemKey, value: ReservableItem) {
        self.data.lock().insert(key, value);
    }

    /// Removes the item at `key`.
    pub fn remove(&self, key: &ItemKey) {
        self.data.lock().remove(key);
    }

    /// Restores `key` to a prior state: a value, or absence.
    pub fn restore(&self, key: ItemKey, value: Option<ReservableItem>) {
        let mut data = self.data.lock();
        match value {
            Some(item) => {
                data.insert(key, item);
            }
            None => {
                data.remove(&key);
            }
        }
    }

    /// Returns the number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    /// Returns true if the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.lock().is_empty()
    }
}
