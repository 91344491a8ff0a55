//! Resource node: item operations over a store with undo logging.

use crate::error::CoreResult;
use crate::store::item::ReservableItem;
use crate::store::resource_store::ResourceStore;
use crate::store::undo::UndoLog;
use crate::txn::Participant;
use crate::types::{CustomerId, ItemKey, Xid};
use std::collections::HashMap;

/// A resource-holding node: owns the reservable items it was configured to
/// hold and nothing else.
///
/// Every mutating operation snapshots a before-image into the undo log before
/// touching the store, so [`ResourceNode::abort`] can roll the transaction's
/// writes back. Record-level isolation between concurrent transactions is
/// enforced upstream by the lock manager; this type only guarantees that
/// individual store accesses are linearized.
#[derive(Debug)]
pub struct ResourceNode {
    name: String,
    store: ResourceStore,
    undo: UndoLog<ItemKey, ReservableItem>,
}

impl ResourceNode {
    /// Creates an empty node with the given logical name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            store: ResourceStore::new(),
            undo: UndoLog::new(),
        }
    }

    /// Returns the node's logical name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a reference to the underlying store.
    #[must_use]
    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Creates an item or tops up an existing one.
    ///
    /// A non-positive `price` on an existing item keeps its current price.
    pub fn add_item(&self, xid: Xid, key: ItemKey, count: u32, price: i64) -> bool {
        let current = self.store.read(&key);
        self.undo.before_write(xid, key.clone(), current.as_ref());

        match current {
            None => {
                tracing::info!(node = %self.name, %xid, %key, count, price, "created item");
                self.store
                    .write(key.clone(), ReservableItem::new(key, count, price));
            }
            Some(mut item) => {
                item.add_stock(count, price);
                tracing::info!(node = %self.name, %xid, %key, count = item.count, "topped up item");
                self.store.write(key, item);
            }
        }
        true
    }

    /// Deletes an item. Refused when the item is absent or has outstanding
    /// reservations.
    pub fn delete_item(&self, xid: Xid, key: &ItemKey) -> bool {
        let current = self.store.read(key);
        self.undo.before_write(xid, key.clone(), current.as_ref());

        match current {
            None => {
                tracing::warn!(node = %self.name, %xid, %key, "delete failed, item doesn't exist");
                false
            }
            Some(item) if item.reserved > 0 => {
                tracing::info!(node = %self.name, %xid, %key, "delete refused, item has reservations");
                false
            }
            Some(_) => {
                self.store.remove(key);
                tracing::info!(node = %self.name, %xid, %key, "item deleted");
                true
            }
        }
    }

    /// Returns the available count of an item; 0 when absent.
    #[must_use]
    pub fn query_count(&self, _xid: Xid, key: &ItemKey) -> u32 {
        self.store.read(key).map_or(0, |item| item.count)
    }

    /// Returns the unit price of an item, or `None` when absent.
    #[must_use]
    pub fn query_price(&self, _xid: Xid, key: &ItemKey) -> Option<i64> {
        self.store.read(key).map(|item| item.price)
    }

    /// Reserves one unit of an item for a customer.
    ///
    /// Returns the unit price, or `None` when the item is absent or sold out.
    /// Recording the reservation against the customer is the caller's job.
    pub fn reserve(&self, xid: Xid, customer: CustomerId, key: &ItemKey) -> Option<i64> {
        let current = self.store.read(key);
        self.undo.before_write(xid, key.clone(), current.as_ref());

        let Some(mut item) = current else {
            tracing::warn!(node = %self.name, %xid, %customer, %key, "reserve failed, item doesn't exist");
            return None;
        };

        match item.reserve_one() {
            Some(price) => {
                self.store.write(key.clone(), item);
                tracing::info!(node = %self.name, %xid, %customer, %key, price, "reserved");
                Some(price)
            }
            None => {
                tracing::warn!(node = %self.name, %xid, %customer, %key, "reserve failed, sold out");
                None
            }
        }
    }

    /// Checks that every flight in the list has a seat for every occurrence.
    ///
    /// A flight requested `n` times needs `n` available seats; an absent
    /// flight fails the check. The check is read-only.
    #[must_use]
    pub fn check_flight_list(&self, xid: Xid, flights: &[u32]) -> bool {
        let mut wanted: HashMap<u32, u32> = HashMap::new();
        for number in flights {
            *wanted.entry(*number).or_insert(0) += 1;
        }

        let available = wanted.iter().all(|(number, needed)| {
            self.query_count(xid, &ItemKey::flight(*number)) >= *needed
        });

        tracing::info!(node = %self.name, %xid, ?flights, available, "flight list check");
        available
    }

    /// Reserves every flight in the list for a customer, in order.
    ///
    /// Returns the per-flight prices aligned with the input, or `None` on any
    /// failure — in which case the reservations already made by this call are
    /// rolled back, so a failed batch leaves no side effects.
    pub fn reserve_flight_list(
        &self,
        xid: Xid,
        customer: CustomerId,
        flights: &[u32],
    ) -> Option<Vec<i64>> {
        let mut prices = Vec::with_capacity(flights.len());

        for (index, number) in flights.iter().enumerate() {
            let key = ItemKey::flight(*number);
            match self.reserve(xid, customer, &key) {
                Some(price) => prices.push(price),
                None => {
                    let mut reserved_so_far: HashMap<ItemKey, u32> = HashMap::new();
                    for earlier in &flights[..index] {
                        *reserved_so_far.entry(ItemKey::flight(*earlier)).or_insert(0) += 1;
                    }
                    self.cancel_reservations(xid, &reserved_so_far);
                    tracing::warn!(node = %self.name, %xid, %customer, flight = number, "flight list reservation failed, batch rolled back");
                    return None;
                }
            }
        }

        Some(prices)
    }

    /// Returns reserved units to availability for each listed key.
    ///
    /// Keys this node does not hold are skipped: the coordinator fans a
    /// customer's full reservation map out to every node and each node cancels
    /// only its own items.
    pub fn cancel_reservations(&self, xid: Xid, quantities: &HashMap<ItemKey, u32>) -> bool {
        for (key, quantity) in quantities {
            let Some(mut item) = self.store.read(key) else {
                continue;
            };
            self.undo.before_write(xid, key.clone(), Some(&item));
            item.cancel(*quantity);
            tracing::info!(node = %self.name, %xid, %key, quantity, "cancelled reservations");
            self.store.write(key.clone(), item);
        }
        true
    }

    /// Discards the transaction's before-images; its writes stand.
    pub fn commit(&self, xid: Xid) {
        tracing::info!(node = %self.name, %xid, "committing");
        self.undo.commit(xid);
    }

    /// Restores every before-image recorded by the transaction.
    pub fn abort(&self, xid: Xid) {
        let images = self.undo.take_images(xid);
        let count = images.len();
        for (key, image) in images {
            self.store.restore(key, image);
        }
        tracing::info!(node = %self.name, %xid, count, "aborted, before-images restored");
    }
}

impl Participant for ResourceNode {
    fn participant_name(&self) -> &str {
        &self.name
    }

    fn commit(&self, xid: Xid) -> CoreResult<()> {
        ResourceNode::commit(self, xid);
        Ok(())
    }

    fn abort(&self, xid: Xid) -> CoreResult<()> {
        ResourceNode::abort(self, xid);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> ResourceNode {
        ResourceNode::new("flights")
    }

    fn xid() -> Xid {
        Xid::new(1)
    }

    fn customer() -> CustomerId {
        CustomerId::new(7)
    }

    #[test]
    fn add_then_query() {
        let node = node();
        let key = ItemKey::flight(100);

        assert!(node.add_item(xid(), key.clone(), 5, 200));
        assert_eq!(node.query_count(xid(), &key), 5);
        assert_eq!(node.query_price(xid(), &key), Some(200));
    }

    #[test]
    fn query_absent_item() {
        let node = node();
        let key = ItemKey::flight(404);

        assert_eq!(node.query_count(xid(), &key), 0);
        assert_eq!(node.query_price(xid(), &key), None);
    }

    #[test]
    fn top_up_keeps_price_unless_positive() {
        let node = node();
        let key = ItemKey::flight(100);

        node.add_item(xid(), key.clone(), 5, 200);
        node.add_item(xid(), key.clone(), 3, 0);
        assert_eq!(node.query_count(xid(), &key), 8);
        assert_eq!(node.query_price(xid(), &key), Some(200));

        node.add_item(xid(), key.clone(), 0, 250);
        assert_eq!(node.query_price(xid(), &key), Some(250));
    }

    #[test]
    fn reserve_updates_accounting() {
        let node = node();
        let key = ItemKey::flight(100);
        node.add_item(xid(), key.clone(), 5, 200);

        assert_eq!(node.reserve(xid(), customer(), &key), Some(200));
        assert_eq!(node.query_count(xid(), &key), 4);
        assert_eq!(node.store().read(&key).unwrap().reserved, 1);
    }

    #[test]
    fn reserve_fails_on_absent_or_sold_out() {
        let node = node();
        let key = ItemKey::car("NYC");

        assert_eq!(node.reserve(xid(), customer(), &key), None);

        node.add_item(xid(), key.clone(), 1, 40);
        assert_eq!(node.reserve(xid(), customer(), &key), Some(40));
        assert_eq!(node.reserve(xid(), customer(), &key), None);
    }

    #[test]
    fn delete_refused_while_reserved() {
        let node = node();
        let key = ItemKey::flight(100);
        node.add_item(xid(), key.clone(), 5, 200);
        node.reserve(xid(), customer(), &key);

        assert!(!node.delete_item(xid(), &key));
        assert_eq!(node.query_count(xid(), &key), 4);
    }

    #[test]
    fn delete_absent_item_fails() {
        let node = node();
        assert!(!node.delete_item(xid(), &ItemKey::flight(404)));
    }

    #[test]
    fn delete_unreserved_item() {
        let node = node();
        let key = ItemKey::flight(100);
        node.add_item(xid(), key.clone(), 5, 200);

        assert!(node.delete_item(xid(), &key));
        assert_eq!(node.query_count(xid(), &key), 0);
    }

    #[test]
    fn abort_restores_pre_transaction_state() {
        let node = node();
        let key = ItemKey::flight(100);

        // Committed baseline.
        node.add_item(Xid::new(1), key.clone(), 5, 200);
        node.commit(Xid::new(1));

        // A second transaction mutates the item twice, then aborts.
        let x2 = Xid::new(2);
        node.reserve(x2, customer(), &key);
        node.add_item(x2, key.clone(), 10, 999);
        node.abort(x2);

        let item = node.store().read(&key).unwrap();
        assert_eq!(item.count, 5);
        assert_eq!(item.reserved, 0);
        assert_eq!(item.price, 200);
    }

    #[test]
    fn abort_restores_absence() {
        let node = node();
        let key = ItemKey::flight(100);

        node.add_item(xid(), key.clone(), 5, 200);
        node.abort(xid());

        assert!(node.store().read(&key).is_none());
    }

    #[test]
    fn commit_makes_writes_stand() {
        let node = node();
        let key = ItemKey::flight(100);

        node.add_item(xid(), key.clone(), 5, 200);
        node.commit(xid());
        // A later abort of the same xid finds no images to restore.
        node.abort(xid());

        assert_eq!(node.query_count(xid(), &key), 5);
    }

    #[test]
    fn flight_list_check_counts_duplicates() {
        let node = node();
        node.add_item(xid(), ItemKey::flight(100), 2, 200);
        node.add_item(xid(), ItemKey::flight(200), 1, 300);

        assert!(node.check_flight_list(xid(), &[100, 200]));
        assert!(node.check_flight_list(xid(), &[100, 100]));
        // Flight 200 has one seat, two requested.
        assert!(!node.check_flight_list(xid(), &[100, 200, 200]));
        // Absent flight fails.
        assert!(!node.check_flight_list(xid(), &[100, 300]));
    }

    #[test]
    fn reserve_flight_list_returns_prices() {
        let node = node();
        node.add_item(xid(), ItemKey::flight(100), 2, 200);
        node.add_item(xid(), ItemKey::flight(200), 1, 300);

        let prices = node.reserve_flight_list(xid(), customer(), &[100, 200]);
        assert_eq!(prices, Some(vec![200, 300]));
        assert_eq!(node.query_count(xid(), &ItemKey::flight(100)), 1);
        assert_eq!(node.query_count(xid(), &ItemKey::flight(200)), 0);
    }

    #[test]
    fn failed_flight_list_leaves_no_side_effects() {
        let node = node();
        node.add_item(xid(), ItemKey::flight(100), 2, 200);
        node.add_item(xid(), ItemKey::flight(200), 1, 300);

        // Second occurrence of flight 200 fails; flight 100 and the first
        // 200-seat must be returned.
        let prices = node.reserve_flight_list(xid(), customer(), &[100, 200, 200]);
        assert_eq!(prices, None);
        assert_eq!(node.query_count(xid(), &ItemKey::flight(100)), 2);
        assert_eq!(node.query_count(xid(), &ItemKey::flight(200)), 1);
        assert_eq!(node.store().read(&ItemKey::flight(200)).unwrap().reserved, 0);
    }

    #[test]
    fn cancel_skips_absent_keys() {
        let node = node();
        let key = ItemKey::flight(100);
        node.add_item(xid(), key.clone(), 5, 200);
        node.reserve(xid(), customer(), &key);

        let mut map = HashMap::new();
        map.insert(key.clone(), 1);
        map.insert(ItemKey::car("NYC"), 1); // not held by this node

        assert!(node.cancel_reservations(xid(), &map));
        assert_eq!(node.query_count(xid(), &key), 5);
        assert!(node.store().read(&ItemKey::car("NYC")).is_none());
    }

    #[test]
    fn reservation_accounting_is_conserved() {
        let node = node();
        let key = ItemKey::flight(100);
        node.add_item(xid(), key.clone(), 5, 200);
        node.add_item(xid(), key.clone(), 3, 0);

        node.reserve(xid(), customer(), &key);
        node.reserve(xid(), customer(), &key);
        let mut map = HashMap::new();
        map.insert(key.clone(), 1);
        node.cancel_reservations(xid(), &map);
        node.reserve(xid(), customer(), &key);

        let item = node.store().read(&key).unwrap();
        assert_eq!(item.count + item.reserved, 8);
    }
}
