//! Coordinator-owned customer records.

use parking_lot::Mutex;
use reserva_core::{CoreResult, CustomerId, ItemKey, Participant, UndoLog, Xid};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;

/// One line of a customer's reservations: how many units of an item were
/// reserved, at which unit price.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedLine {
    /// Units reserved.
    pub quantity: u32,
    /// Unit price recorded at reservation time.
    pub price: i64,
}

/// A customer and the reservations recorded against them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    id: CustomerId,
    reserved: BTreeMap<ItemKey, ReservedLine>,
}

impl Customer {
    /// Creates a customer with no reservations.
    #[must_use]
    pub fn new(id: CustomerId) -> Self {
        Self {
            id,
            reserved: BTreeMap::new(),
        }
    }

    /// Returns the customer id.
    #[must_use]
    pub fn id(&self) -> CustomerId {
        self.id
    }

    /// Records one reserved unit of `key` at `price`.
    ///
    /// Repeat reservations of the same key accumulate quantity; the recorded
    /// unit price follows the latest reservation.
    pub fn reserve(&mut self, key: ItemKey, price: i64) {
        let line = self.reserved.entry(key).or_insert(ReservedLine {
            quantity: 0,
            price,
        });
        line.quantity += 1;
        line.price = price;
    }

    /// Removes `quantity` reserved units of `key`; the line disappears when
    /// it reaches zero.
    pub fn unreserve(&mut self, key: &ItemKey, quantity: u32) {
        if let Some(line) = self.reserved.get_mut(key) {
            line.quantity = line.quantity.saturating_sub(quantity);
            if line.quantity == 0 {
                self.reserved.remove(key);
            }
        }
    }

    /// Returns the reservation lines, in key order.
    #[must_use]
    pub fn reservations(&self) -> &BTreeMap<ItemKey, ReservedLine> {
        &self.reserved
    }

    /// Returns a key → quantity map of the reservations, for cancellation.
    #[must_use]
    pub fn quantities(&self) -> HashMap<ItemKey, u32> {
        self.reserved
            .iter()
            .map(|(key, line)| (key.clone(), line.quantity))
            .collect()
    }

    /// Renders the customer's bill: one `key: quantity, $price` line per
    /// reserved item, newline-separated, in key order.
    #[must_use]
    pub fn bill(&self) -> String {
        let mut out = String::new();
        for (key, line) in &self.reserved {
            if !out.is_empty() {
                out.push('\n');
            }
            let _ = write!(out, "{key}: {}, ${}", line.quantity, line.price);
        }
        out
    }
}

/// The coordinator's store of customer records.
///
/// Customers live on the coordinator itself rather than on a remote node, so
/// the store carries its own undo log and participates in transaction
/// outcomes like any resource node: commit discards before-images, abort
/// restores them (including restoring absence).
#[derive(Debug)]
pub struct CustomerStore {
    data: Mutex<HashMap<CustomerId, Customer>>,
    undo: UndoLog<CustomerId, Customer>,
}

impl CustomerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Mutex::new(HashMap::new()),
            undo: UndoLog::new(),
        }
    }

    /// Returns a clone of the customer, or `None` if unknown.
    #[must_use]
    pub fn read(&self, customer: CustomerId) -> Option<Customer> {
        self.data.lock().get(&customer).cloned()
    }

    /// Returns true if the customer exists.
    #[must_use]
    pub fn exists(&self, customer: CustomerId) -> bool {
        self.data.lock().contains_key(&customer)
    }

    /// Creates a customer record. False if the id is already taken.
    pub fn create(&self, xid: Xid, customer: CustomerId) -> bool {
        let mut data = self.data.lock();
        if data.contains_key(&customer) {
            tracing::info!(%xid, %customer, "customer already exists");
            return false;
        }
        self.undo.before_write(xid, customer, None);
        data.insert(customer, Customer::new(customer));
        tracing::info!(%xid, %customer, "customer created");
        true
    }

    /// Records one reserved unit against a customer. False if unknown.
    pub fn record_reservation(
        &self,
        xid: Xid,
        customer: CustomerId,
        key: &ItemKey,
        price: i64,
    ) -> bool {
        let mut data = self.data.lock();
        let Some(existing) = data.get(&customer) else {
            tracing::warn!(%xid, %customer, %key, "reservation for unknown customer dropped");
            return false;
        };
        self.undo.before_write(xid, customer, Some(existing));

        if let Some(record) = data.get_mut(&customer) {
            record.reserve(key.clone(), price);
        }
        true
    }

    /// Removes reserved units from a customer's record (compensation path).
    pub fn remove_reservation(&self, xid: Xid, customer: CustomerId, key: &ItemKey, quantity: u32) {
        let mut data = self.data.lock();
        let Some(existing) = data.get(&customer) else {
            return;
        };
        self.undo.before_write(xid, customer, Some(existing));

        if let Some(record) = data.get_mut(&customer) {
            record.unreserve(key, quantity);
        }
    }

    /// Removes a customer record entirely. False if unknown.
    pub fn remove(&self, xid: Xid, customer: CustomerId) -> bool {
        let mut data = self.data.lock();
        let Some(existing) = data.get(&customer) else {
            return false;
        };
        self.undo.before_write(xid, customer, Some(existing));
        data.remove(&customer);
        tracing::info!(%xid, %customer, "customer removed");
        true
    }
}

impl Default for CustomerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Participant for CustomerStore {
    fn participant_name(&self) -> &str {
        "customers"
    }

    fn commit(&self, xid: Xid) -> CoreResult<()> {
        tracing::info!(%xid, "customer store committing");
        self.undo.commit(xid);
        Ok(())
    }

    fn abort(&self, xid: Xid) -> CoreResult<()> {
        let images = self.undo.take_images(xid);
        let count = images.len();
        let mut data = self.data.lock();
        for (customer, image) in images {
            match image {
                Some(record) => {
                    data.insert(customer, record);
                }
                None => {
                    data.remove(&customer);
                }
            }
        }
        tracing::info!(%xid, count, "customer store aborted, before-images restored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xid() -> Xid {
        Xid::new(1)
    }

    fn cid() -> CustomerId {
        CustomerId::new(7)
    }

    #[test]
    fn bill_renders_lines_in_key_order() {
        let mut customer = Customer::new(cid());
        customer.reserve(ItemKey::flight(100), 200);
        customer.reserve(ItemKey::flight(100), 200);
        customer.reserve(ItemKey::car("NYC"), 40);

        assert_eq!(customer.bill(), "car-NYC: 1, $40\nflight-100: 2, $200");
    }

    #[test]
    fn empty_bill_is_empty_string() {
        assert_eq!(Customer::new(cid()).bill(), "");
    }

    #[test]
    fn unreserve_drops_empty_lines() {
        let mut customer = Customer::new(cid());
        customer.reserve(ItemKey::flight(100), 200);
        customer.unreserve(&ItemKey::flight(100), 1);

        assert!(customer.reservations().is_empty());
        assert_eq!(customer.bill(), "");
    }

    #[test]
    fn create_rejects_duplicates() {
        let store = CustomerStore::new();
        assert!(store.create(xid(), cid()));
        assert!(!store.create(xid(), cid()));
    }

    #[test]
    fn record_reservation_requires_customer() {
        let store = CustomerStore::new();
        assert!(!store.record_reservation(xid(), cid(), &ItemKey::flight(100), 200));

        store.create(xid(), cid());
        assert!(store.record_reservation(xid(), cid(), &ItemKey::flight(100), 200));
        assert_eq!(store.read(cid()).unwrap().bill(), "flight-100: 1, $200");
    }

    #[test]
    fn abort_restores_creation() {
        let store = CustomerStore::new();
        store.create(xid(), cid());

        Participant::abort(&store, xid()).unwrap();
        assert!(!store.exists(cid()));
    }

    #[test]
    fn abort_restores_first_image_of_reservations() {
        let store = CustomerStore::new();

        // Committed baseline: customer with one flight.
        store.create(Xid::new(1), cid());
        store.record_reservation(Xid::new(1), cid(), &ItemKey::flight(100), 200);
        Participant::commit(&store, Xid::new(1)).unwrap();

        // Second transaction piles on, then aborts.
        let x2 = Xid::new(2);
        store.record_reservation(x2, cid(), &ItemKey::flight(200), 300);
        store.record_reservation(x2, cid(), &ItemKey::car("NYC"), 40);
        Participant::abort(&store, x2).unwrap();

        assert_eq!(store.read(cid()).unwrap().bill(), "flight-100: 1, $200");
    }

    #[test]
    fn remove_then_abort_restores_customer() {
        let store = CustomerStore::new();
        store.create(Xid::new(1), cid());
        store.record_reservation(Xid::new(1), cid(), &ItemKey::flight(100), 200);
        Participant::commit(&store, Xid::new(1)).unwrap();

        let x2 = Xid::new(2);
        assert!(store.remove(x2, cid()));
        assert!(!store.exists(cid()));

        Participant::abort(&store, x2).unwrap();
        assert_eq!(store.read(cid()).unwrap().bill(), "flight-100: 1, $200");
    }

    #[test]
    fn quantities_map_matches_lines() {
        let mut customer = Customer::new(cid());
        customer.reserve(ItemKey::flight(100), 200);
        customer.reserve(ItemKey::flight(100), 200);
        customer.reserve(ItemKey::room("NYC"), 90);

        let map = customer.quantities();
        assert_eq!(map.get(&ItemKey::flight(100)), Some(&2));
        assert_eq!(map.get(&ItemKey::room("NYC")), Some(&1));
    }
}
