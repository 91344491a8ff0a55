//! The coordinator: client-facing operation surface.

use crate::bundle::{await_task, spawn_task};
use crate::client::{ClientParticipant, NodeClient};
use crate::config::CoordConfig;
use crate::customer::CustomerStore;
use crate::error::CoordResult;
use rand::Rng;
use reserva_core::{CustomerId, ItemKey, TransactionManager, TxnConfig, Xid};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Registered name of the flights node.
pub const FLIGHTS_NODE: &str = "flights";
/// Registered name of the cars node.
pub const CARS_NODE: &str = "cars";
/// Registered name of the rooms node.
pub const ROOMS_NODE: &str = "rooms";

pub(crate) struct CoordInner {
    pub(crate) name: String,
    pub(crate) config: CoordConfig,
    pub(crate) txns: TransactionManager,
    pub(crate) customers: Arc<CustomerStore>,
    pub(crate) flights: Arc<dyn NodeClient>,
    pub(crate) cars: Arc<dyn NodeClient>,
    pub(crate) rooms: Arc<dyn NodeClient>,
}

/// The reservation middleware.
///
/// Owns customer records, drives every operation through the transaction
/// manager (validate, then lock, then forward to the owning node), and runs
/// the bundle saga. Cloning is cheap; clones share state.
///
/// Every operation except [`Coordinator::start`] takes the transaction id
/// first and fails with `InvalidTransaction` for an unknown id or
/// `TransactionAborted` when a lock request deadlocks.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) inner: Arc<CoordInner>,
}

impl Coordinator {
    /// Creates a coordinator wired to the three resource-node clients.
    ///
    /// Registers each client (and the customer store) with the transaction
    /// manager so commit/abort fan-out reaches them.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        config: CoordConfig,
        txn_config: TxnConfig,
        flights: Arc<dyn NodeClient>,
        cars: Arc<dyn NodeClient>,
        rooms: Arc<dyn NodeClient>,
    ) -> Self {
        let txns = TransactionManager::new(txn_config);
        let customers = Arc::new(CustomerStore::new());

        txns.register_node(FLIGHTS_NODE, Arc::new(ClientParticipant::new(flights.clone())));
        txns.register_node(CARS_NODE, Arc::new(ClientParticipant::new(cars.clone())));
        txns.register_node(ROOMS_NODE, Arc::new(ClientParticipant::new(rooms.clone())));
        txns.register_customer_store(customers.clone());

        Self {
            inner: Arc::new(CoordInner {
                name: name.into(),
                config,
                txns,
                customers,
                flights,
                cars,
                rooms,
            }),
        }
    }

    /// Returns the coordinator's instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the transaction manager.
    #[must_use]
    pub fn transactions(&self) -> &TransactionManager {
        &self.inner.txns
    }

    /// Returns the customer store.
    #[must_use]
    pub fn customers(&self) -> &CustomerStore {
        &self.inner.customers
    }

    // ----- transaction control -----

    /// Starts a new transaction.
    #[must_use]
    pub fn start(&self) -> Xid {
        self.inner.txns.start()
    }

    /// Commits a transaction.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction` if the id is not active.
    pub fn commit(&self, xid: Xid) -> CoordResult<()> {
        Ok(self.inner.txns.commit(xid)?)
    }

    /// Aborts a transaction.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction` if the id is not active.
    pub fn abort(&self, xid: Xid) -> CoordResult<()> {
        Ok(self.inner.txns.abort(xid)?)
    }

    // ----- flights -----

    /// Creates a flight or adds seats to an existing one.
    ///
    /// A non-positive price keeps an existing flight's current price.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction`, `TransactionAborted`, or a communication failure
    /// from the flights node.
    pub fn add_flight(&self, xid: Xid, number: u32, seats: u32, price: i64) -> CoordResult<bool> {
        let key = ItemKey::flight(number);
        self.inner.txns.write_lock_item(xid, &key, FLIGHTS_NODE)?;
        Ok(self.inner.flights.add_item(xid, key, seats, price)?)
    }

    /// Deletes a flight; false when absent or still reserved.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`].
    pub fn delete_flight(&self, xid: Xid, number: u32) -> CoordResult<bool> {
        let key = ItemKey::flight(number);
        self.inner.txns.write_lock_item(xid, &key, FLIGHTS_NODE)?;
        Ok(self.inner.flights.delete_item(xid, &key)?)
    }

    /// Returns the number of empty seats on a flight; 0 when unknown.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`].
    pub fn query_flight(&self, xid: Xid, number: u32) -> CoordResult<u32> {
        let key = ItemKey::flight(number);
        self.inner.txns.read_lock_item(xid, &key, FLIGHTS_NODE)?;
        Ok(self.inner.flights.query_count(xid, &key)?)
    }

    /// Returns the seat price of a flight, or `None` when unknown.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`].
    pub fn query_flight_price(&self, xid: Xid, number: u32) -> CoordResult<Option<i64>> {
        let key = ItemKey::flight(number);
        self.inner.txns.read_lock_item(xid, &key, FLIGHTS_NODE)?;
        Ok(self.inner.flights.query_price(xid, &key)?)
    }

    /// Reserves a seat on a flight for a customer; returns the price paid, or
    /// `None` when the customer or seat is unavailable.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`].
    pub fn reserve_flight(&self, xid: Xid, customer: CustomerId, number: u32) -> CoordResult<Option<i64>> {
        self.reserve_item(xid, customer, ItemKey::flight(number), FLIGHTS_NODE)
    }

    // ----- cars -----

    /// Creates a car location or adds cars to an existing one.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the cars node.
    pub fn add_cars(&self, xid: Xid, location: &str, count: u32, price: i64) -> CoordResult<bool> {
        let key = ItemKey::car(location);
        self.inner.txns.write_lock_item(xid, &key, CARS_NODE)?;
        Ok(self.inner.cars.add_item(xid, key, count, price)?)
    }

    /// Deletes all cars at a location; false when absent or still reserved.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the cars node.
    pub fn delete_cars(&self, xid: Xid, location: &str) -> CoordResult<bool> {
        let key = ItemKey::car(location);
        self.inner.txns.write_lock_item(xid, &key, CARS_NODE)?;
        Ok(self.inner.cars.delete_item(xid, &key)?)
    }

    /// Returns the number of cars available at a location.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the cars node.
    pub fn query_cars(&self, xid: Xid, location: &str) -> CoordResult<u32> {
        let key = ItemKey::car(location);
        self.inner.txns.read_lock_item(xid, &key, CARS_NODE)?;
        Ok(self.inner.cars.query_count(xid, &key)?)
    }

    /// Returns the car price at a location, or `None` when unknown.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the cars node.
    pub fn query_cars_price(&self, xid: Xid, location: &str) -> CoordResult<Option<i64>> {
        let key = ItemKey::car(location);
        self.inner.txns.read_lock_item(xid, &key, CARS_NODE)?;
        Ok(self.inner.cars.query_price(xid, &key)?)
    }

    /// Reserves a car at a location for a customer.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the cars node.
    pub fn reserve_car(&self, xid: Xid, customer: CustomerId, location: &str) -> CoordResult<Option<i64>> {
        self.reserve_item(xid, customer, ItemKey::car(location), CARS_NODE)
    }

    // ----- rooms -----

    /// Creates a room location or adds rooms to an existing one.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the rooms node.
    pub fn add_rooms(&self, xid: Xid, location: &str, count: u32, price: i64) -> CoordResult<bool> {
        let key = ItemKey::room(location);
        self.inner.txns.write_lock_item(xid, &key, ROOMS_NODE)?;
        Ok(self.inner.rooms.add_item(xid, key, count, price)?)
    }

    /// Deletes all rooms at a location; false when absent or still reserved.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the rooms node.
    pub fn delete_rooms(&self, xid: Xid, location: &str) -> CoordResult<bool> {
        let key = ItemKey::room(location);
        self.inner.txns.write_lock_item(xid, &key, ROOMS_NODE)?;
        Ok(self.inner.rooms.delete_item(xid, &key)?)
    }

    /// Returns the number of rooms available at a location.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the rooms node.
    pub fn query_rooms(&self, xid: Xid, location: &str) -> CoordResult<u32> {
        let key = ItemKey::room(location);
        self.inner.txns.read_lock_item(xid, &key, ROOMS_NODE)?;
        Ok(self.inner.rooms.query_count(xid, &key)?)
    }

    /// Returns the room price at a location, or `None` when unknown.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the rooms node.
    pub fn query_rooms_price(&self, xid: Xid, location: &str) -> CoordResult<Option<i64>> {
        let key = ItemKey::room(location);
        self.inner.txns.read_lock_item(xid, &key, ROOMS_NODE)?;
        Ok(self.inner.rooms.query_price(xid, &key)?)
    }

    /// Reserves a room at a location for a customer.
    ///
    /// # Errors
    ///
    /// Same contract as [`Coordinator::add_flight`], against the rooms node.
    pub fn reserve_room(&self, xid: Xid, customer: CustomerId, location: &str) -> CoordResult<Option<i64>> {
        self.reserve_item(xid, customer, ItemKey::room(location), ROOMS_NODE)
    }

    // ----- customers -----

    /// Creates a customer with a generated, globally unique id.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction` or `TransactionAborted`.
    pub fn new_customer(&self, xid: Xid) -> CoordResult<CustomerId> {
        self.inner.txns.validate(xid)?;

        loop {
            let customer = generate_customer_id(xid);
            self.inner.txns.write_lock_customer(xid, customer)?;
            if self.inner.customers.create(xid, customer) {
                return Ok(customer);
            }
        }
    }

    /// Creates a customer with a caller-chosen id; false if the id is taken.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction` or `TransactionAborted`.
    pub fn new_customer_with_id(&self, xid: Xid, customer: CustomerId) -> CoordResult<bool> {
        self.inner.txns.write_lock_customer(xid, customer)?;
        Ok(self.inner.customers.create(xid, customer))
    }

    /// Returns the customer's bill, one `key: quantity, $price` line per
    /// reserved item. An unknown customer yields an empty string, not an
    /// error.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction` or `TransactionAborted`.
    pub fn query_customer_info(&self, xid: Xid, customer: CustomerId) -> CoordResult<String> {
        self.inner.txns.read_lock_customer(xid, customer)?;
        match self.inner.customers.read(customer) {
            Some(record) => Ok(record.bill()),
            None => {
                tracing::warn!(%xid, %customer, "customer info requested for unknown customer");
                Ok(String::new())
            }
        }
    }

    /// Deletes a customer, first returning every reserved unit to the owning
    /// nodes. False when the customer is unknown or a cancellation fan-out
    /// call fails; in the failure case the customer record stays.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction` or `TransactionAborted`.
    pub fn delete_customer(&self, xid: Xid, customer: CustomerId) -> CoordResult<bool> {
        self.inner.txns.write_lock_customer(xid, customer)?;

        let Some(record) = self.inner.customers.read(customer) else {
            tracing::warn!(%xid, %customer, "delete failed, customer doesn't exist");
            return Ok(false);
        };

        let quantities = record.quantities();
        if !self.cancel_on_all_nodes(xid, &quantities) {
            tracing::warn!(%xid, %customer, "cancellation fan-out failed, customer kept");
            return Ok(false);
        }

        Ok(self.inner.customers.remove(xid, customer))
    }

    // ----- shared plumbing -----

    fn reserve_item(
        &self,
        xid: Xid,
        customer: CustomerId,
        key: ItemKey,
        node: &str,
    ) -> CoordResult<Option<i64>> {
        self.inner.txns.write_lock_customer(xid, customer)?;
        self.inner.txns.write_lock_item(xid, &key, node)?;

        if !self.inner.customers.exists(customer) {
            tracing::warn!(%xid, %customer, %key, "reserve failed, customer doesn't exist");
            return Ok(None);
        }

        match self.client_for(node).reserve(xid, customer, &key)? {
            Some(price) => {
                self.inner.customers.record_reservation(xid, customer, &key, price);
                Ok(Some(price))
            }
            None => Ok(None),
        }
    }

    pub(crate) fn client_for(&self, node: &str) -> Arc<dyn NodeClient> {
        match node {
            CARS_NODE => self.inner.cars.clone(),
            ROOMS_NODE => self.inner.rooms.clone(),
            _ => self.inner.flights.clone(),
        }
    }

    /// Sends the full cancellation map to every node concurrently; each node
    /// cancels the keys it holds and skips the rest. All three must answer
    /// true within the response timeout.
    fn cancel_on_all_nodes(&self, xid: Xid, quantities: &HashMap<ItemKey, u32>) -> bool {
        let clients = [
            self.inner.flights.clone(),
            self.inner.cars.clone(),
            self.inner.rooms.clone(),
        ];

        let receivers: Vec<_> = clients
            .into_iter()
            .map(|client| {
                let map = quantities.clone();
                spawn_task(move || client.cancel_reservations(xid, &map))
            })
            .collect();

        receivers.iter().all(|rx| {
            matches!(
                await_task(rx, self.inner.config.response_timeout, "cancel reservations"),
                Some(Ok(true))
            )
        })
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("name", &self.inner.name)
            .field("active_transactions", &self.inner.txns.active_count())
            .finish_non_exhaustive()
    }
}

/// Generates a customer id from the transaction, the wall clock and a random
/// suffix, keeping ids unique across coordinators that share nothing.
fn generate_customer_id(xid: Xid) -> CustomerId {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        % 1_000;
    let suffix: u64 = rand::thread_rng().gen_range(1..=99);
    CustomerId::new(xid.as_u64() * 100_000 + millis * 100 + suffix)
}
