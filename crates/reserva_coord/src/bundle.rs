//! Bundle coordinator: composite reservations with compensation.

use crate::client::NodeClient;
use crate::coordinator::{Coordinator, CARS_NODE, FLIGHTS_NODE, ROOMS_NODE};
use crate::error::CoordResult;
use reserva_core::{CoreResult, CustomerId, ItemKey, Xid};
use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A composite reservation: a list of flights, plus optionally a car and/or a
/// room at the destination.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// The customer the bundle is reserved for.
    pub customer: CustomerId,
    /// Flight numbers to reserve, duplicates meaning multiple seats.
    pub flights: Vec<u32>,
    /// Location of the optional car and room.
    pub location: String,
    /// Whether to reserve a car at the location.
    pub with_car: bool,
    /// Whether to reserve a room at the location.
    pub with_room: bool,
}

impl BundleRequest {
    /// Creates a flights-only bundle request.
    #[must_use]
    pub fn new(customer: CustomerId, flights: Vec<u32>, location: impl Into<String>) -> Self {
        Self {
            customer,
            flights,
            location: location.into(),
            with_car: false,
            with_room: false,
        }
    }

    /// Adds a car at the location to the bundle.
    #[must_use]
    pub fn with_car(mut self) -> Self {
        self.with_car = true;
        self
    }

    /// Adds a room at the location to the bundle.
    #[must_use]
    pub fn with_room(mut self) -> Self {
        self.with_room = true;
        self
    }
}

/// Phase of a bundle request.
///
/// A bundle moves `Checking → Reserving → Done`; a failed check goes straight
/// to `Failed`, and a failed reservation passes through `Compensating` (where
/// completed legs are cancelled) before `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundlePhase {
    /// Concurrently checking availability across nodes.
    Checking,
    /// Concurrently reserving across nodes.
    Reserving,
    /// Cancelling the legs that succeeded after another leg failed.
    Compensating,
    /// Every leg reserved.
    Done,
    /// The bundle was not reserved.
    Failed,
}

impl BundlePhase {
    /// Returns true once the bundle has reached a final phase.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, BundlePhase::Done | BundlePhase::Failed)
    }
}

/// Reservations one leg completed: one `(key, unit price)` entry per unit.
type LegLines = Vec<(ItemKey, i64)>;
type LegResult = CoreResult<Option<LegLines>>;

/// Runs `f` on its own thread, returning a receiver for the result.
///
/// If the receiver gives up (timeout), the thread finishes on its own and the
/// send fails silently; cancellation is best-effort.
pub(crate) fn spawn_task<T, F>(f: F) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx
}

/// Waits for a task's result, treating a missed deadline as failure.
pub(crate) fn await_task<T>(rx: &mpsc::Receiver<T>, timeout: Duration, what: &str) -> Option<T> {
    match rx.recv_timeout(timeout) {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(task = what, "task missed the response timeout, treating as failed");
            None
        }
    }
}

impl Coordinator {
    /// Reserves a bundle: the flight list, plus a car and/or room at the
    /// location when requested.
    ///
    /// Availability is checked concurrently first; only if every requested
    /// leg is available are the reservations made, again concurrently. When a
    /// reservation leg fails or times out, the legs that did succeed are
    /// cancelled with compensating cancellations, so a failed bundle leaves
    /// item accounting and the customer's bill untouched.
    ///
    /// Returns false (without error) for an empty flight list, an unknown
    /// customer, a failed availability check, or a compensated reservation
    /// failure.
    ///
    /// # Errors
    ///
    /// `InvalidTransaction` or `TransactionAborted` from the lock phase.
    pub fn bundle(&self, xid: Xid, request: &BundleRequest) -> CoordResult<bool> {
        tracing::info!(
            %xid,
            customer = %request.customer,
            flights = ?request.flights,
            location = %request.location,
            car = request.with_car,
            room = request.with_room,
            "bundle requested"
        );

        if request.flights.is_empty() {
            return Ok(false);
        }

        // Lock phase: everything the bundle may touch, before any fan-out.
        let txns = self.inner.txns.clone();
        txns.write_lock_customer(xid, request.customer)?;

        let mut distinct_flights = request.flights.clone();
        distinct_flights.sort_unstable();
        distinct_flights.dedup();
        for number in &distinct_flights {
            txns.write_lock_item(xid, &ItemKey::flight(*number), FLIGHTS_NODE)?;
        }

        let car_key = ItemKey::car(&request.location);
        let room_key = ItemKey::room(&request.location);
        if request.with_car {
            txns.write_lock_item(xid, &car_key, CARS_NODE)?;
        }
        if request.with_room {
            txns.write_lock_item(xid, &room_key, ROOMS_NODE)?;
        }

        if !self.inner.customers.exists(request.customer) {
            tracing::warn!(%xid, customer = %request.customer, "bundle failed, customer doesn't exist");
            return Ok(false);
        }

        if !self.check_availability(xid, request, &car_key, &room_key) {
            self.log_phase(xid, BundlePhase::Failed);
            return Ok(false);
        }

        let reserved = self.reserve_legs(xid, request, &car_key, &room_key);
        self.log_phase(
            xid,
            if reserved { BundlePhase::Done } else { BundlePhase::Failed },
        );
        Ok(reserved)
    }

    /// CHECKING: one concurrent, timeout-bounded task per requested leg.
    /// Read-only; a failure here leaves no side effects anywhere.
    fn check_availability(
        &self,
        xid: Xid,
        request: &BundleRequest,
        car_key: &ItemKey,
        room_key: &ItemKey,
    ) -> bool {
        self.log_phase(xid, BundlePhase::Checking);
        let timeout = self.inner.config.response_timeout;

        let mut checks: Vec<(&'static str, mpsc::Receiver<bool>)> = Vec::new();

        {
            let client = self.inner.flights.clone();
            let flights = request.flights.clone();
            checks.push((
                FLIGHTS_NODE,
                spawn_task(move || match client.check_flight_list(xid, &flights) {
                    Ok(available) => available,
                    Err(err) => {
                        tracing::warn!(%xid, %err, "flight availability check failed");
                        false
                    }
                }),
            ));
        }

        if request.with_car {
            let client = self.inner.cars.clone();
            let key = car_key.clone();
            checks.push((
                CARS_NODE,
                spawn_task(move || matches!(client.query_count(xid, &key), Ok(count) if count > 0)),
            ));
        }

        if request.with_room {
            let client = self.inner.rooms.clone();
            let key = room_key.clone();
            checks.push((
                ROOMS_NODE,
                spawn_task(move || matches!(client.query_count(xid, &key), Ok(count) if count > 0)),
            ));
        }

        checks
            .iter()
            .all(|(label, rx)| await_task(rx, timeout, label) == Some(true))
    }

    /// RESERVING: one concurrent, timeout-bounded task per leg. Successful
    /// legs are recorded against the customer as they complete; if any leg
    /// fails, the successful ones are compensated.
    fn reserve_legs(
        &self,
        xid: Xid,
        request: &BundleRequest,
        car_key: &ItemKey,
        room_key: &ItemKey,
    ) -> bool {
        self.log_phase(xid, BundlePhase::Reserving);
        let timeout = self.inner.config.response_timeout;
        let customer = request.customer;

        let mut legs: Vec<(&'static str, Arc<dyn NodeClient>, mpsc::Receiver<LegResult>)> =
            Vec::new();

        {
            let client = self.inner.flights.clone();
            let task_client = client.clone();
            let flights = request.flights.clone();
            legs.push((
                FLIGHTS_NODE,
                client,
                spawn_task(move || {
                    task_client
                        .reserve_flight_list(xid, customer, &flights)
                        .map(|prices| {
                            prices.map(|prices| {
                                flights
                                    .iter()
                                    .zip(prices)
                                    .map(|(number, price)| (ItemKey::flight(*number), price))
                                    .collect()
                            })
                        })
                }),
            ));
        }

        if request.with_car {
            let client = self.inner.cars.clone();
            let task_client = client.clone();
            let key = car_key.clone();
            legs.push((
                CARS_NODE,
                client,
                spawn_task(move || {
                    task_client
                        .reserve(xid, customer, &key)
                        .map(|price| price.map(|price| vec![(key.clone(), price)]))
                }),
            ));
        }

        if request.with_room {
            let client = self.inner.rooms.clone();
            let task_client = client.clone();
            let key = room_key.clone();
            legs.push((
                ROOMS_NODE,
                client,
                spawn_task(move || {
                    task_client
                        .reserve(xid, customer, &key)
                        .map(|price| price.map(|price| vec![(key.clone(), price)]))
                }),
            ));
        }

        let mut succeeded: Vec<(Arc<dyn NodeClient>, LegLines)> = Vec::new();
        let mut failed = false;

        for (label, client, rx) in legs {
            match await_task(&rx, timeout, label) {
                Some(Ok(Some(lines))) => {
                    for (key, price) in &lines {
                        self.inner
                            .customers
                            .record_reservation(xid, customer, key, *price);
                    }
                    succeeded.push((client, lines));
                }
                Some(Ok(None)) => {
                    tracing::warn!(%xid, leg = label, "bundle leg unavailable at reserve time");
                    failed = true;
                }
                Some(Err(err)) => {
                    tracing::warn!(%xid, leg = label, %err, "bundle leg failed");
                    failed = true;
                }
                None => failed = true,
            }
        }

        if failed {
            self.compensate(xid, customer, succeeded);
            return false;
        }
        true
    }

    /// Cancels every leg that succeeded and removes its lines from the
    /// customer, returning item accounting to its pre-bundle state.
    fn compensate(&self, xid: Xid, customer: CustomerId, succeeded: Vec<(Arc<dyn NodeClient>, LegLines)>) {
        if succeeded.is_empty() {
            return;
        }
        self.log_phase(xid, BundlePhase::Compensating);
        let timeout = self.inner.config.response_timeout;

        let pending: Vec<(HashMap<ItemKey, u32>, mpsc::Receiver<CoreResult<bool>>)> = succeeded
            .into_iter()
            .map(|(client, lines)| {
                let mut quantities: HashMap<ItemKey, u32> = HashMap::new();
                for (key, _) in &lines {
                    *quantities.entry(key.clone()).or_insert(0) += 1;
                }
                let map = quantities.clone();
                let rx = spawn_task(move || client.cancel_reservations(xid, &map));
                (quantities, rx)
            })
            .collect();

        for (quantities, rx) in pending {
            match await_task(&rx, timeout, "compensating cancellation") {
                Some(Ok(true)) => {}
                outcome => {
                    tracing::warn!(%xid, ?outcome, "compensating cancellation did not confirm");
                }
            }
            for (key, quantity) in &quantities {
                self.inner
                    .customers
                    .remove_reservation(xid, customer, key, *quantity);
            }
        }
    }

    fn log_phase(&self, xid: Xid, phase: BundlePhase) {
        tracing::info!(%xid, ?phase, "bundle phase");
    }
}
