//! Test fixtures: a fully wired in-process cluster.

use reserva_coord::{CoordConfig, Coordinator, MockClient, CARS_NODE, FLIGHTS_NODE, ROOMS_NODE};
use reserva_core::TxnConfig;
use std::sync::Arc;
use std::time::Duration;

/// A coordinator wired to three in-process mock nodes.
///
/// The mock clients are exposed so tests can script unreachability, delays or
/// dropped reservations on individual nodes. Timeouts default to values that
/// keep failing tests fast; override them with [`TestCluster::with_configs`].
pub struct TestCluster {
    /// The coordinator under test.
    pub coordinator: Coordinator,
    /// The flights node client.
    pub flights: Arc<MockClient>,
    /// The cars node client.
    pub cars: Arc<MockClient>,
    /// The rooms node client.
    pub rooms: Arc<MockClient>,
}

impl TestCluster {
    /// Creates a cluster with test-friendly timeouts.
    #[must_use]
    pub fn new() -> Self {
        Self::with_configs(
            CoordConfig::new().response_timeout(Duration::from_millis(200)),
            TxnConfig::new()
                .time_to_live(Duration::from_secs(5))
                .sweep_interval(Duration::from_millis(50))
                .lock_wait(Duration::from_millis(250)),
        )
    }

    /// Creates a cluster with explicit coordinator and transaction configs.
    #[must_use]
    pub fn with_configs(coord: CoordConfig, txn: TxnConfig) -> Self {
        let flights = Arc::new(MockClient::new(FLIGHTS_NODE));
        let cars = Arc::new(MockClient::new(CARS_NODE));
        let rooms = Arc::new(MockClient::new(ROOMS_NODE));

        let coordinator = Coordinator::new(
            "middleware",
            coord,
            txn,
            flights.clone(),
            cars.clone(),
            rooms.clone(),
        );

        Self {
            coordinator,
            flights,
            cars,
            rooms,
        }
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestCluster {
    type Target = Coordinator;

    fn deref(&self) -> &Self::Target {
        &self.coordinator
    }
}
