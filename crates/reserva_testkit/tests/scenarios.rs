//! Cross-component scenarios: transactions, locking, bundles, compensation.

use proptest::prelude::*;
use reserva_coord::{BundleRequest, CoordConfig};
use reserva_core::{CustomerId, ItemKey, ResourceNode, TxnConfig, Xid};
use reserva_testkit::generators::{stock_workload_strategy, StockOp};
use reserva_testkit::TestCluster;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

#[test]
fn reserve_then_delete_customer_restores_stock() {
    let cluster = TestCluster::new();
    let xid = cluster.start();

    cluster.add_flight(xid, 100, 5, 200).unwrap();
    let customer = cluster.new_customer(xid).unwrap();

    assert_eq!(cluster.reserve_flight(xid, customer, 100).unwrap(), Some(200));
    assert_eq!(cluster.query_flight(xid, 100).unwrap(), 4);
    let item = cluster
        .flights
        .node()
        .store()
        .read(&ItemKey::flight(100))
        .unwrap();
    assert_eq!(item.reserved, 1);

    assert!(cluster.delete_customer(xid, customer).unwrap());
    assert_eq!(cluster.query_flight(xid, 100).unwrap(), 5);
    let item = cluster
        .flights
        .node()
        .store()
        .read(&ItemKey::flight(100))
        .unwrap();
    assert_eq!(item.reserved, 0);

    cluster.commit(xid).unwrap();
}

#[test]
fn bundle_check_timeout_prevents_flight_reservation() {
    let cluster = TestCluster::new();
    let xid = cluster.start();

    cluster.add_flight(xid, 100, 5, 200).unwrap();
    cluster.add_cars(xid, "NYC", 2, 40).unwrap();
    let customer = cluster.new_customer(xid).unwrap();

    // The car availability check stalls past the bundle timeout; flights were
    // available, but checks precede any reservation.
    cluster.cars.set_delay(Some(Duration::from_millis(600)));
    let request = BundleRequest::new(customer, vec![100], "NYC").with_car();
    assert!(!cluster.bundle(xid, &request).unwrap());
    cluster.cars.set_delay(None);

    assert_eq!(cluster.query_flight(xid, 100).unwrap(), 5);
    assert_eq!(cluster.query_customer_info(xid, customer).unwrap(), "");

    cluster.commit(xid).unwrap();
}

#[test]
fn bundle_room_failure_cancels_the_car() {
    let cluster = TestCluster::new();
    let xid = cluster.start();

    cluster.add_flight(xid, 100, 5, 200).unwrap();
    cluster.add_cars(xid, "NYC", 2, 40).unwrap();
    cluster.add_rooms(xid, "NYC", 1, 90).unwrap();
    let customer = cluster.new_customer(xid).unwrap();

    // Availability checks pass, but the room reservation itself is dropped.
    cluster.rooms.set_fail_reserves(true);
    let request = BundleRequest::new(customer, vec![100], "NYC")
        .with_car()
        .with_room();
    assert!(!cluster.bundle(xid, &request).unwrap());

    // The car (and flight) reservations were compensated back.
    assert_eq!(cluster.query_cars(xid, "NYC").unwrap(), 2);
    assert_eq!(cluster.query_flight(xid, 100).unwrap(), 5);
    assert_eq!(cluster.query_rooms(xid, "NYC").unwrap(), 1);
    assert_eq!(cluster.query_customer_info(xid, customer).unwrap(), "");

    cluster.commit(xid).unwrap();
}

#[test]
fn blocked_writer_proceeds_after_commit() {
    let cluster = TestCluster::with_configs(
        CoordConfig::new().response_timeout(Duration::from_millis(200)),
        TxnConfig::new()
            .time_to_live(Duration::from_secs(5))
            .sweep_interval(Duration::from_millis(50))
            .lock_wait(Duration::from_secs(3)),
    );
    let mw = cluster.coordinator.clone();

    let x1 = mw.start();
    mw.add_flight(x1, 100, 5, 200).unwrap();

    let mw2 = mw.clone();
    let waiter = thread::spawn(move || {
        let x2 = mw2.start();
        mw2.add_flight(x2, 100, 3, 0).map(|ok| (x2, ok))
    });

    // Let the waiter block on the write lock, then commit the holder.
    thread::sleep(Duration::from_millis(150));
    mw.commit(x1).unwrap();

    let (x2, ok) = waiter.join().unwrap().unwrap();
    assert!(ok);
    assert_eq!(mw.query_flight(x2, 100).unwrap(), 8);
    mw.commit(x2).unwrap();
}

#[test]
fn sweep_unblocks_writer_and_rolls_back_the_holder() {
    let cluster = TestCluster::with_configs(
        CoordConfig::new().response_timeout(Duration::from_millis(200)),
        TxnConfig::new()
            .time_to_live(Duration::from_millis(300))
            .sweep_interval(Duration::from_millis(30))
            .lock_wait(Duration::from_secs(5)),
    );
    let mw = cluster.coordinator.clone();

    // x1 creates a flight, holds the write lock and never finishes.
    let x1 = mw.start();
    mw.add_flight(x1, 100, 5, 200).unwrap();

    let mw2 = mw.clone();
    let waiter = thread::spawn(move || {
        // Start late so the second transaction's own time-to-live is fresh
        // when the sweep clears the first one.
        thread::sleep(Duration::from_millis(250));
        let x2 = mw2.start();
        mw2.add_flight(x2, 100, 3, 150).map(|ok| (x2, ok))
    });

    let (x2, ok) = waiter.join().unwrap().unwrap();
    assert!(ok);
    assert!(!mw.transactions().is_active(x1));

    // The expired holder's add was rolled back; only the waiter's remains.
    assert_eq!(mw.query_flight(x2, 100).unwrap(), 3);
    assert_eq!(mw.query_flight_price(x2, 100).unwrap(), Some(150));
    mw.commit(x2).unwrap();
}

#[test]
fn abort_rolls_back_every_node_and_the_customer() {
    let cluster = TestCluster::new();

    // Committed baseline.
    let x1 = cluster.start();
    cluster.add_flight(x1, 100, 5, 200).unwrap();
    cluster.add_cars(x1, "NYC", 2, 40).unwrap();
    let customer = cluster.new_customer(x1).unwrap();
    cluster.commit(x1).unwrap();

    // A second transaction touches everything, then aborts.
    let x2 = cluster.start();
    cluster.add_rooms(x2, "NYC", 4, 90).unwrap();
    cluster.reserve_flight(x2, customer, 100).unwrap();
    cluster.reserve_car(x2, customer, "NYC").unwrap();
    cluster.abort(x2).unwrap();

    let x3 = cluster.start();
    assert_eq!(cluster.query_flight(x3, 100).unwrap(), 5);
    assert_eq!(cluster.query_cars(x3, "NYC").unwrap(), 2);
    assert_eq!(cluster.query_rooms(x3, "NYC").unwrap(), 0);
    assert_eq!(cluster.query_customer_info(x3, customer).unwrap(), "");
    cluster.commit(x3).unwrap();
}

#[test]
fn locks_do_not_outlive_their_transaction() {
    let cluster = TestCluster::new();
    let mw = &cluster.coordinator;

    let x1 = mw.start();
    mw.add_flight(x1, 100, 5, 200).unwrap();
    mw.commit(x1).unwrap();
    assert!(mw.transactions().locks().held_keys(x1).is_empty());

    // A fresh transaction takes the same lock without waiting.
    let x2 = mw.start();
    mw.add_flight(x2, 100, 1, 0).unwrap();
    mw.abort(x2).unwrap();
    assert!(mw.transactions().locks().held_keys(x2).is_empty());
}

proptest! {
    /// `available + reserved` always equals the total stock ever added,
    /// whatever interleaving of reserve and cancel ran.
    #[test]
    fn stock_accounting_is_conserved(ops in stock_workload_strategy()) {
        let node = ResourceNode::new("flights");
        let xid = Xid::new(1);
        let customer = CustomerId::new(1);
        let key = ItemKey::flight(42);
        let mut added = 0u32;

        for op in ops {
            match op {
                StockOp::Add(n) => {
                    node.add_item(xid, key.clone(), n, 100);
                    added += n;
                }
                StockOp::Reserve => {
                    let _ = node.reserve(xid, customer, &key);
                }
                StockOp::Cancel(n) => {
                    let mut map = HashMap::new();
                    map.insert(key.clone(), n);
                    node.cancel_reservations(xid, &map);
                }
            }

            match node.store().read(&key) {
                Some(item) => prop_assert_eq!(item.count + item.reserved, added),
                None => prop_assert_eq!(added, 0),
            }
        }
    }

    /// Abort restores the pre-transaction state whatever the order of writes
    /// within the transaction: only the first before-image per key counts.
    #[test]
    fn abort_restores_state_under_any_write_order(ops in stock_workload_strategy()) {
        let node = ResourceNode::new("flights");
        let key = ItemKey::flight(42);
        let customer = CustomerId::new(1);

        node.add_item(Xid::new(1), key.clone(), 5, 200);
        node.commit(Xid::new(1));
        let baseline = node.store().read(&key);

        let x2 = Xid::new(2);
        for op in ops {
            match op {
                StockOp::Add(n) => {
                    node.add_item(x2, key.clone(), n, 777);
                }
                StockOp::Reserve => {
                    let _ = node.reserve(x2, customer, &key);
                }
                StockOp::Cancel(n) => {
                    let mut map = HashMap::new();
                    map.insert(key.clone(), n);
                    node.cancel_reservations(x2, &map);
                }
            }
        }
        node.abort(x2);

        prop_assert_eq!(node.store().read(&key), baseline);
    }
}
