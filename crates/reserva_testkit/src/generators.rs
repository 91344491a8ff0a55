//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random reservation workloads.

use proptest::prelude::*;
use reserva_core::{CustomerId, ItemKey};

/// Strategy for generating airport-style location codes.
pub fn location_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z]{3}").expect("Invalid regex")
}

/// Strategy for generating small flight numbers.
pub fn flight_number_strategy() -> impl Strategy<Value = u32> {
    1u32..500
}

/// Strategy for generating an item key of any kind.
pub fn item_key_strategy() -> impl Strategy<Value = ItemKey> {
    prop_oneof![
        flight_number_strategy().prop_map(ItemKey::flight),
        location_strategy().prop_map(|loc| ItemKey::car(&loc)),
        location_strategy().prop_map(|loc| ItemKey::room(&loc)),
    ]
}

/// Strategy for generating customer ids.
pub fn customer_id_strategy() -> impl Strategy<Value = CustomerId> {
    (1u64..10_000).prop_map(CustomerId::new)
}

/// One step of a reservation workload against a single item.
#[derive(Debug, Clone)]
pub enum StockOp {
    /// Add this many units.
    Add(u32),
    /// Reserve one unit.
    Reserve,
    /// Return this many reserved units.
    Cancel(u32),
}

/// Strategy for generating a workload of add/reserve/cancel steps.
pub fn stock_workload_strategy() -> impl Strategy<Value = Vec<StockOp>> {
    prop::collection::vec(
        prop_oneof![
            (1u32..10).prop_map(StockOp::Add),
            Just(StockOp::Reserve),
            (1u32..4).prop_map(StockOp::Cancel),
        ],
        1..40,
    )
}
