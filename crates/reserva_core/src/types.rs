//! Core type definitions for reserva.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing and never reused for the
/// lifetime of the coordinator process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Xid(pub u64);

impl Xid {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xid:{}", self.0)
    }
}

/// Identifier for a customer record.
///
/// Customer records live on the coordinator, not on a remote resource node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CustomerId(pub u64);

impl CustomerId {
    /// Creates a new customer ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The kind of a reservable item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemKind {
    /// A flight, identified by flight number.
    Flight,
    /// A car pool at a location.
    Car,
    /// A room pool at a location.
    Room,
}

impl ItemKind {
    /// Returns the key prefix for this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            ItemKind::Flight => "flight",
            ItemKind::Car => "car",
            ItemKind::Room => "room",
        }
    }
}

/// Canonical key of a lockable record.
///
/// Item keys are the unit of locking, undo logging and reservation
/// accounting. The textual form is `flight-<number>`, `car-<location>`,
/// `room-<location>` or `customer-<id>`, and is what appears on customer
/// bills.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemKey(String);

impl ItemKey {
    /// Key for a flight.
    #[must_use]
    pub fn flight(number: u32) -> Self {
        Self(format!("flight-{number}"))
    }

    /// Key for the car pool at a location.
    #[must_use]
    pub fn car(location: &str) -> Self {
        Self(format!("car-{location}"))
    }

    /// Key for the room pool at a location.
    #[must_use]
    pub fn room(location: &str) -> Self {
        Self(format!("room-{location}"))
    }

    /// Key for a customer record.
    #[must_use]
    pub fn customer(id: CustomerId) -> Self {
        Self(format!("customer-{id}"))
    }

    /// Returns the item kind, if this key names a reservable item.
    ///
    /// Customer keys return `None`; they are lockable but not reservable.
    #[must_use]
    pub fn kind(&self) -> Option<ItemKind> {
        if self.0.starts_with("flight-") {
            Some(ItemKind::Flight)
        } else if self.0.starts_with("car-") {
            Some(ItemKind::Car)
        } else if self.0.starts_with("room-") {
            Some(ItemKind::Room)
        } else {
            None
        }
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
