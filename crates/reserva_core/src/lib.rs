//! # Reserva Core
//!
//! Transaction coordination core for the reserva reservation backend.
//!
//! This crate provides:
//! - Record-level read/write locking with bounded waits (`lock`)
//! - An in-memory store of reservable items with clone-on-read isolation (`store`)
//! - Per-transaction before-image undo logging for abort (`store::undo`)
//! - Transaction lifecycle management with a time-to-live sweep (`txn`)
//!
//! The crate is transport-agnostic: remote resource nodes are reached through
//! the [`Participant`] notification trait and whatever data-plane interface
//! the embedding middleware defines on top of [`ResourceNode`].
//!
//! ## Weakness preserved on purpose
//!
//! Commit/abort fan-out to participants is best-effort. There is no prepare
//! phase and no persistent commit record, so a participant that is unreachable
//! at commit time simply misses the notification. Callers must not assume
//! atomic cross-node outcomes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
pub mod lock;
pub mod store;
pub mod txn;
mod types;

pub use config::TxnConfig;
pub use error::{CoreError, CoreResult};
pub use lock::{LockManager, LockMode};
pub use store::{ResourceNode, ResourceStore, ReservableItem, UndoLog};
pub use txn::{Participant, Transaction, TransactionManager};
pub use types::{CustomerId, ItemKey, ItemKind, Xid};
