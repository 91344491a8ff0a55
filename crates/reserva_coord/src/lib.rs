//! # Reserva Coordinator
//!
//! The middleware of the reserva reservation backend.
//!
//! This crate provides:
//! - The coordinator-owned customer store with its own undo log
//! - The client-facing operation surface (add/delete/query/reserve per
//!   resource kind, customer management, transaction control)
//! - The bundle coordinator: concurrent availability checks, concurrent
//!   reservation and compensating cancellation on partial failure
//!
//! Remote resource nodes are reached through the [`NodeClient`] trait; an
//! in-process `reserva_core::ResourceNode` implements it directly, and a wire
//! transport is an external collaborator.
//!
//! Bundle reservations are a saga, not a distributed transaction: a bundle
//! that fails halfway undoes its completed legs with explicit compensating
//! cancellations rather than relying on any cross-node atomicity.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bundle;
mod client;
mod config;
mod coordinator;
mod customer;
mod error;

pub use bundle::{BundlePhase, BundleRequest};
pub use client::{ClientParticipant, MockClient, NodeClient};
pub use config::CoordConfig;
pub use coordinator::{Coordinator, CARS_NODE, FLIGHTS_NODE, ROOMS_NODE};
pub use customer::{Customer, CustomerStore, ReservedLine};
pub use error::{CoordError, CoordResult};
