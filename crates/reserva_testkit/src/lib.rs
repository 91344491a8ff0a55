//! # Reserva Testkit
//!
//! Test utilities for the reserva workspace.
//!
//! This crate provides:
//! - [`TestCluster`]: a coordinator wired to three in-process mock nodes,
//!   with fast timeouts suitable for tests
//! - Proptest generators for keys, stock levels and operation sequences
//!
//! The crate's own `tests/` directory hosts the cross-component scenario
//! suite.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod fixtures;
pub mod generators;

pub use fixtures::TestCluster;
