//! Record-level locking.
//!
//! Two-phase locking support: transactions acquire read/write locks on item
//! keys and hold them until commit or abort releases everything at once.

mod manager;

pub use manager::{LockManager, LockMode};
