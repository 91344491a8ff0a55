//! Per-transaction bookkeeping.

use crate::types::Xid;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

/// Book-keeping for one active transaction.
///
/// Tracks the deadline after which the sweep may abort it, whether it touched
/// the coordinator-local customer store, and which remote resource nodes it
/// touched (by registered name). Terminated transactions are simply removed
/// from the manager's active table; their ids are never reused.
#[derive(Debug)]
pub struct Transaction {
    xid: Xid,
    started: Instant,
    deadline: Instant,
    touched_customers: bool,
    participants: BTreeSet<String>,
}

impl Transaction {
    /// Creates a transaction whose deadline is `ttl` from now.
    #[must_use]
    pub fn new(xid: Xid, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            xid,
            started: now,
            deadline: now + ttl,
            touched_customers: false,
            participants: BTreeSet::new(),
        }
    }

    /// Returns the transaction id.
    #[must_use]
    pub fn xid(&self) -> Xid {
        self.xid
    }

    /// Returns when the transaction was created.
    #[must_use]
    pub fn started(&self) -> Instant {
        self.started
    }

    /// Returns true once the time-to-live has elapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Pushes the deadline out to `ttl` from now.
    pub fn reset_time_to_live(&mut self, ttl: Duration) {
        self.deadline = Instant::now() + ttl;
    }

    /// Marks the coordinator's customer store as touched.
    pub fn touch_customers(&mut self) {
        self.touched_customers = true;
    }

    /// Whether the transaction touched customer records.
    #[must_use]
    pub fn touched_customers(&self) -> bool {
        self.touched_customers
    }

    /// Records a remote resource node as a participant. Duplicates collapse.
    pub fn add_participant(&mut self, node: &str) {
        if self.participants.insert(node.to_string()) {
            tracing::debug!(xid = %self.xid, node, "participant joined transaction");
        }
    }

    /// The names of the resource nodes this transaction touched.
    #[must_use]
    pub fn participants(&self) -> &BTreeSet<String> {
        &self.participants
    }
}
