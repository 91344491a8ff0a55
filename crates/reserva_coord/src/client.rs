//! Resource node client abstraction.

use reserva_core::{CoreError, CoreResult, CustomerId, ItemKey, Participant, ResourceNode, Xid};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A callable interface to one resource node.
///
/// This is the transport-agnostic boundary the coordinator consumes: the
/// deployment decides whether a client is an in-process [`ResourceNode`] or a
/// proxy speaking some wire protocol. Transport failures surface as
/// [`CoreError::Communication`]; business failures stay sentinel values, the
/// same as on the node itself.
pub trait NodeClient: Send + Sync {
    /// The node's logical name.
    fn node_name(&self) -> &str;

    /// Creates an item or tops up an existing one.
    fn add_item(&self, xid: Xid, key: ItemKey, count: u32, price: i64) -> CoreResult<bool>;

    /// Deletes an item; false when absent or still reserved.
    fn delete_item(&self, xid: Xid, key: &ItemKey) -> CoreResult<bool>;

    /// Returns the available count; 0 when absent.
    fn query_count(&self, xid: Xid, key: &ItemKey) -> CoreResult<u32>;

    /// Returns the unit price, or `None` when absent.
    fn query_price(&self, xid: Xid, key: &ItemKey) -> CoreResult<Option<i64>>;

    /// Reserves one unit for a customer; `None` when absent or sold out.
    fn reserve(&self, xid: Xid, customer: CustomerId, key: &ItemKey) -> CoreResult<Option<i64>>;

    /// Checks availability of a whole flight list, duplicates included.
    fn check_flight_list(&self, xid: Xid, flights: &[u32]) -> CoreResult<bool>;

    /// Reserves a whole flight list; `None` (with no side effects) on failure.
    fn reserve_flight_list(
        &self,
        xid: Xid,
        customer: CustomerId,
        flights: &[u32],
    ) -> CoreResult<Option<Vec<i64>>>;

    /// Returns reserved units to availability; keys the node does not hold
    /// are skipped.
    fn cancel_reservations(&self, xid: Xid, quantities: &HashMap<ItemKey, u32>) -> CoreResult<bool>;

    /// Forwards a commit notification.
    fn commit(&self, xid: Xid) -> CoreResult<()>;

    /// Forwards an abort notification.
    fn abort(&self, xid: Xid) -> CoreResult<()>;
}

impl NodeClient for ResourceNode {
    fn node_name(&self) -> &str {
        self.name()
    }

    fn add_item(&self, xid: Xid, key: ItemKey, count: u32, price: i64) -> CoreResult<bool> {
        Ok(ResourceNode::add_item(self, xid, key, count, price))
    }

    fn delete_item(&self, xid: Xid, key: &ItemKey) -> CoreResult<bool> {
        Ok(ResourceNode::delete_item(self, xid, key))
    }

    fn query_count(&self, xid: Xid, key: &ItemKey) -> CoreResult<u32> {
        Ok(ResourceNode::query_count(self, xid, key))
    }

    fn query_price(&self, xid: Xid, key: &ItemKey) -> CoreResult<Option<i64>> {
        Ok(ResourceNode::query_price(self, xid, key))
    }

    fn reserve(&self, xid: Xid, customer: CustomerId, key: &ItemKey) -> CoreResult<Option<i64>> {
        Ok(ResourceNode::reserve(self, xid, customer, key))
    }

    fn check_flight_list(&self, xid: Xid, flights: &[u32]) -> CoreResult<bool> {
        Ok(ResourceNode::check_flight_list(self, xid, flights))
    }

    fn reserve_flight_list(
        &self,
        xid: Xid,
        customer: CustomerId,
        flights: &[u32],
    ) -> CoreResult<Option<Vec<i64>>> {
        Ok(ResourceNode::reserve_flight_list(self, xid, customer, flights))
    }

    fn cancel_reservations(&self, xid: Xid, quantities: &HashMap<ItemKey, u32>) -> CoreResult<bool> {
        Ok(ResourceNode::cancel_reservations(self, xid, quantities))
    }

    fn commit(&self, xid: Xid) -> CoreResult<()> {
        ResourceNode::commit(self, xid);
        Ok(())
    }

    fn abort(&self, xid: Xid) -> CoreResult<()> {
        ResourceNode::abort(self, xid);
        Ok(())
    }
}

/// Adapts a [`NodeClient`] into a transaction [`Participant`] so the
/// transaction manager can fan commit/abort out through the same channel the
/// data plane uses.
pub struct ClientParticipant {
    client: Arc<dyn NodeClient>,
}

impl ClientParticipant {
    /// Wraps a node client.
    #[must_use]
    pub fn new(client: Arc<dyn NodeClient>) -> Self {
        Self { client }
    }
}

impl Participant for ClientParticipant {
    fn participant_name(&self) -> &str {
        self.client.node_name()
    }

    fn commit(&self, xid: Xid) -> CoreResult<()> {
        self.client.commit(xid)
    }

    fn abort(&self, xid: Xid) -> CoreResult<()> {
        self.client.abort(xid)
    }
}

/// A node client for tests: an in-process node with scriptable misbehavior.
///
/// Can be made unreachable (every call fails with a communication error) or
/// slow (every call sleeps first, to exercise response timeouts).
pub struct MockClient {
    node: ResourceNode,
    unreachable: AtomicBool,
    fail_reserves: AtomicBool,
    delay: parking_lot::Mutex<Option<Duration>>,
}

impl MockClient {
    /// Creates a mock client backed by a fresh node with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            node: ResourceNode::new(name),
            unreachable: AtomicBool::new(false),
            fail_reserves: AtomicBool::new(false),
            delay: parking_lot::Mutex::new(None),
        }
    }

    /// Returns the backing node.
    #[must_use]
    pub fn node(&self) -> &ResourceNode {
        &self.node
    }

    /// Makes every subsequent call fail with a communication error.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Makes every subsequent call sleep before executing.
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Makes reservation calls (and only those) fail with a communication
    /// error, leaving queries and cancellations working.
    pub fn set_fail_reserves(&self, fail: bool) {
        self.fail_reserves.store(fail, Ordering::SeqCst);
    }

    fn reserve_gate(&self) -> CoreResult<()> {
        if self.fail_reserves.load(Ordering::SeqCst) {
            return Err(CoreError::communication(self.node.name(), "reserve dropped"));
        }
        Ok(())
    }

    fn gate(&self) -> CoreResult<()> {
        if let Some(delay) = *self.delay.lock() {
            std::thread::sleep(delay);
        }
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(CoreError::communication(self.node.name(), "unreachable"));
        }
        Ok(())
    }
}

impl NodeClient for MockClient {
    fn node_name(&self) -> &str {
        self.node.name()
    }

    fn add_item(&self, xid: Xid, key: ItemKey, count: u32, price: i64) -> CoreResult<bool> {
        self.gate()?;
        self.node.add_item(xid, key, count, price);
        Ok(true)
    }

    fn delete_item(&self, xid: Xid, key: &ItemKey) -> CoreResult<bool> {
        self.gate()?;
        Ok(self.node.delete_item(xid, key))
    }

    fn query_count(&self, xid: Xid, key: &ItemKey) -> CoreResult<u32> {
        self.gate()?;
        Ok(self.node.query_count(xid, key))
    }

    fn query_price(&self, xid: Xid, key: &ItemKey) -> CoreResult<Option<i64>> {
        self.gate()?;
        Ok(self.node.query_price(xid, key))
    }

    fn reserve(&self, xid: Xid, customer: CustomerId, key: &ItemKey) -> CoreResult<Option<i64>> {
        self.gate()?;
        self.reserve_gate()?;
        Ok(self.node.reserve(xid, customer, key))
    }

    fn check_flight_list(&self, xid: Xid, flights: &[u32]) -> CoreResult<bool> {
        self.gate()?;
        Ok(self.node.check_flight_list(xid, flights))
    }

    fn reserve_flight_list(
        &self,
        xid: Xid,
        customer: CustomerId,
        flights: &[u32],
    ) -> CoreResult<Option<Vec<i64>>> {
        self.gate()?;
        self.reserve_gate()?;
        Ok(self.node.reserve_flight_list(xid, customer, flights))
    }

    fn cancel_reservations(&self, xid: Xid, quantities: &HashMap<ItemKey, u32>) -> CoreResult<bool> {
        self.gate()?;
        Ok(self.node.cancel_reservations(xid, quantities))
    }

    fn commit(&self, xid: Xid) -> CoreResult<()> {
        self.gate()?;
        ResourceNode::commit(&self.node, xid);
        Ok(())
    }

    fn abort(&self, xid: Xid) -> CoreResult<()> {
        self.gate()?;
        ResourceNode::abort(&self.node, xid);
        Ok(())
    }
}
