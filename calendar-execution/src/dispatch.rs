//! Order status pub/sub.
//!
//! A placement response and the first order push can race: the push may arrive before the
//! caller has subscribed to the order id it has only just learned. Events for an order id
//! with no subscriber are therefore held in a per-id buffer, and [`OrderListener::subscribe`]
//! drains that buffer to the new responder in arrival order before any later event can be
//! dispatched.
//!
//! The buffer is bounded by a number of distinct order ids ([`DEFAULT_BUFFER_CAPACITY`] unless
//! set with [`OrderListener::with_buffer_capacity`]). Once full, the id buffered longest ago
//! is evicted with its events and a `warn!`, and a later subscriber to that id observes none
//! of them. Ids are only left unclaimed by orders no executor placed (eg/ manual orders on
//! the same account), so a capacity well above the number of in-flight placements keeps
//! every event of the engine's own orders.
//!
//! Delivery happens while the registry lock is held, which is what makes replay and live
//! dispatch totally ordered. Responders must not call back into the [`OrderListener`].

use crate::order::{Fill, OrderId, OrderStatus, OrderUpdate};
use fnv::FnvHashMap;
use indexmap::IndexMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum number of distinct order ids held in the pending buffer.
pub const DEFAULT_BUFFER_CAPACITY: usize = 4_096;

/// Receives status callbacks for the orders it is subscribed to.
pub trait OrderResponder: Send + Sync {
    fn pending(&self, order_id: OrderId);

    fn cancelled(&self, order_id: OrderId, filled: Decimal);

    fn partially_filled(&self, order_id: OrderId, size: Decimal, filled: Decimal, price_avg: Decimal);

    fn fulfilled(&self, order_id: OrderId, fill: Fill);
}

#[derive(Default)]
struct Registry {
    subscribers: FnvHashMap<OrderId, Vec<Arc<dyn OrderResponder>>>,
    buffer: IndexMap<OrderId, Vec<OrderUpdate>>,
}

/// Routes [`OrderUpdate`]s to [`OrderResponder`]s keyed by order id.
pub struct OrderListener {
    registry: Mutex<Registry>,
    buffer_capacity: usize,
}

impl Default for OrderListener {
    fn default() -> Self {
        Self::with_buffer_capacity(DEFAULT_BUFFER_CAPACITY)
    }
}

impl std::fmt::Debug for OrderListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.registry.lock();
        f.debug_struct("OrderListener")
            .field("subscribed_orders", &registry.subscribers.len())
            .field("buffered_orders", &registry.buffer.len())
            .field("buffer_capacity", &self.buffer_capacity)
            .finish()
    }
}

fn same_responder(a: &Arc<dyn OrderResponder>, b: &Arc<dyn OrderResponder>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn deliver(responder: &dyn OrderResponder, update: &OrderUpdate) {
    match update.status {
        OrderStatus::Pending => responder.pending(update.order_id),
        OrderStatus::PartiallyFilled => responder.partially_filled(
            update.order_id,
            update.size,
            update.filled,
            update.price_avg,
        ),
        OrderStatus::Fulfilled => responder.fulfilled(update.order_id, update.fill()),
        OrderStatus::Cancelled => responder.cancelled(update.order_id, update.filled),
    }
}

impl OrderListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listener whose pending buffer holds events for at most `capacity` order ids, evicting
    /// the oldest id first.
    pub fn with_buffer_capacity(capacity: usize) -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            buffer_capacity: capacity.max(1),
        }
    }

    /// Subscribe `responder` to `order_id`, replaying and clearing any buffered events.
    pub fn subscribe(&self, order_id: OrderId, responder: Arc<dyn OrderResponder>) {
        let mut registry = self.registry.lock();

        if let Some(buffered) = registry.buffer.shift_remove(&order_id) {
            debug!(%order_id, events = buffered.len(), "replaying buffered order events");
            for update in &buffered {
                deliver(responder.as_ref(), update);
            }
        }

        let responders = registry.subscribers.entry(order_id).or_default();
        if !responders.iter().any(|existing| same_responder(existing, &responder)) {
            responders.push(responder);
        }
    }

    pub fn unsubscribe(&self, order_id: OrderId, responder: &Arc<dyn OrderResponder>) {
        let mut registry = self.registry.lock();
        if let Some(responders) = registry.subscribers.get_mut(&order_id) {
            responders.retain(|existing| !same_responder(existing, responder));
            if responders.is_empty() {
                registry.subscribers.remove(&order_id);
            }
        }
    }

    /// Dispatch one order event, buffering it if `order_id` has no subscriber yet.
    pub fn on_update(&self, update: OrderUpdate) {
        let mut registry = self.registry.lock();

        if let Some(responders) = registry.subscribers.get(&update.order_id) {
            for responder in responders {
                deliver(responder.as_ref(), &update);
            }
            return;
        }

        debug!(order_id = %update.order_id, status = %update.status, "buffering order event");
        registry
            .buffer
            .entry(update.order_id)
            .or_default()
            .push(update);

        if registry.buffer.len() > self.buffer_capacity {
            if let Some((evicted, events)) = registry.buffer.shift_remove_index(0) {
                warn!(order_id = %evicted, events = events.len(), "evicting unclaimed order events");
            }
        }
    }

    pub fn buffered(&self, order_id: OrderId) -> usize {
        self.registry
            .lock()
            .buffer
            .get(&order_id)
            .map_or(0, Vec::len)
    }

    pub fn subscriber_count(&self, order_id: OrderId) -> usize {
        self.registry
            .lock()
            .subscribers
            .get(&order_id)
            .map_or(0, Vec::len)
    }
}
