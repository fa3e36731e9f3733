//! Scripted in-process exchange.
//!
//! [`MockExchange`] implements [`ExchangeClient`] and pushes order events straight into an
//! [`OrderListener`], the way the private order channel would. Each placement consumes the
//! next [`MockBehaviour`] scripted for its `(instrument, action)`, defaulting to an immediate
//! fill. Every call is recorded for assertions.

use super::ExchangeClient;
use crate::{
    dispatch::OrderListener,
    error::ClientError,
    order::{OrderId, OrderInfo, OrderStatus, OrderUpdate, PlaceOrder},
};
use async_trait::async_trait;
use calendar_instrument::{InstrumentId, OrderAction};
use chrono::Utc;
use fnv::FnvHashMap;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{collections::VecDeque, sync::Arc, time::Duration};
use tracing::debug;

/// How the mock exchange treats one placement.
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehaviour {
    /// Fill fully, pushing the fulfilment before `place` returns.
    Fill,
    /// Fill fully after a delay.
    FillAfter(Duration),
    /// Rest on the book until cancelled.
    Rest,
    /// Fill the given volume, then rest until cancelled.
    PartialFill(Decimal),
    /// Cancel exchange side immediately.
    Cancel,
    /// Reject the placement.
    Reject(ClientError),
}

#[derive(Debug, Clone)]
struct MockOrder {
    request: PlaceOrder,
    status: OrderStatus,
    filled: Decimal,
}

#[derive(Debug, Default)]
struct MockState {
    next_order_id: u64,
    scripts: FnvHashMap<(InstrumentId, OrderAction), VecDeque<MockBehaviour>>,
    orders: FnvHashMap<OrderId, MockOrder>,
    placements: Vec<PlaceOrder>,
    cancels: Vec<(InstrumentId, OrderId)>,
    info_requests: Vec<OrderId>,
}

/// Scripted [`ExchangeClient`] pushing order events into an [`OrderListener`].
#[derive(Debug)]
pub struct MockExchange {
    listener: Arc<OrderListener>,
    fee_rate: Decimal,
    cancel_latency: Duration,
    state: Arc<Mutex<MockState>>,
}

impl MockExchange {
    pub fn new(listener: Arc<OrderListener>) -> Self {
        Self {
            listener,
            fee_rate: Decimal::ZERO,
            cancel_latency: Duration::ZERO,
            state: Arc::new(Mutex::new(MockState {
                next_order_id: 1,
                ..MockState::default()
            })),
        }
    }

    /// Charge `fee_rate` of the filled price times volume on every fill.
    pub fn with_fee_rate(mut self, fee_rate: Decimal) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    /// Delay between a cancel request being sent and the exchange acting on it.
    pub fn with_cancel_latency(mut self, cancel_latency: Duration) -> Self {
        self.cancel_latency = cancel_latency;
        self
    }

    /// Queue a behaviour for the next placement of `action` on `instrument`.
    pub fn script(&self, instrument: impl Into<InstrumentId>, action: OrderAction, behaviour: MockBehaviour) {
        self.state
            .lock()
            .scripts
            .entry((instrument.into(), action))
            .or_default()
            .push_back(behaviour);
    }

    /// Every accepted or rejected placement request, in call order.
    pub fn placements(&self) -> Vec<PlaceOrder> {
        self.state.lock().placements.clone()
    }

    pub fn placements_of(&self, action: OrderAction) -> Vec<PlaceOrder> {
        self.placements()
            .into_iter()
            .filter(|request| request.action == action)
            .collect()
    }

    /// Every cancel request, in call order.
    pub fn cancels(&self) -> Vec<(InstrumentId, OrderId)> {
        self.state.lock().cancels.clone()
    }

    pub fn info_requests(&self) -> Vec<OrderId> {
        self.state.lock().info_requests.clone()
    }

    fn update(&self, order_id: OrderId, order: &MockOrder) -> OrderUpdate {
        let price_avg = if order.filled.is_zero() {
            Decimal::ZERO
        } else {
            order.request.price
        };
        OrderUpdate {
            order_id,
            instrument: order.request.instrument.clone(),
            status: order.status,
            size: Decimal::from(order.request.volume),
            filled: order.filled,
            price: order.request.price,
            price_avg,
            fee: -(self.fee_rate * order.filled * order.request.price),
            time: Utc::now(),
        }
    }

    /// Transition an order and push the resulting event.
    fn transition(&self, order_id: OrderId, status: OrderStatus, filled: Decimal) {
        let update = {
            let mut state = self.state.lock();
            let Some(order) = state.orders.get_mut(&order_id) else {
                return;
            };
            if order.status.is_terminal() {
                return;
            }
            order.status = status;
            order.filled = filled;
            let order = order.clone();
            self.update(order_id, &order)
        };
        debug!(%order_id, status = %update.status, "mock exchange pushing order event");
        self.listener.on_update(update);
    }
}

impl Clone for MockExchange {
    fn clone(&self) -> Self {
        Self {
            listener: Arc::clone(&self.listener),
            fee_rate: self.fee_rate,
            cancel_latency: self.cancel_latency,
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl ExchangeClient for MockExchange {
    async fn place(&self, request: &PlaceOrder) -> Result<OrderId, ClientError> {
        let (order_id, behaviour) = {
            let mut state = self.state.lock();
            state.placements.push(request.clone());

            let behaviour = state
                .scripts
                .get_mut(&(request.instrument.clone(), request.action))
                .and_then(VecDeque::pop_front)
                .unwrap_or(MockBehaviour::Fill);

            if let MockBehaviour::Reject(error) = behaviour {
                return Err(error);
            }

            let order_id = OrderId(state.next_order_id);
            state.next_order_id += 1;
            state.orders.insert(
                order_id,
                MockOrder {
                    request: request.clone(),
                    status: OrderStatus::Pending,
                    filled: Decimal::ZERO,
                },
            );
            (order_id, behaviour)
        };

        let volume = Decimal::from(request.volume);
        match behaviour {
            MockBehaviour::Fill => self.transition(order_id, OrderStatus::Fulfilled, volume),
            MockBehaviour::FillAfter(delay) => {
                let exchange = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    exchange.transition(order_id, OrderStatus::Fulfilled, volume);
                });
            }
            MockBehaviour::Rest => self.transition(order_id, OrderStatus::Pending, Decimal::ZERO),
            MockBehaviour::PartialFill(filled) => {
                self.transition(order_id, OrderStatus::PartiallyFilled, filled)
            }
            MockBehaviour::Cancel => self.transition(order_id, OrderStatus::Cancelled, Decimal::ZERO),
            MockBehaviour::Reject(_) => {}
        }

        Ok(order_id)
    }

    async fn order_info(
        &self,
        _: &InstrumentId,
        order_id: OrderId,
    ) -> Result<OrderInfo, ClientError> {
        let mut state = self.state.lock();
        state.info_requests.push(order_id);

        let order = state
            .orders
            .get(&order_id)
            .cloned()
            .ok_or_else(|| ClientError::api("51603", "Order does not exist"))?;
        let update = self.update(order_id, &order);

        Ok(OrderInfo {
            order_id,
            instrument: update.instrument,
            status: update.status,
            kind: order.request.kind,
            size: update.size,
            filled: update.filled,
            price: update.price,
            price_avg: update.price_avg,
            fee: update.fee,
            time: update.time,
        })
    }

    async fn cancel(&self, instrument: &InstrumentId, order_id: OrderId) -> Result<(), ClientError> {
        self.state.lock().cancels.push((instrument.clone(), order_id));
        if !self.cancel_latency.is_zero() {
            tokio::time::sleep(self.cancel_latency).await;
        }

        let filled = {
            let state = self.state.lock();
            match state.orders.get(&order_id) {
                None => return Err(ClientError::api("51400", "Order does not exist")),
                Some(order) if order.status == OrderStatus::Fulfilled => {
                    return Err(ClientError::api("51402", "Order has been completed"));
                }
                Some(order) if order.status == OrderStatus::Cancelled => {
                    return Err(ClientError::api("51401", "Order has been cancelled"));
                }
                Some(order) => order.filled,
            }
        };

        self.transition(order_id, OrderStatus::Cancelled, filled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderKind;
    use rust_decimal_macros::dec;

    fn request(action: OrderAction) -> PlaceOrder {
        PlaceOrder::new("A".into(), action, 3, dec!(100), dec!(10), OrderKind::Limit)
    }

    #[tokio::test]
    async fn test_fill_is_buffered_before_subscribe() {
        let listener = Arc::new(OrderListener::new());
        let exchange = MockExchange::new(listener.clone());

        let order_id = exchange.place(&request(OrderAction::OpenLong)).await.unwrap();
        assert_eq!(order_id, OrderId(1));
        assert_eq!(listener.buffered(order_id), 1);

        let info = exchange.order_info(&"A".into(), order_id).await.unwrap();
        assert_eq!(info.status, OrderStatus::Fulfilled);
        assert_eq!(info.filled, dec!(3));
    }

    #[tokio::test]
    async fn test_reject_and_cancel_codes() {
        let listener = Arc::new(OrderListener::new());
        let exchange = MockExchange::new(listener);
        exchange.script(
            "A",
            OrderAction::OpenShort,
            MockBehaviour::Reject(ClientError::api("51008", "insufficient margin")),
        );
        exchange.script("A", OrderAction::OpenLong, MockBehaviour::Rest);

        let rejected = exchange.place(&request(OrderAction::OpenShort)).await;
        assert!(rejected.unwrap_err().is_margin_not_enough());

        let resting = exchange.place(&request(OrderAction::OpenLong)).await.unwrap();
        assert!(exchange.cancel(&"A".into(), resting).await.is_ok());
        let second = exchange.cancel(&"A".into(), resting).await.unwrap_err();
        assert!(second.is_order_not_live());
        assert_eq!(exchange.cancels().len(), 2);
        assert_eq!(exchange.placements().len(), 2);
    }
}
