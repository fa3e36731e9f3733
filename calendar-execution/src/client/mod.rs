use crate::{
    error::ClientError,
    order::{OrderId, OrderInfo, PlaceOrder},
};
use async_trait::async_trait;
use calendar_instrument::InstrumentId;

/// Scripted [`ExchangeClient`] for tests and dry runs.
pub mod mock;

/// OKX v5 REST and WebSocket clients.
pub mod okx;

/// Exchange REST operations consumed by the
/// [`OrderExecutor`](crate::executor::OrderExecutor).
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// Place an order, returning the exchange assigned [`OrderId`].
    async fn place(&self, request: &PlaceOrder) -> Result<OrderId, ClientError>;

    /// Fetch the authoritative state of an order.
    async fn order_info(
        &self,
        instrument: &InstrumentId,
        order_id: OrderId,
    ) -> Result<OrderInfo, ClientError>;

    /// Request cancellation of a live order.
    ///
    /// An order that already left the book is reported as a [`ClientError::Api`] with a code
    /// for which [`ClientError::is_order_not_live`] holds.
    async fn cancel(&self, instrument: &InstrumentId, order_id: OrderId) -> Result<(), ClientError>;
}
