use super::{Fill, OrderId, OrderInfo, OrderKind, OrderStatus, PlaceOrder, TransactionId};
use calendar_instrument::{InstrumentId, OrderAction};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Stage of the order lifecycle an [`OrderRecord`] was written at.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    /// Placement acknowledged with an order id.
    RequestSent,
    /// Fulfilment observed on the order push channel.
    WebsocketFulfilled,
    /// Authoritative post-mortem state.
    Final,
}

impl Display for AuditStage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AuditStage::RequestSent => "request_sent",
                AuditStage::WebsocketFulfilled => "websocket_fulfilled",
                AuditStage::Final => "final",
            }
        )
    }
}

/// Persisted lifecycle of one exchange order, upserted by `order_id`.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct OrderRecord {
    pub order_id: OrderId,
    pub transaction_id: Option<TransactionId>,
    pub instrument: InstrumentId,
    pub action: OrderAction,
    pub kind: OrderKind,
    pub status: OrderStatus,
    pub size: Decimal,
    pub filled: Decimal,
    pub price: Decimal,
    pub price_avg: Decimal,
    pub fee: Decimal,
    pub comment: AuditStage,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Record written as soon as placement returns an order id.
    pub fn request_sent(
        order_id: OrderId,
        transaction_id: Option<TransactionId>,
        request: &PlaceOrder,
    ) -> Self {
        Self {
            order_id,
            transaction_id,
            instrument: request.instrument.clone(),
            action: request.action,
            kind: request.kind,
            status: OrderStatus::Pending,
            size: Decimal::from(request.volume),
            filled: Decimal::ZERO,
            price: request.price,
            price_avg: Decimal::ZERO,
            fee: Decimal::ZERO,
            comment: AuditStage::RequestSent,
            updated_at: Utc::now(),
        }
    }

    /// Same order advanced to a new status and fill at `stage`.
    pub fn advance(&self, status: OrderStatus, fill: &Fill, stage: AuditStage) -> Self {
        Self {
            status,
            size: fill.size,
            filled: fill.filled,
            price: fill.price,
            price_avg: fill.price_avg,
            fee: fill.fee,
            comment: stage,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Final record from the authoritative [`OrderInfo`].
    pub fn finalise(&self, info: &OrderInfo) -> Self {
        Self {
            kind: info.kind,
            ..self.advance(info.status, &info.fill(), AuditStage::Final)
        }
    }
}
