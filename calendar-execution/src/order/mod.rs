use crate::error::ProtocolError;
use calendar_instrument::{InstrumentId, OrderAction};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// [`OrderId`](id::OrderId) and [`TransactionId`](id::TransactionId).
pub mod id;

/// Persisted [`OrderRecord`](record::OrderRecord) and its audit stages.
pub mod record;

pub use id::{OrderId, TransactionId};
pub use record::{AuditStage, OrderRecord};

/// Normalised order lifecycle status.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    PartiallyFilled,
    Fulfilled,
    Cancelled,
}

impl OrderStatus {
    /// Map an OKX `state` field.
    ///
    /// Unrecognised states are a protocol invariant violation.
    pub fn from_okx(state: &str) -> Result<Self, ProtocolError> {
        match state {
            "live" => Ok(Self::Pending),
            "partially_filled" => Ok(Self::PartiallyFilled),
            "filled" => Ok(Self::Fulfilled),
            "canceled" | "mmp_canceled" => Ok(Self::Cancelled),
            other => Err(ProtocolError::UnknownStatusCode(other.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fulfilled | Self::Cancelled)
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                OrderStatus::Pending => "pending",
                OrderStatus::PartiallyFilled => "partially_filled",
                OrderStatus::Fulfilled => "fulfilled",
                OrderStatus::Cancelled => "cancelled",
            }
        )
    }
}

/// Order type.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Limit,
    Market,
}

/// Placement request.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize, Constructor)]
pub struct PlaceOrder {
    pub instrument: InstrumentId,
    pub action: OrderAction,
    /// Number of contracts.
    pub volume: u32,
    /// Limit price. Ignored for market orders.
    pub price: Decimal,
    pub leverage: Decimal,
    pub kind: OrderKind,
}

impl PlaceOrder {
    pub fn is_market(&self) -> bool {
        self.kind == OrderKind::Market
    }
}

/// Fill details reported when an order is fulfilled.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct Fill {
    pub size: Decimal,
    pub filled: Decimal,
    pub fee: Decimal,
    pub price: Decimal,
    pub price_avg: Decimal,
}

/// Order status push event.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct OrderUpdate {
    pub order_id: OrderId,
    pub instrument: InstrumentId,
    pub status: OrderStatus,
    pub size: Decimal,
    pub filled: Decimal,
    pub price: Decimal,
    pub price_avg: Decimal,
    pub fee: Decimal,
    pub time: DateTime<Utc>,
}

impl OrderUpdate {
    pub fn fill(&self) -> Fill {
        Fill {
            size: self.size,
            filled: self.filled,
            fee: self.fee,
            price: self.price,
            price_avg: self.price_avg,
        }
    }
}

/// Authoritative order state fetched over REST.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct OrderInfo {
    pub order_id: OrderId,
    pub instrument: InstrumentId,
    pub status: OrderStatus,
    pub kind: OrderKind,
    pub size: Decimal,
    pub filled: Decimal,
    pub price: Decimal,
    pub price_avg: Decimal,
    pub fee: Decimal,
    pub time: DateTime<Utc>,
}

impl OrderInfo {
    pub fn fill(&self) -> Fill {
        Fill {
            size: self.size,
            filled: self.filled,
            fee: self.fee,
            price: self.price,
            price_avg: self.price_avg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_from_okx() {
        assert_eq!(OrderStatus::from_okx("live").unwrap(), OrderStatus::Pending);
        assert_eq!(
            OrderStatus::from_okx("partially_filled").unwrap(),
            OrderStatus::PartiallyFilled
        );
        assert_eq!(OrderStatus::from_okx("filled").unwrap(), OrderStatus::Fulfilled);
        assert_eq!(OrderStatus::from_okx("mmp_canceled").unwrap(), OrderStatus::Cancelled);
        assert!(matches!(
            OrderStatus::from_okx("exploded"),
            Err(ProtocolError::UnknownStatusCode(state)) if state == "exploded"
        ));
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Fulfilled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }
}
