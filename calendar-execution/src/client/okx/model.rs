use crate::{
    error::ProtocolError,
    order::{OrderId, OrderInfo, OrderKind, OrderStatus, OrderUpdate, PlaceOrder},
};
use calendar_data::exchange::okx::message::de_str_epoch_ms;
use calendar_instrument::{InstrumentId, OrderAction, PositionSide};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// REST response envelope. `code == "0"` is success.
#[derive(Debug, Clone, Deserialize)]
pub struct OkxResponse<T> {
    pub code: String,
    #[serde(default)]
    pub msg: String,
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

impl<T> OkxResponse<T> {
    pub fn is_ok(&self) -> bool {
        self.code == "0"
    }
}

/// `POST /api/v5/trade/order` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxPlaceRequest {
    pub inst_id: String,
    pub td_mode: &'static str,
    pub side: &'static str,
    pub pos_side: &'static str,
    pub ord_type: &'static str,
    pub sz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px: Option<String>,
}

impl From<&PlaceOrder> for OkxPlaceRequest {
    fn from(request: &PlaceOrder) -> Self {
        let (ord_type, px) = match request.kind {
            OrderKind::Limit => ("limit", Some(request.price.normalize().to_string())),
            OrderKind::Market => ("market", None),
        };

        Self {
            inst_id: request.instrument.to_string(),
            td_mode: "cross",
            side: side(request.action),
            pos_side: pos_side(request.action.position_side()),
            ord_type,
            sz: request.volume.to_string(),
            px,
        }
    }
}

fn side(action: OrderAction) -> &'static str {
    if action.is_buy() { "buy" } else { "sell" }
}

fn pos_side(side: PositionSide) -> &'static str {
    match side {
        PositionSide::Long => "long",
        PositionSide::Short => "short",
    }
}

/// Per-order result of a placement or cancel request.
///
/// `s_code` carries the order level error code when the envelope code is non-zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxOrderAck {
    #[serde(default)]
    pub ord_id: String,
    #[serde(default)]
    pub s_code: String,
    #[serde(default)]
    pub s_msg: String,
}

/// `POST /api/v5/trade/cancel-order` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxCancelRequest {
    pub inst_id: String,
    pub ord_id: String,
}

/// `POST /api/v5/account/set-leverage` body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxSetLeverage {
    pub inst_id: String,
    pub lever: String,
    pub mgn_mode: &'static str,
}

/// Order state, as returned by `GET /api/v5/trade/order` and pushed on the `orders` channel.
///
/// ### Raw Payload Examples
/// ```json
/// {
///     "instId": "BTC-USD-250131",
///     "ordId": "312269865356374016",
///     "ordType": "limit",
///     "state": "partially_filled",
///     "sz": "10",
///     "accFillSz": "4",
///     "px": "93012.5",
///     "avgPx": "93010",
///     "fee": "-0.0000002",
///     "uTime": "1597026383085"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxOrder {
    pub inst_id: String,
    pub ord_id: OrderId,
    #[serde(default)]
    pub ord_type: String,
    pub state: String,
    #[serde(deserialize_with = "de_decimal_or_zero")]
    pub sz: Decimal,
    #[serde(default, deserialize_with = "de_decimal_or_zero")]
    pub acc_fill_sz: Decimal,
    #[serde(default, deserialize_with = "de_decimal_or_zero")]
    pub px: Decimal,
    #[serde(default, deserialize_with = "de_decimal_or_zero")]
    pub avg_px: Decimal,
    #[serde(default, deserialize_with = "de_decimal_or_zero")]
    pub fee: Decimal,
    #[serde(deserialize_with = "de_str_epoch_ms")]
    pub u_time: DateTime<Utc>,
}

impl OkxOrder {
    fn kind(&self) -> OrderKind {
        match self.ord_type.as_str() {
            "market" | "optimal_limit_ioc" => OrderKind::Market,
            _ => OrderKind::Limit,
        }
    }

    pub fn into_update(self) -> Result<OrderUpdate, ProtocolError> {
        Ok(OrderUpdate {
            order_id: self.ord_id,
            status: OrderStatus::from_okx(&self.state)?,
            instrument: InstrumentId::from(self.inst_id),
            size: self.sz,
            filled: self.acc_fill_sz,
            price: self.px,
            price_avg: self.avg_px,
            fee: self.fee,
            time: self.u_time,
        })
    }

    pub fn into_info(self) -> Result<OrderInfo, ProtocolError> {
        let kind = self.kind();
        let update = self.into_update()?;
        Ok(OrderInfo {
            order_id: update.order_id,
            instrument: update.instrument,
            status: update.status,
            kind,
            size: update.size,
            filled: update.filled,
            price: update.price,
            price_avg: update.price_avg,
            fee: update.fee,
            time: update.time,
        })
    }
}

/// Futures contract metadata from `GET /api/v5/public/instruments?instType=FUTURES`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxInstrument {
    pub inst_id: String,
    pub uly: String,
    pub alias: String,
    #[serde(deserialize_with = "de_decimal_or_zero")]
    pub ct_val: Decimal,
    #[serde(deserialize_with = "de_str_epoch_ms")]
    pub exp_time: DateTime<Utc>,
    #[serde(default)]
    pub state: String,
}

/// OKX sends `""` for unset numeric fields, eg/ `px` on market orders.
fn de_decimal_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if raw.is_empty() {
        return Ok(Decimal::ZERO);
    }
    raw.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_place_request_from_action() {
        let limit = PlaceOrder::new(
            "BTC-USD-250131".into(),
            OrderAction::CloseShort,
            3,
            dec!(93012.50),
            dec!(10),
            OrderKind::Limit,
        );
        let body = serde_json::to_value(OkxPlaceRequest::from(&limit)).unwrap();
        assert_eq!(body["side"], "buy");
        assert_eq!(body["posSide"], "short");
        assert_eq!(body["ordType"], "limit");
        assert_eq!(body["tdMode"], "cross");
        assert_eq!(body["px"], "93012.5");
        assert_eq!(body["sz"], "3");

        let market = PlaceOrder { kind: OrderKind::Market, action: OrderAction::CloseLong, ..limit };
        let body = serde_json::to_value(OkxPlaceRequest::from(&market)).unwrap();
        assert_eq!(body["side"], "sell");
        assert_eq!(body["posSide"], "long");
        assert!(body.get("px").is_none());
    }

    #[test]
    fn test_de_okx_order() {
        let payload = r#"{
            "instId": "BTC-USD-250131",
            "ordId": "312269865356374016",
            "ordType": "market",
            "state": "filled",
            "sz": "10",
            "accFillSz": "10",
            "px": "",
            "avgPx": "93010",
            "fee": "-0.0000002",
            "uTime": "1597026383085"
        }"#;
        let order: OkxOrder = serde_json::from_str(payload).unwrap();
        let info = order.into_info().unwrap();

        assert_eq!(info.order_id, OrderId(312269865356374016));
        assert_eq!(info.status, OrderStatus::Fulfilled);
        assert_eq!(info.kind, OrderKind::Market);
        assert_eq!(info.price, Decimal::ZERO);
        assert_eq!(info.price_avg, dec!(93010));
        assert_eq!(info.fee, dec!(-0.0000002));
    }

    #[test]
    fn test_okx_order_unknown_state_is_fatal() {
        let payload = r#"{
            "instId": "A", "ordId": "1", "state": "teleported",
            "sz": "1", "uTime": "1597026383085"
        }"#;
        let order: OkxOrder = serde_json::from_str(payload).unwrap();
        assert!(matches!(
            order.into_update(),
            Err(ProtocolError::UnknownStatusCode(state)) if state == "teleported"
        ));
    }
}
