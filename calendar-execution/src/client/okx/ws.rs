//! OKX v5 WebSocket sessions.
//!
//! OKX serves public and private channels from separate endpoints, so market depth and
//! order updates each run on their own [`PersistentConnection`](calendar_integration::protocol::stream::PersistentConnection):
//!
//! - [`OkxSession::public`]: subscribes `books5` for every instrument, routes depth to the
//!   [`BookListener`].
//! - [`OkxSession::private`]: logs in, subscribes `orders` for all futures, routes order
//!   updates to the [`OrderListener`].
//!
//! A push on any other channel, or an order state outside the known set, is fatal to the
//! connection.

use super::{model::OkxOrder, signing::OkxCredentials};
use crate::{dispatch::OrderListener, error::ProtocolError};
use async_trait::async_trait;
use calendar_data::{
    dispatch::BookListener,
    exchange::okx::{
        OkxBook, OkxEvent, OkxFrame, books5_subscription, channel::OkxChannel, message::OkxArg,
        route_books5,
    },
};
use calendar_instrument::InstrumentId;
use calendar_integration::{
    error::SocketError,
    protocol::{
        stream::Session,
        websocket::{WebSocket, WsMessage, frame_text},
    },
};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};
use url::Url;

/// Private WebSocket endpoint.
pub const OKX_WS_PRIVATE: &str = "wss://ws.okx.com:8443/ws/v5/private";

/// Simulated trading private WebSocket endpoint.
pub const OKX_WS_PRIVATE_DEMO: &str = "wss://wspap.okx.com:8443/ws/v5/private";

/// Maximum wait for a `login` or `subscribe` acknowledgement.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum Channels {
    Public {
        instruments: Vec<InstrumentId>,
        books: Arc<BookListener>,
    },
    Private {
        credentials: OkxCredentials,
        orders: Arc<OrderListener>,
    },
}

/// [`Session`] for one OKX WebSocket endpoint.
#[derive(Debug)]
pub struct OkxSession {
    name: &'static str,
    url: Url,
    channels: Channels,
}

impl OkxSession {
    pub fn public(
        url: &str,
        instruments: Vec<InstrumentId>,
        books: Arc<BookListener>,
    ) -> Result<Self, SocketError> {
        Ok(Self {
            name: "okx_public",
            url: Url::parse(url)?,
            channels: Channels::Public { instruments, books },
        })
    }

    pub fn private(
        url: &str,
        credentials: OkxCredentials,
        orders: Arc<OrderListener>,
    ) -> Result<Self, SocketError> {
        Ok(Self {
            name: "okx_private",
            url: Url::parse(url)?,
            channels: Channels::Private {
                credentials,
                orders,
            },
        })
    }

    fn subscription(&self) -> serde_json::Value {
        match &self.channels {
            Channels::Public { instruments, .. } => books5_subscription(instruments),
            Channels::Private { .. } => json!({
                "op": "subscribe",
                "args": [OkxArg::with_inst_type(OkxChannel::ORDERS, "FUTURES")],
            }),
        }
    }

    /// Read frames until an acknowledgement for `expected` arrives.
    ///
    /// Pushes received meanwhile are routed as usual.
    async fn await_event(
        &self,
        websocket: &mut WebSocket,
        expected: OkxEvent,
    ) -> Result<(), SocketError> {
        let rejected = |msg: String| match expected {
            OkxEvent::Login => SocketError::Login(msg),
            _ => SocketError::Subscribe(msg),
        };

        let deadline = tokio::time::Instant::now() + HANDSHAKE_TIMEOUT;
        loop {
            let message = tokio::time::timeout_at(deadline, websocket.next())
                .await
                .map_err(|_| rejected(format!("no {expected:?} acknowledgement")))?
                .ok_or_else(|| SocketError::Terminated("stream ended during handshake".into()))??;

            let Some(payload) = frame_text(&message)? else {
                continue;
            };
            let frame = decode(&payload)?;

            match frame.event {
                Some(event) if event == expected && frame.is_ok() => return Ok(()),
                Some(OkxEvent::Error) => {
                    return Err(rejected(format!(
                        "code {}: {}",
                        frame.code.unwrap_or_default(),
                        frame.msg.unwrap_or_default()
                    )));
                }
                Some(event) => debug!(session = self.name, ?event, "ignoring event during handshake"),
                None => self.route_frame(frame)?,
            }
        }
    }

    fn route_frame(&self, frame: OkxFrame) -> Result<(), SocketError> {
        if let Some(event) = frame.event {
            return match event {
                OkxEvent::Error => Err(SocketError::Protocol(format!(
                    "error event code {}: {}",
                    frame.code.unwrap_or_default(),
                    frame.msg.unwrap_or_default()
                ))),
                other => {
                    debug!(session = self.name, event = ?other, "OKX event");
                    Ok(())
                }
            };
        }

        let Some(channel) = frame.channel().map(str::to_string) else {
            warn!(session = self.name, ?frame, "OKX frame without event or arg");
            return Ok(());
        };

        match (&self.channels, channel.as_str()) {
            (Channels::Public { books, .. }, channel) if channel == OkxChannel::BOOKS5.0 => {
                let push = frame
                    .into_push::<OkxBook>()
                    .map_err(|error| decode_error("books5 push", error))?;
                route_books5(books, push).map_err(ProtocolError::from)?;
                Ok(())
            }
            (Channels::Private { orders, .. }, channel) if channel == OkxChannel::ORDERS.0 => {
                let push = frame
                    .into_push::<OkxOrder>()
                    .map_err(|error| decode_error("orders push", error))?;
                for order in push.data {
                    let update = order.into_update()?;
                    debug!(
                        order_id = %update.order_id,
                        instrument = %update.instrument,
                        status = %update.status,
                        filled = %update.filled,
                        "OKX order update"
                    );
                    orders.on_update(update);
                }
                Ok(())
            }
            _ => Err(ProtocolError::UnknownChannel(channel.clone()).into()),
        }
    }
}

fn decode(payload: &str) -> Result<OkxFrame, SocketError> {
    serde_json::from_str(payload).map_err(|error| SocketError::Deserialise {
        error,
        payload: payload.to_string(),
    })
}

fn decode_error(context: &'static str, error: serde_json::Error) -> ProtocolError {
    ProtocolError::Decode {
        context,
        error: error.to_string(),
    }
}

#[async_trait]
impl Session for OkxSession {
    fn name(&self) -> &str {
        self.name
    }

    fn url(&self) -> &Url {
        &self.url
    }

    async fn handshake(&self, websocket: &mut WebSocket) -> Result<(), SocketError> {
        if let Channels::Private { credentials, .. } = &self.channels {
            let login = credentials
                .login_request(Utc::now())
                .map_err(|error| SocketError::Login(error.to_string()))?;
            websocket.send(WsMessage::text(login.to_string())).await?;
            self.await_event(websocket, OkxEvent::Login).await?;
            info!(session = self.name, "OKX login accepted");
        }

        websocket
            .send(WsMessage::text(self.subscription().to_string()))
            .await?;
        self.await_event(websocket, OkxEvent::Subscribe).await
    }

    fn route(&self, payload: &str) -> Result<(), SocketError> {
        let frame = match decode(payload) {
            Ok(frame) => frame,
            Err(error) => {
                error!(session = self.name, ?error, "undecodable OKX payload");
                return Err(error);
            }
        };
        self.route_frame(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::OrderResponder,
        order::{Fill, OrderId},
    };
    use calendar_data::{books::MarketDepth, dispatch::DepthResponder};
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    #[derive(Default)]
    struct Depths(Mutex<Vec<MarketDepth>>);

    impl DepthResponder for Depths {
        fn tick(&self, _: &InstrumentId, depth: &MarketDepth) {
            self.0.lock().push(depth.clone());
        }
    }

    #[derive(Default)]
    struct Fills(Mutex<Vec<(OrderId, Decimal)>>);

    impl OrderResponder for Fills {
        fn pending(&self, _: OrderId) {}

        fn cancelled(&self, _: OrderId, _: Decimal) {}

        fn partially_filled(&self, _: OrderId, _: Decimal, _: Decimal, _: Decimal) {}

        fn fulfilled(&self, order_id: OrderId, fill: Fill) {
            self.0.lock().push((order_id, fill.filled));
        }
    }

    fn public_session(books: Arc<BookListener>) -> OkxSession {
        OkxSession::public(
            "wss://ws.okx.com:8443/ws/v5/public",
            vec!["BTC-USD-250131".into()],
            books,
        )
        .unwrap()
    }

    fn private_session(orders: Arc<OrderListener>) -> OkxSession {
        OkxSession::private(
            OKX_WS_PRIVATE,
            OkxCredentials::new("key", "secret", "pass"),
            orders,
        )
        .unwrap()
    }

    #[test]
    fn test_private_subscription() {
        let session = private_session(Arc::new(OrderListener::new()));
        assert_eq!(
            session.subscription(),
            json!({
                "op": "subscribe",
                "args": [{ "channel": "orders", "instType": "FUTURES" }]
            })
        );
    }

    #[test]
    fn test_public_routes_books5() {
        let books = Arc::new(BookListener::new());
        let depths = Arc::new(Depths::default());
        books.subscribe("BTC-USD-250131".into(), depths.clone());
        let session = public_session(books);

        let payload = r#"{
            "arg": { "channel": "books5", "instId": "BTC-USD-250131" },
            "data": [{
                "asks": [["101", "3", "0", "1"]],
                "bids": [["100", "4", "0", "1"]],
                "instId": "BTC-USD-250131",
                "ts": "1597026383085"
            }]
        }"#;
        session.route(payload).unwrap();
        session.route(r#"{"event":"subscribe","arg":{"channel":"books5","instId":"BTC-USD-250131"}}"#).unwrap();

        let depths = depths.0.lock();
        assert_eq!(depths.len(), 1);
        assert_eq!(depths[0].best_ask().map(|level| level.price), Some(dec!(101)));
    }

    #[test]
    fn test_private_routes_orders() {
        let orders = Arc::new(OrderListener::new());
        let fills = Arc::new(Fills::default());
        orders.subscribe(OrderId(42), fills.clone());
        let session = private_session(orders.clone());

        let payload = r#"{
            "arg": { "channel": "orders", "instType": "FUTURES", "uid": "77" },
            "data": [
                {
                    "instId": "BTC-USD-250131", "ordId": "42", "ordType": "limit",
                    "state": "filled", "sz": "2", "accFillSz": "2", "px": "100",
                    "avgPx": "100", "fee": "-0.01", "uTime": "1597026383085"
                },
                {
                    "instId": "BTC-USD-250131", "ordId": "43", "ordType": "limit",
                    "state": "live", "sz": "1", "accFillSz": "0", "px": "99",
                    "avgPx": "", "fee": "0", "uTime": "1597026383086"
                }
            ]
        }"#;
        session.route(payload).unwrap();

        assert_eq!(fills.0.lock().as_slice(), &[(OrderId(42), dec!(2))]);
        assert_eq!(orders.buffered(OrderId(43)), 1);
    }

    #[test]
    fn test_unknown_channel_is_fatal() {
        let session = public_session(Arc::new(BookListener::new()));
        let payload = r#"{"arg":{"channel":"tickers","instId":"BTC-USD-250131"},"data":[]}"#;
        assert!(matches!(session.route(payload), Err(SocketError::Protocol(msg)) if msg.contains("tickers")));

        // orders pushed to a public session are equally unexpected
        let payload = r#"{"arg":{"channel":"orders","instType":"FUTURES"},"data":[]}"#;
        assert!(session.route(payload).is_err());
    }

    #[test]
    fn test_unknown_order_state_is_fatal() {
        let session = private_session(Arc::new(OrderListener::new()));
        let payload = r#"{
            "arg": { "channel": "orders", "instType": "FUTURES" },
            "data": [{
                "instId": "A", "ordId": "1", "state": "teleported",
                "sz": "1", "uTime": "1597026383085"
            }]
        }"#;
        assert!(matches!(session.route(payload), Err(SocketError::Protocol(msg)) if msg.contains("teleported")));
    }

    #[test]
    fn test_error_event_is_fatal() {
        let session = public_session(Arc::new(BookListener::new()));
        assert!(session.route(r#"{"event":"error","code":"60012","msg":"Invalid request"}"#).is_err());
        assert!(session.route("not json").is_err());
    }
}
