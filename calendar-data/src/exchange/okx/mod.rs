//! OKX v5 WebSocket market data.
//!
//! Every push frame carries the `arg` it was subscribed with and a `data` array. Control
//! frames (`login`, `subscribe`, `error`) carry an `event` instead.
//!
//! See docs: <https://www.okx.com/docs-v5/en/#overview-websocket>

use self::channel::OkxChannel;
use crate::{books::MarketDepth, dispatch::BookListener, error::DataError};
use calendar_instrument::InstrumentId;
use serde_json::json;
use tracing::debug;

/// [`OkxChannel`] names.
pub mod channel;

/// Push and event frame envelopes.
pub mod message;

/// `books5` depth payloads.
pub mod book;

pub use book::{OkxBook, OkxLevel};
pub use message::{OkxArg, OkxEvent, OkxFrame, OkxPush};

/// Public WebSocket endpoint.
pub const OKX_WS_PUBLIC: &str = "wss://ws.okx.com:8443/ws/v5/public";

/// Simulated trading public WebSocket endpoint.
pub const OKX_WS_PUBLIC_DEMO: &str = "wss://wspap.okx.com:8443/ws/v5/public";

/// Subscribe request for `books5` on every provided instrument.
pub fn books5_subscription<'a>(instruments: impl IntoIterator<Item = &'a InstrumentId>) -> serde_json::Value {
    let args = instruments
        .into_iter()
        .map(|instrument| OkxArg::new(OkxChannel::BOOKS5, Some(instrument.as_str())))
        .collect::<Vec<_>>();

    json!({ "op": "subscribe", "args": args })
}

/// Route one `books5` push to the [`BookListener`].
///
/// Returns the number of depth updates dispatched.
pub fn route_books5(listener: &BookListener, push: OkxPush<OkxBook>) -> Result<usize, DataError> {
    if push.arg.channel != OkxChannel::BOOKS5.0 {
        return Err(DataError::UnknownChannel(push.arg.channel));
    }

    let mut dispatched = 0;
    for book in push.data {
        let instrument = book
            .inst_id
            .as_deref()
            .or(push.arg.inst_id.as_deref())
            .map(InstrumentId::from)
            .ok_or(DataError::MissingField("instId"))?;

        let depth = MarketDepth::new(book.ts, book.asks, book.bids);
        debug!(%instrument, seq = ?book.seq_id, "books5 update");
        listener.dispatch(&instrument, &depth);
        dispatched += 1;
    }

    Ok(dispatched)
}
