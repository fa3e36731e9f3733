//! OKX v5 execution client.
//!
//! - [`http::OkxHttpClient`]: signed REST placement, order query and cancel, implementing
//!   [`ExchangeClient`](crate::client::ExchangeClient).
//! - [`ws::OkxSession`]: public `books5` and private `orders` WebSocket sessions feeding the
//!   depth and order listeners.
//!
//! Frames are plain text JSON. No decompression is needed on the v5 API.

pub mod http;
pub mod model;
pub mod signing;
pub mod ws;

pub use http::{OkxHttpClient, OkxHttpConfig};
pub use signing::OkxCredentials;
pub use ws::{OKX_WS_PRIVATE, OKX_WS_PRIVATE_DEMO, OkxSession};
