#![forbid(unsafe_code)]

//! Low-level plumbing shared by the calendar arbitrage crates.
//!
//! - [`settlement::Settlement`]: single-assignment, idempotent result cell with a bounded
//!   wait. Every cross-task wait point (order fulfilment, convergence) is built on it.
//! - [`protocol::websocket`]: WebSocket type aliases and connect helpers.
//! - [`protocol::stream`]: persistent connection loop with heartbeat and full
//!   reconnect-and-resubscribe on failure.
//! - [`error::SocketError`]: transport level failures.

/// Transport [`SocketError`](error::SocketError).
pub mod error;

/// WebSocket protocol helpers and the persistent connection loop.
pub mod protocol;

/// Single-assignment [`Settlement`](settlement::Settlement) cell.
pub mod settlement;

pub use settlement::{Settlement, Wait};
