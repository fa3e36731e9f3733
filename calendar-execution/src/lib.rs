#![forbid(unsafe_code)]

//! Order execution for cross-expiry futures arbitrage.
//!
//! - [`order`]: order requests, status updates, fills and audit records.
//! - [`client`]: the [`ExchangeClient`](client::ExchangeClient) REST contract, its OKX v5
//!   implementation and WebSocket sessions, and a scripted mock exchange.
//! - [`dispatch`]: order status pub/sub with a pending buffer for events that arrive
//!   before their subscriber.
//! - [`executor`]: drives one order from placement to a terminal
//!   [`OrderOutcome`](executor::OrderOutcome).
//! - [`cooldown`]: self-clearing backoff after a margin rejection.
//! - [`audit`]: fire-and-forget persistence of order and transaction records.

/// Execution errors.
pub mod error;

/// Order model.
pub mod order;

/// Exchange clients.
pub mod client;

/// Order pub/sub.
pub mod dispatch;

/// Single order state machine.
pub mod executor;

/// Margin [`Cooldown`](cooldown::Cooldown).
pub mod cooldown;

/// Audit records, sink and stores.
pub mod audit;

pub use cooldown::Cooldown;
pub use dispatch::{OrderListener, OrderResponder};
pub use executor::{OrderExecutor, OrderFailure, OrderOutcome};
