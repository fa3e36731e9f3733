#![forbid(unsafe_code)]

//! Market data for cross-expiry futures arbitrage.
//!
//! - [`books`]: sorted [`MarketDepth`](books::MarketDepth) per instrument and matched
//!   volume walking across two books.
//! - [`depth`]: the rolling [`DepthTable`](depth::DepthTable) deriving every pairwise spread,
//!   its rolling mean and standard score, and per-instrument price speed.
//! - [`dispatch`]: depth pub/sub keyed by instrument id.
//! - [`exchange::okx`]: OKX v5 public `books5` wire messages.

/// Data errors.
pub mod error;

/// Order book levels, [`MarketDepth`](books::MarketDepth) and matched volume.
pub mod books;

/// Rolling spread model.
pub mod depth;

/// Depth pub/sub.
pub mod dispatch;

/// Exchange wire formats.
pub mod exchange;
