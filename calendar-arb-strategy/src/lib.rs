#![forbid(unsafe_code)]

//! Cross-Expiry Futures Arbitrage Strategy
//!
//! This crate watches the order book depth of several delivery futures on the same
//! underlying, detects transient dislocations of the spread between two of them, and trades
//! the dislocation with a paired long/short position that is closed once the spread
//! re-converges or a maximum wait elapses.
//!
//! # Architecture
//!
//! ```text
//! books5 ──> BookListener ──> ArbitrageEngine ──> DepthTable
//!                  │                 │
//!                  │                 └─> TriggerStrategy ──> ArbitragePlan ──> RiskGate
//!                  │                                                              │
//!                  └──── ConvergenceWatcher <── ArbitrageTransaction <────────────┘
//!                                                       │
//! orders ──> OrderListener ──> OrderExecutor <──────────┘
//! ```
//!
//! # Key Components
//!
//! - [`ArbitrageEngine`]: depth responder driving the model, evaluation and launches
//! - [`ArbitrageConfig`]: thresholds, sizing, timeouts and windows
//! - [`TriggerStrategy`]: interchangeable entry decision ([`MeanReversionTrigger`],
//!   [`PercentageTrigger`]) producing an [`ArbitragePlan`]
//! - [`ArbitrageTransaction`]: slow leg, fast leg, convergence wait and close
//! - [`RiskGate`]: margin cooldown, concurrency cap and one transaction per pair
//! - [`FeeCalculator`]: fee and PnL arithmetic
//! - [`TickRecorder`]: optional tick recording for offline replay of the depth model
//!
//! # Example
//!
//! ```rust,ignore
//! use calendar_arb_strategy::{ArbitrageConfig, ArbitrageEngine};
//! use calendar_execution::{Cooldown, OrderExecutor, audit::AuditSink};
//!
//! let config = ArbitrageConfig::default();
//! let executor = Arc::new(OrderExecutor::new(
//!     client,
//!     orders,
//!     AuditSink::disabled(),
//!     Cooldown::new(config.cooldown()),
//! ));
//!
//! // Subscribes to the depth of every instrument; transactions launch on their own tasks
//! let engine = ArbitrageEngine::new(config, instruments, executor, books).start();
//! ```
//!
//! # Fee Model
//!
//! Every transaction pays a taker fee on four fills (open and close of both legs). The
//! profit estimate is net of all four, in quote currency.

/// Engine configuration.
pub mod config;

/// Engine errors.
pub mod error;

/// Fee and PnL arithmetic.
pub mod fees;

/// [`ArbitrageLeg`](plan::ArbitrageLeg) and [`ArbitragePlan`](plan::ArbitragePlan).
pub mod plan;

/// Trigger strategies.
pub mod strategy;

/// Two-leg transaction orchestrator.
pub mod transaction;

/// Transaction approval.
pub mod risk;

/// Engine driver.
pub mod engine;

/// Tick recording and replay.
pub mod recorder;

pub use config::{ArbitrageConfig, StrategyKind};
pub use engine::ArbitrageEngine;
pub use error::EngineError;
pub use fees::FeeCalculator;
pub use plan::{ArbitrageLeg, ArbitragePlan};
pub use recorder::{RecordedTick, TickRecorder};
pub use risk::{RiskGate, RiskPermit, RiskRefused};
pub use strategy::{MeanReversionTrigger, PercentageTrigger, TriggerStrategy};
pub use transaction::{ArbitrageTransaction, TransactionContext, TransactionStatus};
