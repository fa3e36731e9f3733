//! Fire-and-forget audit persistence.
//!
//! Producers on the trading path hand immutable [`AuditRecord`]s to an [`AuditSink`], which
//! never blocks and never reports back. A background writer task owns the [`AuditStore`]
//! and upserts each record in submission order. Store failures are logged and dropped.

use crate::order::{OrderRecord, TransactionId};
use async_trait::async_trait;
use calendar_instrument::InstrumentId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, warn};

/// In-memory [`AuditStore`].
pub mod memory;

/// PostgREST backed [`AuditStore`].
pub mod rest;

pub use memory::InMemoryAuditStore;
pub use rest::RestAuditStore;

/// Errors that can occur when persisting audit records.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Database error: {message}")]
    Database { message: String, code: Option<String> },

    #[error("Missing configuration: {0}")]
    Config(String),
}

/// Persisted state of one arbitrage transaction, upserted by `transaction_id`.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub status: SmolStr,
    pub long_instrument: InstrumentId,
    pub short_instrument: InstrumentId,
    pub volume: u32,
    pub close_gap: Decimal,
    pub z_score: Decimal,
    pub updated_at: DateTime<Utc>,
}

/// Any record the audit trail persists.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub enum AuditRecord {
    Order(OrderRecord),
    Transaction(TransactionRecord),
}

impl From<OrderRecord> for AuditRecord {
    fn from(record: OrderRecord) -> Self {
        Self::Order(record)
    }
}

impl From<TransactionRecord> for AuditRecord {
    fn from(record: TransactionRecord) -> Self {
        Self::Transaction(record)
    }
}

/// Backend persisting [`AuditRecord`]s.
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn upsert_order(&self, record: &OrderRecord) -> Result<(), AuditError>;

    async fn upsert_transaction(&self, record: &TransactionRecord) -> Result<(), AuditError>;
}

/// Non-blocking handle used to submit [`AuditRecord`]s.
#[derive(Debug, Clone)]
pub struct AuditSink {
    tx: Option<mpsc::UnboundedSender<AuditRecord>>,
}

impl AuditSink {
    /// Sink that discards every record.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn new(tx: mpsc::UnboundedSender<AuditRecord>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Submit a record without waiting for it to be persisted.
    pub fn record(&self, record: impl Into<AuditRecord>) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(record.into()).is_err() {
            warn!("audit writer stopped, dropping record");
        }
    }
}

/// Spawn the background writer task draining an [`AuditSink`] into `store`.
///
/// The task ends once every [`AuditSink`] clone has been dropped and the queue is drained.
pub fn spawn_audit_writer(store: Arc<dyn AuditStore>) -> (AuditSink, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<AuditRecord>();

    let handle = tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            let result = match &record {
                AuditRecord::Order(order) => store.upsert_order(order).await,
                AuditRecord::Transaction(transaction) => store.upsert_transaction(transaction).await,
            };

            match (result, &record) {
                (Ok(()), AuditRecord::Order(order)) => {
                    debug!(order_id = %order.order_id, comment = %order.comment, "order record persisted");
                }
                (Ok(()), AuditRecord::Transaction(transaction)) => {
                    debug!(transaction_id = %transaction.transaction_id, status = %transaction.status, "transaction record persisted");
                }
                (Err(error), _) => {
                    error!(?error, ?record, "failed to persist audit record");
                }
            }
        }
        debug!("audit writer stopped");
    });

    (AuditSink::new(tx), handle)
}
