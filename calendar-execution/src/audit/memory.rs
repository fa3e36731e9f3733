use super::{AuditError, AuditRecord, AuditStore, TransactionRecord};
use crate::order::{OrderId, OrderRecord, TransactionId};
use async_trait::async_trait;
use indexmap::IndexMap;
use parking_lot::Mutex;
use smol_str::SmolStr;

/// [`AuditStore`] holding upserted rows in memory, plus the full write history.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    orders: Mutex<IndexMap<OrderId, OrderRecord>>,
    transactions: Mutex<IndexMap<TransactionId, TransactionRecord>>,
    history: Mutex<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (last upserted) row for `order_id`.
    pub fn order(&self, order_id: OrderId) -> Option<OrderRecord> {
        self.orders.lock().get(&order_id).cloned()
    }

    pub fn orders(&self) -> Vec<OrderRecord> {
        self.orders.lock().values().cloned().collect()
    }

    /// Current (last upserted) row for `transaction_id`.
    pub fn transaction(&self, transaction_id: &TransactionId) -> Option<TransactionRecord> {
        self.transactions.lock().get(transaction_id).cloned()
    }

    /// Every status written for `transaction_id`, in write order.
    pub fn transaction_statuses(&self, transaction_id: &TransactionId) -> Vec<SmolStr> {
        self.history
            .lock()
            .iter()
            .filter_map(|record| match record {
                AuditRecord::Transaction(transaction)
                    if &transaction.transaction_id == transaction_id =>
                {
                    Some(transaction.status.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Every record written, in write order.
    pub fn history(&self) -> Vec<AuditRecord> {
        self.history.lock().clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn upsert_order(&self, record: &OrderRecord) -> Result<(), AuditError> {
        self.orders.lock().insert(record.order_id, record.clone());
        self.history.lock().push(AuditRecord::Order(record.clone()));
        Ok(())
    }

    async fn upsert_transaction(&self, record: &TransactionRecord) -> Result<(), AuditError> {
        self.transactions
            .lock()
            .insert(record.transaction_id.clone(), record.clone());
        self.history
            .lock()
            .push(AuditRecord::Transaction(record.clone()));
        Ok(())
    }
}
