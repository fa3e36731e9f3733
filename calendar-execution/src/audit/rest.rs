use super::{AuditError, AuditStore, TransactionRecord};
use crate::order::{AuditStage, OrderId, OrderKind, OrderRecord, OrderStatus, TransactionId};
use async_trait::async_trait;
use calendar_instrument::{InstrumentId, OrderAction};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

const ORDERS_TABLE: &str = "orders";
const TRANSACTIONS_TABLE: &str = "transactions";

/// Order row. `last_update` is maintained server side.
#[derive(Debug, Serialize)]
struct OrderRow<'a> {
    order_id: OrderId,
    transaction_id: Option<&'a TransactionId>,
    instrument: &'a InstrumentId,
    action: OrderAction,
    kind: OrderKind,
    status: OrderStatus,
    size: Decimal,
    filled: Decimal,
    price: Decimal,
    price_avg: Decimal,
    fee: Decimal,
    comment: AuditStage,
}

impl<'a> From<&'a OrderRecord> for OrderRow<'a> {
    fn from(record: &'a OrderRecord) -> Self {
        Self {
            order_id: record.order_id,
            transaction_id: record.transaction_id.as_ref(),
            instrument: &record.instrument,
            action: record.action,
            kind: record.kind,
            status: record.status,
            size: record.size,
            filled: record.filled,
            price: record.price,
            price_avg: record.price_avg,
            fee: record.fee,
            comment: record.comment,
        }
    }
}

/// Transaction row. `last_update` is maintained server side.
#[derive(Debug, Serialize)]
struct TransactionRow<'a> {
    transaction_id: &'a TransactionId,
    status: &'a str,
    long_instrument: &'a InstrumentId,
    short_instrument: &'a InstrumentId,
    volume: u32,
    close_gap: Decimal,
    z_score: Decimal,
}

impl<'a> From<&'a TransactionRecord> for TransactionRow<'a> {
    fn from(record: &'a TransactionRecord) -> Self {
        Self {
            transaction_id: &record.transaction_id,
            status: record.status.as_str(),
            long_instrument: &record.long_instrument,
            short_instrument: &record.short_instrument,
            volume: record.volume,
            close_gap: record.close_gap,
            z_score: record.z_score,
        }
    }
}

/// PostgREST error response.
#[derive(Debug, Deserialize)]
struct PostgrestError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

/// [`AuditStore`] upserting rows through a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct RestAuditStore {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestAuditStore {
    /// Create a new audit store.
    ///
    /// # Arguments
    /// * `base_url` - PostgREST base URL (e.g., "https://xxx.supabase.co/rest/v1")
    /// * `api_key` - API key sent as both `apikey` and bearer token
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Create from environment variables.
    ///
    /// Reads `AUDIT_REST_URL` and `AUDIT_REST_KEY`.
    pub fn from_env() -> Result<Self, AuditError> {
        let url = std::env::var("AUDIT_REST_URL")
            .map_err(|_| AuditError::Config("AUDIT_REST_URL not set".into()))?;
        let key = std::env::var("AUDIT_REST_KEY")
            .map_err(|_| AuditError::Config("AUDIT_REST_KEY not set".into()))?;

        Ok(Self::new(url, key))
    }

    fn upsert_url(&self, table: &str, conflict: &str) -> String {
        format!("{}/{}?on_conflict={}", self.base_url, table, conflict)
    }

    async fn upsert<T>(&self, table: &str, conflict: &str, row: &T) -> Result<(), AuditError>
    where
        T: Serialize + Sync,
    {
        let url = self.upsert_url(table, conflict);
        let response = self
            .client
            .post(&url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(row)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if let Ok(err) = serde_json::from_str::<PostgrestError>(&body) {
                return Err(AuditError::Database {
                    message: err.message,
                    code: err.code,
                });
            }

            return Err(AuditError::Database {
                message: format!("HTTP {}: {}", status, body),
                code: None,
            });
        }

        debug!(table, "audit row upserted");
        Ok(())
    }
}

#[async_trait]
impl AuditStore for RestAuditStore {
    async fn upsert_order(&self, record: &OrderRecord) -> Result<(), AuditError> {
        self.upsert(ORDERS_TABLE, "order_id", &OrderRow::from(record))
            .await
    }

    async fn upsert_transaction(&self, record: &TransactionRecord) -> Result<(), AuditError> {
        self.upsert(
            TRANSACTIONS_TABLE,
            "transaction_id",
            &TransactionRow::from(record),
        )
        .await
    }
}
