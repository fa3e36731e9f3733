//! Single order execution.
//!
//! [`OrderExecutor`] drives exactly one order from placement to a terminal [`OrderOutcome`]:
//!
//! 1. Place over REST. A rejection is [`OrderOutcome::Failed`]; insufficient margin also
//!    triggers the [`Cooldown`].
//! 2. Subscribe to the order id on the [`OrderListener`] and wait on a [`Settlement`],
//!    bounded by the order timeout. Market orders wait without bound.
//! 3. On expiry, cancel exactly once and allow a short grace for the cancel to be confirmed.
//! 4. Fetch the authoritative order state for the final audit record.
//!
//! Audit records are written at `request_sent`, `websocket_fulfilled` and `final`.

use crate::{
    audit::AuditSink,
    client::ExchangeClient,
    cooldown::Cooldown,
    dispatch::{OrderListener, OrderResponder},
    error::ClientError,
    order::{
        AuditStage, Fill, OrderId, OrderKind, OrderRecord, OrderStatus, PlaceOrder, TransactionId,
    },
};
use calendar_instrument::{Instrument, OrderAction};
use calendar_integration::{Settlement, Wait};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default wait for a cancel to be confirmed after an order timed out.
pub const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(2);

/// Why an order never reached the book.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum OrderFailure {
    #[error("margin not enough")]
    MarginNotEnough,

    #[error("rest api failure: {0}")]
    RestApi(ClientError),
}

/// Terminal result of one [`OrderExecutor`] run.
///
/// `filled` is the number of contracts executed before the order left the book.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum OrderOutcome {
    Fulfilled { order_id: OrderId, fill: Fill },
    Cancelled { order_id: OrderId, filled: Decimal },
    TimedOut { order_id: OrderId, filled: Decimal },
    Failed(OrderFailure),
}

impl OrderOutcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled { .. })
    }

    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            Self::Fulfilled { order_id, .. }
            | Self::Cancelled { order_id, .. }
            | Self::TimedOut { order_id, .. } => Some(*order_id),
            Self::Failed(_) => None,
        }
    }

    /// Contracts executed, whatever the outcome.
    pub fn filled(&self) -> Decimal {
        match self {
            Self::Fulfilled { fill, .. } => fill.filled,
            Self::Cancelled { filled, .. } | Self::TimedOut { filled, .. } => *filled,
            Self::Failed(_) => Decimal::ZERO,
        }
    }

    pub fn fill(&self) -> Option<&Fill> {
        match self {
            Self::Fulfilled { fill, .. } => Some(fill),
            _ => None,
        }
    }
}

/// Terminal order event observed on the push channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum Terminal {
    Fulfilled(Fill),
    Cancelled(Decimal),
}

/// [`OrderResponder`] settling a [`Settlement`] on the first terminal event.
#[derive(Debug, Default)]
struct SettlementResponder {
    settlement: Settlement<Terminal>,
    filled: Mutex<Decimal>,
}

impl SettlementResponder {
    fn filled(&self) -> Decimal {
        *self.filled.lock()
    }
}

impl OrderResponder for SettlementResponder {
    fn pending(&self, order_id: OrderId) {
        debug!(%order_id, "order pending");
    }

    fn cancelled(&self, order_id: OrderId, filled: Decimal) {
        debug!(%order_id, %filled, "order cancelled");
        *self.filled.lock() = filled;
        self.settlement.set(Terminal::Cancelled(filled));
    }

    fn partially_filled(&self, order_id: OrderId, size: Decimal, filled: Decimal, price_avg: Decimal) {
        debug!(%order_id, %size, %filled, %price_avg, "order partially filled");
        *self.filled.lock() = filled;
    }

    fn fulfilled(&self, order_id: OrderId, fill: Fill) {
        debug!(%order_id, filled = %fill.filled, price_avg = %fill.price_avg, "order fulfilled");
        *self.filled.lock() = fill.filled;
        self.settlement.set(Terminal::Fulfilled(fill));
    }
}

/// Places single orders and drives each to a terminal [`OrderOutcome`].
#[derive(Debug)]
pub struct OrderExecutor<C> {
    client: Arc<C>,
    listener: Arc<OrderListener>,
    audit: AuditSink,
    cooldown: Cooldown,
    cancel_grace: Duration,
}

impl<C> OrderExecutor<C>
where
    C: ExchangeClient,
{
    pub fn new(
        client: Arc<C>,
        listener: Arc<OrderListener>,
        audit: AuditSink,
        cooldown: Cooldown,
    ) -> Self {
        Self {
            client,
            listener,
            audit,
            cooldown,
            cancel_grace: DEFAULT_CANCEL_GRACE,
        }
    }

    pub fn with_cancel_grace(mut self, cancel_grace: Duration) -> Self {
        self.cancel_grace = cancel_grace;
        self
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    pub fn cooldown(&self) -> &Cooldown {
        &self.cooldown
    }

    pub fn audit(&self) -> &AuditSink {
        &self.audit
    }

    /// Open a long position with a limit order, cancelled after `timeout`.
    pub async fn open_long(
        &self,
        instrument: &Instrument,
        volume: u32,
        price: Decimal,
        timeout: Duration,
        transaction_id: Option<&TransactionId>,
    ) -> OrderOutcome {
        let request = limit(instrument, OrderAction::OpenLong, volume, price);
        self.execute(request, Some(timeout), transaction_id).await
    }

    /// Open a short position with a limit order, cancelled after `timeout`.
    pub async fn open_short(
        &self,
        instrument: &Instrument,
        volume: u32,
        price: Decimal,
        timeout: Duration,
        transaction_id: Option<&TransactionId>,
    ) -> OrderOutcome {
        let request = limit(instrument, OrderAction::OpenShort, volume, price);
        self.execute(request, Some(timeout), transaction_id).await
    }

    /// Close a long position at market. `reference_price` is recorded for audit only.
    pub async fn close_long(
        &self,
        instrument: &Instrument,
        volume: u32,
        reference_price: Decimal,
        transaction_id: Option<&TransactionId>,
    ) -> OrderOutcome {
        let request = market(instrument, OrderAction::CloseLong, volume, reference_price);
        self.execute(request, None, transaction_id).await
    }

    /// Close a short position at market. `reference_price` is recorded for audit only.
    pub async fn close_short(
        &self,
        instrument: &Instrument,
        volume: u32,
        reference_price: Decimal,
        transaction_id: Option<&TransactionId>,
    ) -> OrderOutcome {
        let request = market(instrument, OrderAction::CloseShort, volume, reference_price);
        self.execute(request, None, transaction_id).await
    }

    /// Place `request` and wait for a terminal outcome, bounded by `timeout` if provided.
    pub async fn execute(
        &self,
        request: PlaceOrder,
        timeout: Option<Duration>,
        transaction_id: Option<&TransactionId>,
    ) -> OrderOutcome {
        let order_id = match self.client.place(&request).await {
            Ok(order_id) => order_id,
            Err(error) if error.is_margin_not_enough() => {
                warn!(instrument = %request.instrument, action = %request.action, volume = request.volume, "placement rejected, margin not enough");
                self.cooldown.trigger();
                return OrderOutcome::Failed(OrderFailure::MarginNotEnough);
            }
            Err(error) => {
                error!(instrument = %request.instrument, action = %request.action, ?error, "placement failed");
                return OrderOutcome::Failed(OrderFailure::RestApi(error));
            }
        };

        let record = OrderRecord::request_sent(order_id, transaction_id.cloned(), &request);
        self.audit.record(record.clone());
        info!(
            %order_id,
            instrument = %request.instrument,
            action = %request.action,
            volume = request.volume,
            price = %request.price,
            kind = ?request.kind,
            "order placed"
        );

        let responder = Arc::new(SettlementResponder::default());
        let subscriber: Arc<dyn OrderResponder> = responder.clone();
        self.listener.subscribe(order_id, subscriber.clone());

        let outcome = match responder.settlement.get(timeout).await {
            Wait::Settled(Terminal::Fulfilled(fill)) => {
                self.audit.record(record.advance(
                    OrderStatus::Fulfilled,
                    &fill,
                    AuditStage::WebsocketFulfilled,
                ));
                info!(%order_id, filled = %fill.filled, price_avg = %fill.price_avg, fee = %fill.fee, "order fulfilled");
                OrderOutcome::Fulfilled { order_id, fill }
            }
            Wait::Settled(Terminal::Cancelled(filled)) => {
                warn!(%order_id, %filled, "order cancelled by exchange");
                OrderOutcome::Cancelled { order_id, filled }
            }
            Wait::TimedOut => {
                let filled = self.revoke(&request, order_id, &responder).await;
                OrderOutcome::TimedOut { order_id, filled }
            }
        };

        self.listener.unsubscribe(order_id, &subscriber);
        self.finalise(&request, &record, outcome).await
    }

    /// Cancel a timed out order exactly once, returning the contracts filled before it left
    /// the book.
    async fn revoke(
        &self,
        request: &PlaceOrder,
        order_id: OrderId,
        responder: &SettlementResponder,
    ) -> Decimal {
        warn!(%order_id, instrument = %request.instrument, "order timed out, cancelling");

        match self.client.cancel(&request.instrument, order_id).await {
            Ok(()) => debug!(%order_id, "cancel accepted"),
            Err(error) if error.is_order_not_live() => {
                info!(%order_id, code = ?error.code(), "cancel raced order completion");
            }
            Err(error) => error!(%order_id, ?error, "cancel failed"),
        }

        match responder.settlement.get(Some(self.cancel_grace)).await {
            Wait::Settled(Terminal::Fulfilled(fill)) => fill.filled,
            Wait::Settled(Terminal::Cancelled(filled)) => filled,
            Wait::TimedOut => responder.filled(),
        }
    }

    /// Post-mortem fetch of the authoritative order state for the final audit record.
    ///
    /// The fetched fill supersedes the pushed one.
    async fn finalise(
        &self,
        request: &PlaceOrder,
        record: &OrderRecord,
        outcome: OrderOutcome,
    ) -> OrderOutcome {
        let Some(order_id) = outcome.order_id() else {
            return outcome;
        };

        let info = match self.client.order_info(&request.instrument, order_id).await {
            Ok(info) => info,
            Err(error) => {
                warn!(%order_id, ?error, "post-mortem order fetch failed");
                return outcome;
            }
        };
        self.audit.record(record.finalise(&info));
        debug!(%order_id, status = %info.status, filled = %info.filled, fee = %info.fee, "order finalised");

        match outcome {
            OrderOutcome::Fulfilled { order_id, fill } if info.status == OrderStatus::Fulfilled => {
                OrderOutcome::Fulfilled {
                    order_id,
                    fill: Fill {
                        price: fill.price,
                        ..info.fill()
                    },
                }
            }
            OrderOutcome::Cancelled { order_id, filled } => OrderOutcome::Cancelled {
                order_id,
                filled: filled.max(info.filled),
            },
            OrderOutcome::TimedOut { order_id, filled } => OrderOutcome::TimedOut {
                order_id,
                filled: filled.max(info.filled),
            },
            other => other,
        }
    }
}

fn limit(instrument: &Instrument, action: OrderAction, volume: u32, price: Decimal) -> PlaceOrder {
    PlaceOrder::new(
        instrument.id.clone(),
        action,
        volume,
        price,
        instrument.leverage,
        OrderKind::Limit,
    )
}

fn market(instrument: &Instrument, action: OrderAction, volume: u32, price: Decimal) -> PlaceOrder {
    PlaceOrder::new(
        instrument.id.clone(),
        action,
        volume,
        price,
        instrument.leverage,
        OrderKind::Market,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audit::{AuditRecord, InMemoryAuditStore, spawn_audit_writer},
        client::mock::{MockBehaviour, MockExchange},
    };
    use calendar_instrument::{ExpiryClass, InstrumentId};
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use smol_str::SmolStr;

    struct Harness {
        exchange: Arc<MockExchange>,
        executor: OrderExecutor<MockExchange>,
        cooldown: Cooldown,
    }

    fn harness(audit: AuditSink) -> Harness {
        let listener = Arc::new(OrderListener::new());
        let exchange = Arc::new(MockExchange::new(listener.clone()));
        let cooldown = Cooldown::new(Duration::from_secs(60));
        let executor = OrderExecutor::new(exchange.clone(), listener, audit, cooldown.clone());
        Harness {
            exchange,
            executor,
            cooldown,
        }
    }

    fn instrument(id: &str) -> Instrument {
        Instrument::new(
            InstrumentId::from(id),
            SmolStr::new("BTC-USD"),
            ExpiryClass::Near,
            Utc::now(),
            dec!(100),
            dec!(10),
        )
    }

    // ----------------------------------------------------------------------------------
    // Outcomes
    // ----------------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_fill_before_subscribe_is_observed() {
        let harness = harness(AuditSink::disabled());

        let outcome = harness
            .executor
            .open_long(&instrument("A"), 2, dec!(100), Duration::from_secs(5), None)
            .await;

        assert!(outcome.is_fulfilled());
        assert_eq!(outcome.filled(), dec!(2));
        assert!(harness.exchange.cancels().is_empty());
        assert_eq!(harness.exchange.info_requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_exactly_once() {
        let harness = harness(AuditSink::disabled());
        harness
            .exchange
            .script("A", OrderAction::OpenShort, MockBehaviour::Rest);

        let outcome = harness
            .executor
            .open_short(&instrument("A"), 2, dec!(100), Duration::from_secs(5), None)
            .await;

        assert!(matches!(outcome, OrderOutcome::TimedOut { filled, .. } if filled.is_zero()));
        assert_eq!(harness.exchange.cancels().len(), 1);
        assert_eq!(Some(harness.exchange.cancels()[0].1), outcome.order_id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_partial_fill() {
        let harness = harness(AuditSink::disabled());
        harness
            .exchange
            .script("A", OrderAction::OpenLong, MockBehaviour::PartialFill(dec!(1)));

        let outcome = harness
            .executor
            .open_long(&instrument("A"), 3, dec!(100), Duration::from_secs(5), None)
            .await;

        assert!(matches!(outcome, OrderOutcome::TimedOut { filled, .. } if filled == dec!(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fill_racing_cancel_reports_executed_volume() {
        let listener = Arc::new(OrderListener::new());
        let exchange = Arc::new(
            MockExchange::new(listener.clone()).with_cancel_latency(Duration::from_secs(1)),
        );
        let executor = OrderExecutor::new(
            exchange.clone(),
            listener,
            AuditSink::disabled(),
            Cooldown::new(Duration::from_secs(60)),
        )
        .with_cancel_grace(Duration::from_secs(2));

        // Fills after the timeout fired but before the cancel reaches the book
        exchange.script(
            "A",
            OrderAction::OpenShort,
            MockBehaviour::FillAfter(Duration::from_millis(5500)),
        );

        let outcome = executor
            .open_short(&instrument("A"), 4, dec!(100), Duration::from_secs(5), None)
            .await;

        assert_eq!(exchange.cancels().len(), 1);
        assert!(!matches!(outcome, OrderOutcome::Failed(_)));
        assert!(matches!(outcome, OrderOutcome::TimedOut { .. }));
        assert_eq!(outcome.filled(), dec!(4));

        let info = exchange.order_info(&"A".into(), outcome.order_id().unwrap()).await.unwrap();
        assert_eq!(info.status, OrderStatus::Fulfilled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exchange_cancel() {
        let harness = harness(AuditSink::disabled());
        harness
            .exchange
            .script("A", OrderAction::OpenLong, MockBehaviour::Cancel);

        let outcome = harness
            .executor
            .open_long(&instrument("A"), 3, dec!(100), Duration::from_secs(5), None)
            .await;

        assert!(matches!(outcome, OrderOutcome::Cancelled { .. }));
        assert!(harness.exchange.cancels().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_market_close_waits_without_bound() {
        let harness = harness(AuditSink::disabled());
        harness.exchange.script(
            "A",
            OrderAction::CloseLong,
            MockBehaviour::FillAfter(Duration::from_secs(600)),
        );

        let outcome = harness
            .executor
            .close_long(&instrument("A"), 1, dec!(100), None)
            .await;

        assert!(outcome.is_fulfilled());
        assert!(harness.exchange.cancels().is_empty());
        assert!(harness.exchange.placements()[0].is_market());
    }

    // ----------------------------------------------------------------------------------
    // Failures
    // ----------------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn test_margin_not_enough_triggers_cooldown() {
        let harness = harness(AuditSink::disabled());
        harness.exchange.script(
            "A",
            OrderAction::OpenLong,
            MockBehaviour::Reject(ClientError::api("51008", "insufficient margin")),
        );

        let outcome = harness
            .executor
            .open_long(&instrument("A"), 1, dec!(100), Duration::from_secs(5), None)
            .await;

        assert_eq!(outcome, OrderOutcome::Failed(OrderFailure::MarginNotEnough));
        assert!(harness.cooldown.is_active());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(!harness.cooldown.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_rejection_is_rest_failure() {
        let harness = harness(AuditSink::disabled());
        harness.exchange.script(
            "A",
            OrderAction::OpenLong,
            MockBehaviour::Reject(ClientError::Request("connection reset".into())),
        );

        let outcome = harness
            .executor
            .open_long(&instrument("A"), 1, dec!(100), Duration::from_secs(5), None)
            .await;

        assert!(matches!(outcome, OrderOutcome::Failed(OrderFailure::RestApi(_))));
        assert!(!harness.cooldown.is_active());
        assert!(harness.exchange.info_requests().is_empty());
    }

    // ----------------------------------------------------------------------------------
    // Audit
    // ----------------------------------------------------------------------------------

    #[tokio::test]
    async fn test_audit_stages() {
        let store = Arc::new(InMemoryAuditStore::new());
        let (sink, writer) = spawn_audit_writer(store.clone());
        let harness = harness(sink);
        let transaction_id = TransactionId::from("tx_1");

        let outcome = harness
            .executor
            .open_long(
                &instrument("A"),
                2,
                dec!(100),
                Duration::from_secs(5),
                Some(&transaction_id),
            )
            .await;
        let order_id = outcome.order_id().unwrap();

        drop(harness);
        writer.await.unwrap();

        let stages = store
            .history()
            .into_iter()
            .filter_map(|record| match record {
                AuditRecord::Order(order) => Some(order.comment),
                AuditRecord::Transaction(_) => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            stages,
            vec![
                AuditStage::RequestSent,
                AuditStage::WebsocketFulfilled,
                AuditStage::Final
            ]
        );

        let last = store.order(order_id).unwrap();
        assert_eq!(last.status, OrderStatus::Fulfilled);
        assert_eq!(last.transaction_id, Some(transaction_id));
    }
}
