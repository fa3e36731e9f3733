//! Two-leg arbitrage transaction.
//!
//! ```text
//! STARTED -> OPENING_SLOW -> SLOW_FAILED*
//!                         -> OPENING_FAST -> FAST_FAILED_UNWOUND*
//!                                         -> WAITING_CONVERGE -> CLOSING_BOTH -> ENDED*
//! ```
//!
//! - The slow leg is opened first with a short timeout. If it does not fill, the fast leg is
//!   never opened.
//! - If the fast leg does not fill, the slow leg is closed at market exactly once.
//! - Once both legs are open, a [`ConvergenceWatcher`] is subscribed to both books until the
//!   matched closing volume under the close gap reaches the configured minimum, or the
//!   maximum wait elapses. Both legs are then closed at market concurrently.
//!
//! Contracts filled by a leg that did not fully fill are closed at market before the
//! transaction reports its terminal status. Every transition is written to the audit trail.

use crate::{
    config::ArbitrageConfig,
    error::EngineError,
    plan::{ArbitrageLeg, ArbitragePlan},
};
use calendar_data::{
    books::{MarketDepth, MatchedVolume, matched_volume},
    depth::DepthTable,
    dispatch::{BookListener, DepthResponder},
};
use calendar_execution::{
    OrderExecutor, OrderOutcome,
    audit::TransactionRecord,
    client::ExchangeClient,
    order::TransactionId,
};
use calendar_instrument::{Instrument, InstrumentId, Instruments, PositionSide};
use calendar_integration::{Settlement, Wait};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use smol_str::SmolStr;
use std::{
    fmt::{Display, Formatter},
    sync::Arc,
};
use tracing::{debug, error, info, warn};

/// Lifecycle status of an [`ArbitrageTransaction`].
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TransactionStatus {
    Started,
    OpeningSlow,
    SlowFailed,
    OpeningFast,
    FastFailedUnwound,
    WaitingConverge,
    ClosingBoth,
    Ended,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::OpeningSlow => "opening_slow",
            Self::SlowFailed => "slow_failed",
            Self::OpeningFast => "opening_fast",
            Self::FastFailedUnwound => "fast_failed_unwound",
            Self::WaitingConverge => "waiting_converge",
            Self::ClosingBoth => "closing_both",
            Self::Ended => "ended",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::SlowFailed | Self::FastFailedUnwound | Self::Ended)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the convergence wait ended.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ConvergeExit {
    Converged(MatchedVolume),
    TimedOut,
}

/// Shared components every transaction runs against.
#[derive(Debug)]
pub struct TransactionContext<C> {
    pub executor: Arc<OrderExecutor<C>>,
    pub books: Arc<BookListener>,
    /// Latest depth of every instrument, used to seed the convergence wait.
    pub table: Arc<Mutex<DepthTable>>,
    pub instruments: Arc<Instruments>,
    pub config: ArbitrageConfig,
}

/// [`DepthResponder`] settling once the closing volume under the close gap is large enough.
///
/// Closing buys the short leg back at its asks and sells the long leg at its bids, so the
/// walk matches `asks(short)` against `bids(long)` while `ask - bid <= close_gap`.
#[derive(Debug)]
pub struct ConvergenceWatcher {
    long: InstrumentId,
    short: InstrumentId,
    close_gap: Decimal,
    min_volume: u32,
    books: Mutex<(Option<MarketDepth>, Option<MarketDepth>)>,
    settlement: Settlement<MatchedVolume>,
}

impl ConvergenceWatcher {
    pub fn new(long: InstrumentId, short: InstrumentId, close_gap: Decimal, min_volume: u32) -> Self {
        Self {
            long,
            short,
            close_gap,
            min_volume,
            books: Mutex::new((None, None)),
            settlement: Settlement::new(),
        }
    }

    pub fn settlement(&self) -> &Settlement<MatchedVolume> {
        &self.settlement
    }

    /// Provide a depth observed before subscribing. Ignored if a tick already arrived.
    pub fn seed(&self, instrument: &InstrumentId, depth: &MarketDepth) {
        self.observe(instrument, depth, false);
    }

    fn observe(&self, instrument: &InstrumentId, depth: &MarketDepth, replace: bool) {
        let mut books = self.books.lock();
        let slot = if instrument == &self.long {
            &mut books.0
        } else if instrument == &self.short {
            &mut books.1
        } else {
            return;
        };
        if replace || slot.is_none() {
            *slot = Some(depth.clone());
        }

        let (Some(long), Some(short)) = (&books.0, &books.1) else {
            return;
        };
        let matched = matched_volume(short.asks(), long.bids(), |buy, sell| {
            buy - sell <= self.close_gap
        });
        if matched.contracts() >= self.min_volume && self.settlement.set(matched) {
            debug!(long = %self.long, short = %self.short, volume = %matched.volume, "convergence reached");
        }
    }
}

impl DepthResponder for ConvergenceWatcher {
    fn tick(&self, instrument: &InstrumentId, depth: &MarketDepth) {
        self.observe(instrument, depth, true);
    }
}

/// One open -> converge -> close cycle of an [`ArbitragePlan`].
#[derive(Debug)]
pub struct ArbitrageTransaction<C> {
    id: TransactionId,
    plan: ArbitragePlan,
    slow_instrument: Instrument,
    fast_instrument: Instrument,
    context: Arc<TransactionContext<C>>,
    status: TransactionStatus,
}

impl<C> ArbitrageTransaction<C>
where
    C: ExchangeClient,
{
    pub fn new(
        id: TransactionId,
        plan: ArbitragePlan,
        context: Arc<TransactionContext<C>>,
    ) -> Result<Self, EngineError> {
        let slow_instrument = context.instruments.find(&plan.slow.instrument)?.clone();
        let fast_instrument = context.instruments.find(&plan.fast.instrument)?.clone();

        Ok(Self {
            id,
            plan,
            slow_instrument,
            fast_instrument,
            context,
            status: TransactionStatus::Started,
        })
    }

    pub fn id(&self) -> &TransactionId {
        &self.id
    }

    pub fn plan(&self) -> &ArbitragePlan {
        &self.plan
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    /// Run the transaction to a terminal [`TransactionStatus`].
    pub async fn process(mut self) -> TransactionStatus {
        let context = Arc::clone(&self.context);
        let config = &context.config;
        self.transition(TransactionStatus::Started);

        self.transition(TransactionStatus::OpeningSlow);
        let slow = self
            .open(&self.plan.slow, &self.slow_instrument, config.slow_leg_timeout())
            .await;
        if !slow.is_fulfilled() {
            warn!(transaction_id = %self.id, outcome = ?slow, "slow leg not filled");
            self.close_residual(&self.plan.slow, &self.slow_instrument, &slow)
                .await;
            return self.transition(TransactionStatus::SlowFailed);
        }

        self.transition(TransactionStatus::OpeningFast);
        let fast = self
            .open(&self.plan.fast, &self.fast_instrument, config.fast_leg_timeout())
            .await;
        if !fast.is_fulfilled() {
            warn!(transaction_id = %self.id, outcome = ?fast, "fast leg not filled, unwinding slow leg");
            self.close_residual(&self.plan.fast, &self.fast_instrument, &fast)
                .await;
            let unwind = self
                .close(&self.plan.slow, &self.slow_instrument, contracts(slow.filled()))
                .await;
            if !unwind.is_fulfilled() {
                error!(transaction_id = %self.id, outcome = ?unwind, instrument = %self.plan.slow.instrument, "slow leg unwind did not fill");
            }
            return self.transition(TransactionStatus::FastFailedUnwound);
        }

        self.transition(TransactionStatus::WaitingConverge);
        match self.await_convergence().await {
            ConvergeExit::Converged(matched) => {
                info!(transaction_id = %self.id, volume = %matched.volume, "spread converged");
            }
            ConvergeExit::TimedOut => {
                warn!(transaction_id = %self.id, max_wait = ?config.max_converge_wait(), "convergence wait elapsed");
            }
        }

        self.transition(TransactionStatus::ClosingBoth);
        let (slow_close, fast_close) = tokio::join!(
            self.close(&self.plan.slow, &self.slow_instrument, contracts(slow.filled())),
            self.close(&self.plan.fast, &self.fast_instrument, contracts(fast.filled())),
        );
        for (leg, outcome) in [(&self.plan.slow, slow_close), (&self.plan.fast, fast_close)] {
            if !outcome.is_fulfilled() {
                error!(transaction_id = %self.id, instrument = %leg.instrument, ?outcome, "closing leg did not fill");
            }
        }

        self.transition(TransactionStatus::Ended)
    }

    fn transition(&mut self, status: TransactionStatus) -> TransactionStatus {
        self.status = status;
        info!(transaction_id = %self.id, %status, pair = %self.plan.pair, "transaction transition");

        self.context.executor.audit().record(TransactionRecord {
            transaction_id: self.id.clone(),
            status: SmolStr::new_static(status.as_str()),
            long_instrument: self.plan.long_leg().instrument.clone(),
            short_instrument: self.plan.short_leg().instrument.clone(),
            volume: self.plan.volume(),
            close_gap: self.plan.close_gap,
            z_score: self.plan.z_score,
            updated_at: Utc::now(),
        });
        status
    }

    async fn open(
        &self,
        leg: &ArbitrageLeg,
        instrument: &Instrument,
        timeout: std::time::Duration,
    ) -> OrderOutcome {
        let executor = &self.context.executor;
        match leg.side {
            PositionSide::Long => {
                executor
                    .open_long(instrument, leg.volume, leg.price, timeout, Some(&self.id))
                    .await
            }
            PositionSide::Short => {
                executor
                    .open_short(instrument, leg.volume, leg.price, timeout, Some(&self.id))
                    .await
            }
        }
    }

    async fn close(&self, leg: &ArbitrageLeg, instrument: &Instrument, volume: u32) -> OrderOutcome {
        let executor = &self.context.executor;
        let reference_price = self.reference_price(leg);
        match leg.side {
            PositionSide::Long => {
                executor
                    .close_long(instrument, volume, reference_price, Some(&self.id))
                    .await
            }
            PositionSide::Short => {
                executor
                    .close_short(instrument, volume, reference_price, Some(&self.id))
                    .await
            }
        }
    }

    /// Close whatever a leg that did not fully fill managed to execute.
    async fn close_residual(&self, leg: &ArbitrageLeg, instrument: &Instrument, outcome: &OrderOutcome) {
        let residual = contracts(outcome.filled());
        if residual == 0 {
            return;
        }
        warn!(transaction_id = %self.id, instrument = %leg.instrument, residual, "closing partially filled leg");
        let close = self.close(leg, instrument, residual).await;
        if !close.is_fulfilled() {
            error!(transaction_id = %self.id, instrument = %leg.instrument, outcome = ?close, "residual close did not fill");
        }
    }

    /// Top of book a market close of `leg` would take, falling back to its opening price.
    fn reference_price(&self, leg: &ArbitrageLeg) -> Decimal {
        let table = self.context.table.lock();
        let Ok(depth) = table.market_depth(&leg.instrument) else {
            return leg.price;
        };
        let level = match leg.side {
            PositionSide::Long => depth.best_bid(),
            PositionSide::Short => depth.best_ask(),
        };
        level.map_or(leg.price, |level| level.price)
    }

    async fn await_convergence(&self) -> ConvergeExit {
        let long = &self.plan.long_leg().instrument;
        let short = &self.plan.short_leg().instrument;
        let watcher = Arc::new(ConvergenceWatcher::new(
            long.clone(),
            short.clone(),
            self.plan.close_gap,
            self.context.config.min_close_volume,
        ));

        let responder: Arc<dyn DepthResponder> = watcher.clone();
        let _subscriptions = [
            self.context.books.subscribe_scoped(long.clone(), Arc::clone(&responder)),
            self.context.books.subscribe_scoped(short.clone(), responder),
        ];

        {
            let table = self.context.table.lock();
            for instrument in [long, short] {
                if let Ok(depth) = table.market_depth(instrument) {
                    watcher.seed(instrument, depth);
                }
            }
        }

        debug!(transaction_id = %self.id, close_gap = %self.plan.close_gap, "waiting for convergence");
        match watcher
            .settlement()
            .get(Some(self.context.config.max_converge_wait()))
            .await
        {
            Wait::Settled(matched) => ConvergeExit::Converged(matched),
            Wait::TimedOut => ConvergeExit::TimedOut,
        }
    }
}

/// Executed volume floored to whole contracts.
fn contracts(filled: Decimal) -> u32 {
    filled.floor().to_u32().unwrap_or(0)
}
