//! Engine driver.
//!
//! [`ArbitrageEngine`] is subscribed to the depth of every instrument. Each depth update is
//! applied to the shared [`DepthTable`]; once the update completes a spread row, every
//! ordered instrument pair is evaluated with the configured [`TriggerStrategy`] and each
//! approved plan is launched as an [`ArbitrageTransaction`] task.
//!
//! Finished transaction tasks are reaped on every launch and by
//! [`ArbitrageEngine::live_transactions`]; their terminal statuses are kept only as counts in
//! [`ArbitrageEngine::outcomes`].

use crate::{
    config::ArbitrageConfig,
    plan::ArbitragePlan,
    recorder::TickRecorder,
    risk::{RiskGate, RiskPermit},
    strategy::{self, TriggerStrategy},
    transaction::{ArbitrageTransaction, TransactionContext, TransactionStatus},
};
use calendar_data::{
    books::MarketDepth,
    depth::DepthTable,
    dispatch::{BookListener, DepthResponder},
    error::DepthError,
};
use calendar_execution::{OrderExecutor, client::ExchangeClient, order::TransactionId};
use calendar_instrument::{InstrumentId, InstrumentPair, Instruments};
use fnv::FnvHashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::{
    runtime::Handle,
    task::{JoinError, JoinHandle},
};
use tracing::{debug, error, info, trace, warn};

/// Drives the depth model, the trigger strategy and transaction launches.
pub struct ArbitrageEngine<C> {
    strategy: Box<dyn TriggerStrategy>,
    context: Arc<TransactionContext<C>>,
    risk: Arc<RiskGate>,
    pairs: Vec<InstrumentPair>,
    counter: AtomicU64,
    recorder: Option<Mutex<TickRecorder>>,
    transactions: Mutex<Vec<JoinHandle<TransactionStatus>>>,
    outcomes: Mutex<FnvHashMap<TransactionStatus, u64>>,
}

impl<C> std::fmt::Debug for ArbitrageEngine<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArbitrageEngine")
            .field("strategy", &self.strategy.kind())
            .field("pairs", &self.pairs.len())
            .field("active", &self.risk.active())
            .finish()
    }
}

impl<C> ArbitrageEngine<C>
where
    C: ExchangeClient + 'static,
{
    pub fn new(
        config: ArbitrageConfig,
        instruments: Instruments,
        executor: Arc<OrderExecutor<C>>,
        books: Arc<BookListener>,
    ) -> Self {
        let strategy = strategy::from_config(&config);
        let risk = Arc::new(RiskGate::new(
            executor.cooldown().clone(),
            config.max_concurrent_transactions,
        ));
        let table = Arc::new(Mutex::new(DepthTable::new(&instruments, config.depth_table())));
        let pairs = instruments.pairs();

        Self {
            strategy,
            context: Arc::new(TransactionContext {
                executor,
                books,
                table,
                instruments: Arc::new(instruments),
                config,
            }),
            risk,
            pairs,
            counter: AtomicU64::new(0),
            recorder: None,
            transactions: Mutex::new(Vec::new()),
            outcomes: Mutex::new(FnvHashMap::default()),
        }
    }

    /// Replace the configured strategy.
    pub fn with_strategy(mut self, strategy: Box<dyn TriggerStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_recorder(mut self, recorder: Option<TickRecorder>) -> Self {
        self.recorder = recorder.map(Mutex::new);
        self
    }

    /// Subscribe the engine to the depth of every instrument.
    pub fn start(self) -> Arc<Self> {
        let engine = Arc::new(self);
        let responder: Arc<dyn DepthResponder> = engine.clone();
        for instrument in engine.context.instruments.ids() {
            engine
                .context
                .books
                .subscribe(instrument.clone(), Arc::clone(&responder));
        }
        info!(
            strategy = ?engine.strategy.kind(),
            instruments = engine.context.instruments.len(),
            pairs = engine.pairs.len(),
            "arbitrage engine started"
        );
        engine
    }

    pub fn context(&self) -> &Arc<TransactionContext<C>> {
        &self.context
    }

    pub fn risk(&self) -> &Arc<RiskGate> {
        &self.risk
    }

    /// Number of launched transactions whose task has not completed.
    pub fn live_transactions(&self) -> usize {
        let mut handles = self.transactions.lock();
        self.reap(&mut handles);
        handles.len()
    }

    /// Terminal status counts of every transaction reaped or joined so far.
    pub fn outcomes(&self) -> FnvHashMap<TransactionStatus, u64> {
        self.outcomes.lock().clone()
    }

    /// Wait for every transaction not yet reaped, returning their terminal statuses in
    /// launch order.
    pub async fn join(&self) -> Vec<TransactionStatus> {
        let handles = std::mem::take(&mut *self.transactions.lock());
        futures::future::join_all(handles)
            .await
            .into_iter()
            .filter_map(|result| self.tally(result))
            .collect()
    }

    /// Move finished transaction tasks out of `handles` into the outcome counts.
    fn reap(&self, handles: &mut Vec<JoinHandle<TransactionStatus>>) {
        handles.retain_mut(|handle| {
            if !handle.is_finished() {
                return true;
            }
            match handle.now_or_never() {
                Some(result) => {
                    self.tally(result);
                    false
                }
                None => true,
            }
        });
    }

    fn tally(&self, result: Result<TransactionStatus, JoinError>) -> Option<TransactionStatus> {
        match result {
            Ok(status) => {
                *self.outcomes.lock().entry(status).or_default() += 1;
                Some(status)
            }
            Err(error) => {
                error!(?error, "transaction task failed");
                None
            }
        }
    }

    /// Evaluate every pair the risk gate would currently approve.
    pub fn evaluate(&self) -> Vec<ArbitragePlan> {
        let table = self.context.table.lock();
        self.pairs
            .iter()
            .filter(|pair| match self.risk.check(pair) {
                Ok(()) => true,
                Err(refused) => {
                    trace!(%pair, %refused, "pair not evaluated");
                    false
                }
            })
            .filter_map(|pair| {
                match self.strategy.plan(&table, &self.context.instruments, pair) {
                    Ok(plan) => plan,
                    Err(DepthError::NotReady | DepthError::InsufficientHistory { .. }) => None,
                    Err(error) => {
                        warn!(%pair, ?error, "pair evaluation failed");
                        None
                    }
                }
            })
            .collect()
    }

    fn launch(&self, plan: ArbitragePlan, permit: RiskPermit) {
        let Ok(runtime) = Handle::try_current() else {
            error!(pair = %plan.pair, "no runtime available to launch transaction");
            return;
        };

        let config = &self.context.config;
        let id = TransactionId::new(
            &config.transaction_prefix,
            self.counter.fetch_add(1, Ordering::Relaxed) + 1,
        );
        let transaction = match ArbitrageTransaction::new(id, plan, Arc::clone(&self.context)) {
            Ok(transaction) => transaction,
            Err(error) => {
                error!(?error, "failed to build transaction");
                return;
            }
        };

        info!(
            transaction_id = %transaction.id(),
            pair = %transaction.plan().pair,
            slow = %transaction.plan().slow.instrument,
            volume = transaction.plan().volume(),
            z_score = %transaction.plan().z_score,
            expected_profit = %transaction.plan().expected_profit,
            "launching transaction"
        );

        let handle = runtime.spawn(async move {
            let status = transaction.process().await;
            drop(permit);
            status
        });

        let mut handles = self.transactions.lock();
        self.reap(&mut handles);
        handles.push(handle);
    }
}

impl<C> DepthResponder for ArbitrageEngine<C>
where
    C: ExchangeClient + 'static,
{
    fn tick(&self, instrument: &InstrumentId, depth: &MarketDepth) {
        let appended = {
            let mut table = self.context.table.lock();
            let appended = table.apply(instrument, depth.clone());
            if let (Some(recorder), Ok(appended)) = (&self.recorder, &appended) {
                recorder
                    .lock()
                    .on_tick(instrument, depth, &table, &self.pairs, *appended);
            }
            appended
        };
        match appended {
            Ok(true) => {}
            Ok(false) => return,
            Err(error) => {
                warn!(%instrument, ?error, "depth update rejected");
                return;
            }
        }

        for plan in self.evaluate() {
            match self.risk.acquire(&plan.pair) {
                Ok(permit) => self.launch(plan, permit),
                Err(refused) => debug!(pair = %plan.pair, %refused, "plan refused"),
            }
        }
    }
}
