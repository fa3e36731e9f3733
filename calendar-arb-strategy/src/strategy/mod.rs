//! Trigger strategies.
//!
//! A [`TriggerStrategy`] decides whether the latest spread of an ordered instrument pair is
//! dislocated enough to open (its [`Entry`]). The shared [`Planner`] then turns an entry into
//! an [`ArbitragePlan`]:
//!
//! 1. Walk the long leg's asks against the short leg's bids under the entry limit to size
//!    the position, skipping if the matched volume is below the configured minimum.
//! 2. Estimate the worst-case net profit over simulated convergence paths towards
//!    `mean + deviation * resilience`, skipping if it is below the configured minimum.
//! 3. Assign the slow leg to the instrument whose relevant top of book moves slower. Equal
//!    speeds make the instrument with the lower id the slow leg.
//!
//! The slow leg rests passively at the top of its own side of the book (a long slow leg
//! joins the best bid, a short one the best ask) and falls back to the matched price when
//! that side is empty. The fast leg crosses the spread at the matched price, widened by the
//! configured slippage.

use crate::{
    config::{ArbitrageConfig, StrategyKind},
    plan::{ArbitrageLeg, ArbitragePlan},
    strategy::estimate::{ConvergenceInput, worst_case_profit},
};
use calendar_data::{
    books::matched_volume,
    depth::DepthTable,
    error::DepthError,
};
use calendar_instrument::{BookSide, InstrumentPair, Instruments, PositionSide};
use parking_lot::Mutex;
use rand::{SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use tracing::debug;

/// Convergence profit estimate.
pub mod estimate;

/// Standard score trigger.
pub mod mean_reversion;

/// Percentage deviation trigger.
pub mod percentage;

pub use mean_reversion::MeanReversionTrigger;
pub use percentage::PercentageTrigger;

/// Entry signal on the spread `ask(long) - bid(short)` of one ordered pair.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Entry {
    /// Historical mean spread.
    pub mean: Decimal,
    /// Highest spread worth opening at. Depth beyond it is not taken.
    pub limit: Decimal,
    /// Standard score of the latest spread.
    pub z_score: Decimal,
}

/// Interchangeable decision function over the [`DepthTable`].
pub trait TriggerStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Entry signal for `pair`, or `None` if the latest spread is not dislocated enough.
    fn entry(&self, table: &DepthTable, pair: &InstrumentPair) -> Result<Option<Entry>, DepthError>;

    fn planner(&self) -> &Planner;

    /// Plan for opening `pair`, or `None` if the pair should not be traded this tick.
    fn plan(
        &self,
        table: &DepthTable,
        instruments: &Instruments,
        pair: &InstrumentPair,
    ) -> Result<Option<ArbitragePlan>, DepthError> {
        match self.entry(table, pair)? {
            Some(entry) => self.planner().plan(self.kind(), entry, table, instruments, pair),
            None => Ok(None),
        }
    }
}

/// Build the configured [`TriggerStrategy`].
pub fn from_config(config: &ArbitrageConfig) -> Box<dyn TriggerStrategy> {
    match config.strategy {
        StrategyKind::MeanReversion => Box::new(MeanReversionTrigger::new(config.clone())),
        StrategyKind::Percentage => Box::new(PercentageTrigger::new(config.clone())),
    }
}

/// Sizing, profit estimate and leg assignment shared by every [`TriggerStrategy`].
#[derive(Debug)]
pub struct Planner {
    config: ArbitrageConfig,
    rng: Mutex<StdRng>,
}

impl Planner {
    pub fn new(config: ArbitrageConfig) -> Self {
        let rng = Mutex::new(StdRng::seed_from_u64(config.profit_seed));
        Self { config, rng }
    }

    pub fn config(&self) -> &ArbitrageConfig {
        &self.config
    }

    pub fn plan(
        &self,
        strategy: StrategyKind,
        entry: Entry,
        table: &DepthTable,
        instruments: &Instruments,
        pair: &InstrumentPair,
    ) -> Result<Option<ArbitragePlan>, DepthError> {
        let long_depth = table.market_depth(&pair.long)?;
        let short_depth = table.market_depth(&pair.short)?;

        let matched = matched_volume(long_depth.asks(), short_depth.bids(), |buy, sell| {
            buy - sell <= entry.limit
        });
        let (Some(long_entry), Some(short_entry)) = (matched.buy_price, matched.sell_price) else {
            return Ok(None);
        };
        let contracts = matched.contracts();
        if contracts < self.config.min_open_volume {
            debug!(%pair, contracts, "matched volume below minimum");
            return Ok(None);
        }
        let volume = contracts.min(self.config.max_order_volume);

        let Some(long) = instruments.get(&pair.long) else {
            return Err(DepthError::UnknownInstrument(pair.long.clone()));
        };

        // Target spread after convergence: only part of the deviation is assumed to revert
        let spread = long_entry - short_entry;
        let target = entry.mean + (spread - entry.mean) * self.config.resilience;
        let input = ConvergenceInput {
            long_entry,
            short_entry,
            gap: target - spread,
            contract_value: long.contract_value,
            volume,
            fee_rate: self.config.fee_rate,
        };
        let expected_profit = worst_case_profit(&input, self.config.profit_samples, &mut *self.rng.lock());
        if expected_profit < self.config.min_profit {
            debug!(%pair, %expected_profit, min_profit = %self.config.min_profit, "expected profit below minimum");
            return Ok(None);
        }

        let long_is_slow = long_is_slow(table, pair)?;
        let slippage = self.config.fast_leg_slippage;
        let (slow, fast) = if long_is_slow {
            let passive = long_depth.best_bid().map_or(long_entry, |level| level.price);
            (
                ArbitrageLeg::new(pair.long.clone(), PositionSide::Long, volume, passive),
                ArbitrageLeg::new(
                    pair.short.clone(),
                    PositionSide::Short,
                    volume,
                    short_entry * (Decimal::ONE - slippage),
                ),
            )
        } else {
            let passive = short_depth.best_ask().map_or(short_entry, |level| level.price);
            (
                ArbitrageLeg::new(pair.short.clone(), PositionSide::Short, volume, passive),
                ArbitrageLeg::new(
                    pair.long.clone(),
                    PositionSide::Long,
                    volume,
                    long_entry * (Decimal::ONE + slippage),
                ),
            )
        };

        Ok(Some(ArbitragePlan {
            pair: pair.clone(),
            slow,
            fast,
            close_gap: -target,
            z_score: entry.z_score,
            expected_profit,
            strategy,
        }))
    }
}

/// Whether the long leg moves slower than the short leg.
///
/// The long leg is bought at the ask and the short leg sold at the bid, so those are the
/// sides measured. Ties go to the lower instrument id.
pub fn long_is_slow(table: &DepthTable, pair: &InstrumentPair) -> Result<bool, DepthError> {
    let long_speed = table.price_speed(&pair.long, BookSide::Ask)?.abs();
    let short_speed = table.price_speed(&pair.short, BookSide::Bid)?.abs();

    Ok(match long_speed.cmp(&short_speed) {
        std::cmp::Ordering::Less => true,
        std::cmp::Ordering::Greater => false,
        std::cmp::Ordering::Equal => pair.long < pair.short,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use calendar_instrument::{ExpiryClass, Instrument, InstrumentId};
    use chrono::{DateTime, TimeDelta, Utc};
    use rust_decimal_macros::dec;

    pub fn instruments() -> Instruments {
        let expiry = DateTime::<Utc>::MAX_UTC;
        Instruments::builder()
            .add_instrument(Instrument::new(
                InstrumentId::from("W"),
                "BTC-USD".into(),
                ExpiryClass::Near,
                expiry,
                dec!(100),
                dec!(10),
            ))
            .add_instrument(Instrument::new(
                InstrumentId::from("Q"),
                "BTC-USD".into(),
                ExpiryClass::Far,
                expiry,
                dec!(100),
                dec!(10),
            ))
            .build()
    }

    pub fn time(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap() + TimeDelta::seconds(secs)
    }

    /// Table where `ask(W) - bid(Q)` alternates 19/21 around a mean of 20 with a standard
    /// deviation of 1, then moves to `w_ask - 100` on the latest row.
    ///
    /// Q quotes 100/101 throughout, so Q has zero price speed.
    pub fn dislocated_table(config: &ArbitrageConfig, w_ask: Decimal) -> DepthTable {
        let instruments = instruments();
        let mut table = DepthTable::new(&instruments, config.depth_table());
        let w = InstrumentId::from("W");
        let q = InstrumentId::from("Q");

        for second in 0..=10 {
            let ask = match second {
                10 => w_ask,
                odd if odd % 2 == 1 => dec!(121),
                _ => dec!(119),
            };
            table
                .update(&q, [(dec!(101), dec!(5))], [(dec!(100), dec!(5))], time(second))
                .unwrap();
            table
                .update(&w, [(ask, dec!(5))], [(ask - dec!(1), dec!(5))], time(second))
                .unwrap();
        }
        table
    }

    #[test]
    fn test_dislocated_table_statistics() {
        let config = ArbitrageConfig::default();
        let table = dislocated_table(&config, dec!(110));
        let w = InstrumentId::from("W");
        let q = InstrumentId::from("Q");

        assert_eq!(table.spread(&w, &q).unwrap(), dec!(10));
        assert_eq!(table.historical_mean_spread(&w, &q).unwrap(), dec!(20));
        assert_eq!(table.z_score(&w, &q).unwrap(), dec!(-10));
    }

    #[test]
    fn test_tie_break_lower_id_is_slow() {
        let config = ArbitrageConfig::default();
        let instruments = instruments();
        let mut table = DepthTable::new(&instruments, config.depth_table());
        let w = InstrumentId::from("W");
        let q = InstrumentId::from("Q");
        table.update(&w, [(dec!(81), dec!(1))], [(dec!(80), dec!(1))], time(0)).unwrap();
        table.update(&q, [(dec!(101), dec!(1))], [(dec!(100), dec!(1))], time(0)).unwrap();

        // Both speeds are zero: "Q" < "W"
        let pair = InstrumentPair::new(w.clone(), q.clone()).unwrap();
        assert!(!long_is_slow(&table, &pair).unwrap());
        assert!(long_is_slow(&table, &pair.reversed()).unwrap());
    }

    #[test]
    fn test_slower_instrument_is_slow() {
        let config = ArbitrageConfig::default();
        let instruments = instruments();
        let mut table = DepthTable::new(&instruments, config.depth_table());
        let w = InstrumentId::from("W");
        let q = InstrumentId::from("Q");
        table.update(&q, [(dec!(101), dec!(1))], [(dec!(100), dec!(1))], time(0)).unwrap();
        table.update(&w, [(dec!(81), dec!(1))], [(dec!(80), dec!(1))], time(0)).unwrap();
        table.update(&w, [(dec!(85), dec!(1))], [(dec!(84), dec!(1))], time(2)).unwrap();

        // W moves, Q does not: Q is slow regardless of role
        let pair = InstrumentPair::new(w.clone(), q.clone()).unwrap();
        assert!(!long_is_slow(&table, &pair).unwrap());
        let pair = InstrumentPair::new(q, w).unwrap();
        assert!(long_is_slow(&table, &pair).unwrap());
    }
}
