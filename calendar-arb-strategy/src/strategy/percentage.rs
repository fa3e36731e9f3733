use super::{Entry, Planner, TriggerStrategy};
use crate::config::{ArbitrageConfig, StrategyKind};
use calendar_data::{depth::DepthTable, error::DepthError};
use calendar_instrument::InstrumentPair;
use tracing::trace;

/// Opens when the latest spread sits below its historical mean by at least
/// `percentage_threshold` of the long leg's best ask.
///
/// Less sensitive than [`MeanReversionTrigger`](super::MeanReversionTrigger) to a quiet
/// history, where a tiny standard deviation inflates the standard score.
#[derive(Debug)]
pub struct PercentageTrigger {
    planner: Planner,
}

impl PercentageTrigger {
    pub fn new(config: ArbitrageConfig) -> Self {
        Self {
            planner: Planner::new(config),
        }
    }
}

impl TriggerStrategy for PercentageTrigger {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Percentage
    }

    fn entry(&self, table: &DepthTable, pair: &InstrumentPair) -> Result<Option<Entry>, DepthError> {
        let series = table.series(&pair.long, &pair.short)?;
        let mean = series.historical_mean()?;
        let z_score = series.z_score()?;
        let Some(spread) = series.latest() else {
            return Err(DepthError::InsufficientHistory { rows: 0 });
        };
        let Some(ask) = table.market_depth(&pair.long)?.best_ask() else {
            return Ok(None);
        };

        let band = ask.price * self.planner.config().percentage_threshold;
        if mean - spread < band {
            trace!(%pair, %spread, %mean, %band, "spread within band");
            return Ok(None);
        }

        Ok(Some(Entry {
            mean,
            limit: mean - band,
            z_score,
        }))
    }

    fn planner(&self) -> &Planner {
        &self.planner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::tests::{dislocated_table, instruments};
    use calendar_instrument::InstrumentId;
    use rust_decimal_macros::dec;

    fn config(percentage_threshold: rust_decimal::Decimal) -> ArbitrageConfig {
        ArbitrageConfig {
            strategy: StrategyKind::Percentage,
            percentage_threshold,
            ..ArbitrageConfig::default()
        }
    }

    fn pair() -> InstrumentPair {
        InstrumentPair::new(InstrumentId::from("W"), InstrumentId::from("Q")).unwrap()
    }

    #[test]
    fn test_entry_band_scales_with_price() {
        // deviation 10 at ask 110
        let config = config(dec!(0.05));
        let table = dislocated_table(&config, dec!(110));
        let trigger = PercentageTrigger::new(config);

        let entry = trigger.entry(&table, &pair()).unwrap().unwrap();
        // band = 110 * 0.05 = 5.5
        assert_eq!(entry.limit, dec!(14.5));
        assert_eq!(entry.mean, dec!(20));

        let plan = trigger.plan(&table, &instruments(), &pair()).unwrap().unwrap();
        assert_eq!(plan.strategy, StrategyKind::Percentage);
        assert_eq!(plan.close_gap, dec!(-18));
    }

    #[test]
    fn test_no_entry_below_band() {
        // band = 110 * 0.1 = 11 > deviation 10
        let config = config(dec!(0.1));
        let table = dislocated_table(&config, dec!(110));
        let trigger = PercentageTrigger::new(config);

        assert_eq!(trigger.entry(&table, &pair()).unwrap(), None);
    }
}
