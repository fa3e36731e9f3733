use super::{Entry, Planner, TriggerStrategy};
use crate::config::{ArbitrageConfig, StrategyKind};
use calendar_data::{depth::DepthTable, error::DepthError};
use calendar_instrument::InstrumentPair;
use tracing::trace;

/// Opens when the latest spread sits at least `z_score_threshold` standard deviations below
/// its historical mean.
///
/// Depth is taken up to `mean - z_score_threshold * std`.
#[derive(Debug)]
pub struct MeanReversionTrigger {
    planner: Planner,
}

impl MeanReversionTrigger {
    pub fn new(config: ArbitrageConfig) -> Self {
        Self {
            planner: Planner::new(config),
        }
    }
}

impl TriggerStrategy for MeanReversionTrigger {
    fn kind(&self) -> StrategyKind {
        StrategyKind::MeanReversion
    }

    fn entry(&self, table: &DepthTable, pair: &InstrumentPair) -> Result<Option<Entry>, DepthError> {
        let threshold = self.planner.config().z_score_threshold;
        let series = table.series(&pair.long, &pair.short)?;
        let z_score = series.z_score()?;

        if -z_score < threshold {
            trace!(%pair, %z_score, "spread within band");
            return Ok(None);
        }

        let mean = series.historical_mean()?;
        let std = series.historical_std()?;
        Ok(Some(Entry {
            mean,
            limit: mean - threshold * std,
            z_score,
        }))
    }

    fn planner(&self) -> &Planner {
        &self.planner
    }
}
