use crate::error::DepthError;
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One timestamped spread observation.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct SpreadPoint {
    pub time: DateTime<Utc>,
    pub spread: Decimal,
}

/// Rolling time series of `ask(A) - bid(B)` for one ordered instrument pair.
///
/// Historical statistics exclude the latest point, so the latest spread is always compared
/// against the history that preceded it.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct SpreadSeries {
    points: VecDeque<SpreadPoint>,
}

impl SpreadSeries {
    pub fn push(&mut self, time: DateTime<Utc>, spread: Decimal) {
        self.points.push_back(SpreadPoint { time, spread });
    }

    /// Evict every point older than `cutoff`.
    pub fn evict_before(&mut self, cutoff: DateTime<Utc>) {
        while self.points.front().is_some_and(|point| point.time < cutoff) {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = &SpreadPoint> {
        self.points.iter()
    }

    pub fn latest(&self) -> Option<Decimal> {
        self.points.back().map(|point| point.spread)
    }

    /// Time between the oldest and latest point. Zero for a single point.
    pub fn span(&self) -> TimeDelta {
        match (self.points.front(), self.points.back()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => TimeDelta::zero(),
        }
    }

    fn history(&self) -> Result<impl Iterator<Item = Decimal> + '_, DepthError> {
        let rows = self.points.len();
        if rows < 2 {
            return Err(DepthError::InsufficientHistory { rows });
        }
        Ok(self.points.iter().take(rows - 1).map(|point| point.spread))
    }

    /// Mean of every point except the latest.
    pub fn historical_mean(&self) -> Result<Decimal, DepthError> {
        let count = Decimal::from(self.points.len().saturating_sub(1));
        let sum = self.history()?.sum::<Decimal>();
        Ok(sum / count)
    }

    /// Population standard deviation of every point except the latest.
    pub fn historical_std(&self) -> Result<Decimal, DepthError> {
        let mean = self.historical_mean()?;
        let count = Decimal::from(self.points.len().saturating_sub(1));
        let variance = self
            .history()?
            .map(|spread| (spread - mean) * (spread - mean))
            .sum::<Decimal>()
            / count;

        Ok(variance.sqrt().unwrap_or(Decimal::ZERO))
    }

    /// Standard score of the latest point against the history before it.
    ///
    /// Zero when the history has no dispersion.
    pub fn z_score(&self) -> Result<Decimal, DepthError> {
        let mean = self.historical_mean()?;
        let std = self.historical_std()?;
        let latest = self.latest().unwrap_or(mean);

        if std.is_zero() {
            return Ok(Decimal::ZERO);
        }
        Ok((latest - mean) / std)
    }
}
