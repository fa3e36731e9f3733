//! Configuration types for the cross-expiry arbitrage engine.

use crate::error::EngineError;
use calendar_data::depth::DepthTableConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tracing::info;

/// Which trigger decides whether a dislocation is worth trading.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Standard score of the opening spread against its rolling history.
    #[default]
    MeanReversion,
    /// Deviation from the rolling mean as a fraction of price.
    Percentage,
}

/// Configuration for the cross-expiry arbitrage engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ArbitrageConfig {
    pub strategy: StrategyKind,
    /// Minimum `-z` of the opening spread to trigger (mean reversion).
    pub z_score_threshold: Decimal,
    /// Minimum deviation below the mean as a fraction of the long ask (percentage).
    pub percentage_threshold: Decimal,
    /// Fraction of the current deviation assumed to persist at convergence (0 - 1).
    pub resilience: Decimal,
    /// Taker fee rate applied to each of the four legs.
    pub fee_rate: Decimal,
    /// Minimum worst-case net profit in quote currency to open.
    pub min_profit: Decimal,
    /// Minimum matched contracts across both books to open.
    pub min_open_volume: u32,
    /// Minimum matched contracts under the close gap to close.
    pub min_close_volume: u32,
    /// Upper bound on contracts per leg.
    pub max_order_volume: u32,
    /// Price concession of the fast leg limit order, as a fraction of price.
    pub fast_leg_slippage: Decimal,
    /// Random convergence paths simulated on top of the two extreme paths.
    pub profit_samples: u32,
    /// Seed of the convergence path sampler.
    pub profit_seed: u64,
    pub slow_leg_timeout_ms: u64,
    pub fast_leg_timeout_ms: u64,
    pub max_converge_wait_secs: u64,
    /// Opening suppression after a margin rejection.
    pub cooldown_secs: u64,
    pub leverage: Decimal,
    pub spread_window_secs: u64,
    pub speed_window_secs: u64,
    pub max_concurrent_transactions: usize,
    /// Prefix of generated transaction ids.
    pub transaction_prefix: String,
}

impl Default for ArbitrageConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::MeanReversion,
            z_score_threshold: Decimal::new(25, 1),     // 2.5
            percentage_threshold: Decimal::new(5, 4),   // 0.05%
            resilience: Decimal::new(2, 1),             // 0.2
            fee_rate: Decimal::new(5, 4),               // 0.05%
            min_profit: Decimal::ZERO,
            min_open_volume: 1,
            min_close_volume: 1,
            max_order_volume: 10,
            fast_leg_slippage: Decimal::new(5, 4),      // 0.05%
            profit_samples: 16,
            profit_seed: 7,
            slow_leg_timeout_ms: 3_000,
            fast_leg_timeout_ms: 10_000,
            max_converge_wait_secs: 3_600,
            cooldown_secs: 60,
            leverage: Decimal::from(10),
            spread_window_secs: 300,
            speed_window_secs: 10,
            max_concurrent_transactions: 1,
            transaction_prefix: "arb".to_string(),
        }
    }
}

impl ArbitrageConfig {
    /// Load from a JSON file. Missing fields take their default.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        let config = serde_json::from_str(&content)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        info!(path = %path.display(), "arbitrage config loaded");
        Ok(config)
    }

    /// Load from the file named by `ARB_CONFIG`, falling back to defaults if unset.
    pub fn from_env() -> Result<Self, EngineError> {
        match std::env::var("ARB_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn slow_leg_timeout(&self) -> Duration {
        Duration::from_millis(self.slow_leg_timeout_ms)
    }

    pub fn fast_leg_timeout(&self) -> Duration {
        Duration::from_millis(self.fast_leg_timeout_ms)
    }

    pub fn max_converge_wait(&self) -> Duration {
        Duration::from_secs(self.max_converge_wait_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn depth_table(&self) -> DepthTableConfig {
        DepthTableConfig {
            spread_window_secs: self.spread_window_secs,
            speed_window_secs: self.speed_window_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = ArbitrageConfig::default();
        assert_eq!(config.strategy, StrategyKind::MeanReversion);
        assert_eq!(config.z_score_threshold, dec!(2.5));
        assert_eq!(config.fee_rate, dec!(0.0005));
        assert_eq!(config.slow_leg_timeout(), Duration::from_secs(3));
        assert_eq!(config.cooldown(), Duration::from_secs(60));
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: ArbitrageConfig = serde_json::from_str(
            r#"{ "strategy": "percentage", "percentage_threshold": "0.001", "max_order_volume": 3 }"#,
        )
        .unwrap();

        assert_eq!(config.strategy, StrategyKind::Percentage);
        assert_eq!(config.percentage_threshold, dec!(0.001));
        assert_eq!(config.max_order_volume, 3);
        assert_eq!(config.resilience, dec!(0.2));
        assert_eq!(config.depth_table().spread_window_secs, 300);
    }

    #[test]
    fn test_from_file_missing() {
        let error = ArbitrageConfig::from_file("/definitely/not/here.json").unwrap_err();
        assert!(matches!(error, EngineError::Config(_)));
    }
}
