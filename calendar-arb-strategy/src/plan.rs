use crate::config::StrategyKind;
use calendar_instrument::{InstrumentId, InstrumentPair, OrderAction, PositionSide};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One side of a prospective or live arbitrage position.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize, Constructor)]
pub struct ArbitrageLeg {
    pub instrument: InstrumentId,
    pub side: PositionSide,
    /// Number of contracts.
    pub volume: u32,
    /// Opening limit price.
    pub price: Decimal,
}

impl ArbitrageLeg {
    pub fn open_action(&self) -> OrderAction {
        OrderAction::open(self.side)
    }

    pub fn close_action(&self) -> OrderAction {
        OrderAction::close(self.side)
    }

    pub fn is_long(&self) -> bool {
        self.side == PositionSide::Long
    }
}

/// Decision of a [`TriggerStrategy`](crate::strategy::TriggerStrategy) to open a position.
///
/// The slow leg is opened first as a passive limit order. The fast leg is opened only once
/// the slow leg has filled.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
pub struct ArbitragePlan {
    pub pair: InstrumentPair,
    pub slow: ArbitrageLeg,
    pub fast: ArbitrageLeg,
    /// Close both legs once `ask(short) - bid(long)` is at or below this threshold.
    pub close_gap: Decimal,
    /// Standard score of the opening spread, kept for audit.
    pub z_score: Decimal,
    /// Worst-case net profit over the simulated convergence paths.
    pub expected_profit: Decimal,
    pub strategy: StrategyKind,
}

impl ArbitragePlan {
    pub fn long_leg(&self) -> &ArbitrageLeg {
        if self.slow.is_long() { &self.slow } else { &self.fast }
    }

    pub fn short_leg(&self) -> &ArbitrageLeg {
        if self.slow.is_long() { &self.fast } else { &self.slow }
    }

    pub fn volume(&self) -> u32 {
        self.slow.volume
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_plan_leg_roles() {
        let plan = ArbitragePlan {
            pair: InstrumentPair::new("W".into(), "Q".into()).unwrap(),
            slow: ArbitrageLeg::new("Q".into(), PositionSide::Short, 2, dec!(100)),
            fast: ArbitrageLeg::new("W".into(), PositionSide::Long, 2, dec!(80)),
            close_gap: dec!(-15),
            z_score: dec!(-3),
            expected_profit: dec!(1),
            strategy: StrategyKind::MeanReversion,
        };

        assert_eq!(plan.long_leg().instrument, InstrumentId::from("W"));
        assert_eq!(plan.short_leg().instrument, InstrumentId::from("Q"));
        assert_eq!(plan.slow.open_action(), OrderAction::OpenShort);
        assert_eq!(plan.fast.close_action(), OrderAction::CloseLong);
        assert_eq!(plan.volume(), 2);
    }
}
