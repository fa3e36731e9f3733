//! Fee and PnL arithmetic for delivery futures legs.
//!
//! Amounts are in quote currency. A contract's notional is its contract value, so a leg of
//! `volume` contracts carries `volume * contract_value` of notional regardless of price.

use rust_decimal::Decimal;

/// Fee and PnL calculator for futures legs.
pub struct FeeCalculator;

impl FeeCalculator {
    /// Taker fee on one fill.
    ///
    /// Formula: fee_rate * volume * contract_value
    ///
    /// # Arguments
    /// * `fee_rate` - Taker fee rate (e.g., 0.0005 = 0.05%)
    /// * `contract_value` - Face value of one contract in quote currency
    /// * `volume` - Number of contracts
    pub fn taker_fee(fee_rate: Decimal, contract_value: Decimal, volume: u32) -> Decimal {
        fee_rate * Decimal::from(volume) * contract_value
    }

    /// Fees of a full arbitrage cycle: both legs opened and both legs closed.
    pub fn round_trip_fee(fee_rate: Decimal, contract_value: Decimal, volume: u32) -> Decimal {
        Decimal::from(4) * Self::taker_fee(fee_rate, contract_value, volume)
    }

    /// PnL of one leg whose price moves `price_move` in the position's favour after entering
    /// at `entry`.
    ///
    /// Formula: volume * contract_value * price_move / entry
    ///
    /// # Returns
    /// Zero if `entry` is not positive.
    pub fn leg_pnl(contract_value: Decimal, volume: u32, entry: Decimal, price_move: Decimal) -> Decimal {
        if entry <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        Decimal::from(volume) * contract_value * price_move / entry
    }

    /// Net PnL of a two-leg cycle where the long leg captures `long_move` and the short leg
    /// captures `short_move`, after all four fees.
    pub fn net_profit(
        fee_rate: Decimal,
        contract_value: Decimal,
        volume: u32,
        long_entry: Decimal,
        long_move: Decimal,
        short_entry: Decimal,
        short_move: Decimal,
    ) -> Decimal {
        Self::leg_pnl(contract_value, volume, long_entry, long_move)
            + Self::leg_pnl(contract_value, volume, short_entry, short_move)
            - Self::round_trip_fee(fee_rate, contract_value, volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_taker_fee() {
        // 0.0005 * 10 * 100 = 0.5
        assert_eq!(FeeCalculator::taker_fee(dec!(0.0005), dec!(100), 10), dec!(0.5));
    }

    #[test]
    fn test_round_trip_fee() {
        // 4 * 0.5
        assert_eq!(FeeCalculator::round_trip_fee(dec!(0.0005), dec!(100), 10), dec!(2.0));
    }

    #[test]
    fn test_leg_pnl() {
        // 10 contracts of 100 USD, price 50_000 -> 50_100
        // 10 * 100 * 100 / 50_000 = 2
        assert_eq!(FeeCalculator::leg_pnl(dec!(100), 10, dec!(50000), dec!(100)), dec!(2));
        assert_eq!(FeeCalculator::leg_pnl(dec!(100), 10, dec!(0), dec!(100)), dec!(0));
    }

    #[test]
    fn test_net_profit() {
        // long captures 100 @ 50_000 (2), short captures 0 (0), fees 2
        let profit = FeeCalculator::net_profit(
            dec!(0.0005),
            dec!(100),
            10,
            dec!(50000),
            dec!(100),
            dec!(49900),
            dec!(0),
        );
        assert_eq!(profit, dec!(0));
    }
}
