use crate::books::Level;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

/// Volume available when buying one book while selling another.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct MatchedVolume {
    pub volume: Decimal,
    /// Worst (highest) price reached on the buy ladder.
    pub buy_price: Option<Decimal>,
    /// Worst (lowest) price reached on the sell ladder.
    pub sell_price: Option<Decimal>,
}

impl MatchedVolume {
    /// Matched volume floored to whole contracts.
    pub fn contracts(&self) -> u32 {
        self.volume.floor().to_u32().unwrap_or(0)
    }
}

/// Walk `buys` (asks taken, ascending) against `sells` (bids hit, descending), accumulating
/// the overlapping volume while `accept(buy_price, sell_price)` holds.
///
/// Each step consumes the smaller remaining amount of the two current levels. Because the
/// buy price only rises and the sell price only falls as the walk proceeds, the first
/// rejected pair ends the walk.
pub fn matched_volume<F>(buys: &[Level], sells: &[Level], accept: F) -> MatchedVolume
where
    F: Fn(Decimal, Decimal) -> bool,
{
    let mut matched = MatchedVolume::default();

    let (mut buy_index, mut sell_index) = (0, 0);
    let (mut buy_left, mut sell_left) = match (buys.first(), sells.first()) {
        (Some(buy), Some(sell)) => (buy.amount, sell.amount),
        _ => return matched,
    };

    while buy_index < buys.len() && sell_index < sells.len() {
        let buy = buys[buy_index];
        let sell = sells[sell_index];
        if !accept(buy.price, sell.price) {
            break;
        }

        let quantity = buy_left.min(sell_left);
        matched.volume += quantity;
        matched.buy_price = Some(buy.price);
        matched.sell_price = Some(sell.price);

        buy_left -= quantity;
        sell_left -= quantity;

        if buy_left.is_zero() {
            buy_index += 1;
            buy_left = buys.get(buy_index).map(|level| level.amount).unwrap_or_default();
        }
        if sell_left.is_zero() {
            sell_index += 1;
            sell_left = sells.get(sell_index).map(|level| level.amount).unwrap_or_default();
        }
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn levels(levels: &[(Decimal, Decimal)]) -> Vec<Level> {
        levels.iter().copied().map(Level::from).collect()
    }

    #[test]
    fn test_matched_volume_accumulates_minimum_overlap() {
        let buys = levels(&[(dec!(100), dec!(3)), (dec!(101), dec!(5)), (dec!(103), dec!(10))]);
        let sells = levels(&[(dec!(105), dec!(4)), (dec!(104), dec!(2)), (dec!(99), dec!(10))]);

        // Accept while buying is at least 2 cheaper than selling
        let matched = matched_volume(&buys, &sells, |buy, sell| sell - buy >= dec!(2));

        // 3 @ (100, 105), 1 @ (101, 105), 2 @ (101, 104), then (101, 99) is rejected
        assert_eq!(matched.volume, dec!(6));
        assert_eq!(matched.buy_price, Some(dec!(101)));
        assert_eq!(matched.sell_price, Some(dec!(104)));
        assert_eq!(matched.contracts(), 6);
    }

    #[test]
    fn test_matched_volume_rejects_top_of_book() {
        let buys = levels(&[(dec!(100), dec!(3))]);
        let sells = levels(&[(dec!(99), dec!(3))]);

        let matched = matched_volume(&buys, &sells, |buy, sell| sell > buy);
        assert_eq!(matched, MatchedVolume::default());
    }

    #[test]
    fn test_matched_volume_exhausts_ladders() {
        let buys = levels(&[(dec!(1), dec!(2)), (dec!(2), dec!(2))]);
        let sells = levels(&[(dec!(9), dec!(1.5))]);

        let matched = matched_volume(&buys, &sells, |_, _| true);
        assert_eq!(matched.volume, dec!(1.5));
        assert_eq!(matched.contracts(), 1);

        assert_eq!(matched_volume(&[], &sells, |_, _| true).volume, Decimal::ZERO);
    }
}
