use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Matched volume walking two [`MarketDepth`] ladders against each other.
pub mod matched;

pub use matched::{MatchedVolume, matched_volume};

/// Number of price levels per side consumed from each depth snapshot.
pub const DEPTH_LEVELS: usize = 5;

/// Normalised order book [`Level`].
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Deserialize, Serialize, Constructor)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
}

impl From<(Decimal, Decimal)> for Level {
    fn from((price, amount): (Decimal, Decimal)) -> Self {
        Self::new(price, amount)
    }
}

/// Live order book depth for one instrument.
///
/// Asks are sorted ascending by price and bids descending by price, so index 0 of each
/// side is the top of book. Levels with zero amount are discarded.
#[derive(Clone, Eq, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct MarketDepth {
    time: DateTime<Utc>,
    asks: Vec<Level>,
    bids: Vec<Level>,
}

impl MarketDepth {
    pub fn new<IterAsks, IterBids, L>(time: DateTime<Utc>, asks: IterAsks, bids: IterBids) -> Self
    where
        IterAsks: IntoIterator<Item = L>,
        IterBids: IntoIterator<Item = L>,
        L: Into<Level>,
    {
        let mut asks = asks
            .into_iter()
            .map(L::into)
            .filter(|level| level.amount > Decimal::ZERO)
            .collect::<Vec<_>>();
        let mut bids = bids
            .into_iter()
            .map(L::into)
            .filter(|level| level.amount > Decimal::ZERO)
            .collect::<Vec<_>>();

        asks.sort_by(|a, b| a.price.cmp(&b.price));
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.truncate(DEPTH_LEVELS);
        bids.truncate(DEPTH_LEVELS);

        Self { time, asks, bids }
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Ask levels, ascending by price.
    pub fn asks(&self) -> &[Level] {
        &self.asks
    }

    /// Bid levels, descending by price.
    pub fn bids(&self) -> &[Level] {
        &self.bids
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    /// Whether both sides hold at least one level.
    pub fn is_two_sided(&self) -> bool {
        !self.asks.is_empty() && !self.bids.is_empty()
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_ask(), self.best_bid()) {
            (Some(ask), Some(bid)) => Some((ask.price + bid.price) / Decimal::TWO),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_market_depth_sorts_sides() {
        let depth = MarketDepth::new(
            Utc::now(),
            [(dec!(102), dec!(1)), (dec!(100), dec!(2)), (dec!(101), dec!(3))],
            [(dec!(97), dec!(1)), (dec!(99), dec!(2)), (dec!(98), dec!(3))],
        );

        let ask_prices = depth.asks().iter().map(|level| level.price).collect::<Vec<_>>();
        let bid_prices = depth.bids().iter().map(|level| level.price).collect::<Vec<_>>();

        assert_eq!(ask_prices, vec![dec!(100), dec!(101), dec!(102)]);
        assert_eq!(bid_prices, vec![dec!(99), dec!(98), dec!(97)]);
        assert_eq!(depth.best_ask(), Some(Level::new(dec!(100), dec!(2))));
        assert_eq!(depth.best_bid(), Some(Level::new(dec!(99), dec!(2))));
        assert_eq!(depth.mid_price(), Some(dec!(99.5)));
    }

    #[test]
    fn test_market_depth_sorted_for_any_input_order() {
        let inputs = [
            vec![dec!(5), dec!(1), dec!(4), dec!(2), dec!(3)],
            vec![dec!(1), dec!(2), dec!(3)],
            vec![dec!(3), dec!(3), dec!(1)],
            vec![],
        ];

        for prices in inputs {
            let levels = prices.iter().map(|price| (*price, dec!(1))).collect::<Vec<_>>();
            let depth = MarketDepth::new(Utc::now(), levels.clone(), levels);

            assert!(depth.asks().windows(2).all(|pair| pair[0].price <= pair[1].price));
            assert!(depth.bids().windows(2).all(|pair| pair[0].price >= pair[1].price));
        }
    }

    #[test]
    fn test_market_depth_drops_empty_levels_and_truncates() {
        let asks = (1..=8).map(|price| (Decimal::from(price), dec!(1)));
        let bids = [(dec!(0.5), dec!(0)), (dec!(0.4), dec!(1))];
        let depth = MarketDepth::new(Utc::now(), asks, bids);

        assert_eq!(depth.asks().len(), DEPTH_LEVELS);
        assert_eq!(depth.bids(), &[Level::new(dec!(0.4), dec!(1))]);
        assert!(depth.is_two_sided());
        assert!(!MarketDepth::default().is_two_sided());
    }
}
