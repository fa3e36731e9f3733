//! Rolling market depth model.
//!
//! [`DepthTable`] keeps the latest [`MarketDepth`] of every tracked instrument and, once
//! every instrument has reported a two-sided book (ramp-up), appends one row per update
//! holding every ordered pairwise spread `ask(A) - bid(B)`. Rows older than the spread
//! window are evicted on every append.

use crate::{
    books::{Level, MarketDepth},
    error::DepthError,
};
use calendar_instrument::{BookSide, InstrumentId, InstrumentPair, Instruments};
use chrono::{DateTime, TimeDelta, Utc};
use fnv::FnvHashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Rolling [`SpreadSeries`](series::SpreadSeries) for one ordered instrument pair.
pub mod series;

pub use series::{SpreadPoint, SpreadSeries};

/// Window configuration for a [`DepthTable`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct DepthTableConfig {
    /// Time window of spread rows retained for mean and standard score.
    pub spread_window_secs: u64,
    /// Time window of top-of-book quotes used for price speed.
    pub speed_window_secs: u64,
}

impl Default for DepthTableConfig {
    fn default() -> Self {
        Self {
            spread_window_secs: 300,
            speed_window_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Quote {
    time: DateTime<Utc>,
    ask: Decimal,
    bid: Decimal,
}

/// Latest depth of every instrument plus the rolling pairwise spread table.
#[derive(Debug)]
pub struct DepthTable {
    spread_window: TimeDelta,
    speed_window: TimeDelta,
    instruments: Vec<InstrumentId>,
    books: FnvHashMap<InstrumentId, MarketDepth>,
    quotes: FnvHashMap<InstrumentId, VecDeque<Quote>>,
    series: FnvHashMap<InstrumentPair, SpreadSeries>,
    last_row: Option<DateTime<Utc>>,
    ready: bool,
}

impl DepthTable {
    pub fn new(instruments: &Instruments, config: DepthTableConfig) -> Self {
        let series = instruments
            .pairs()
            .into_iter()
            .map(|pair| (pair, SpreadSeries::default()))
            .collect();

        Self {
            spread_window: TimeDelta::seconds(config.spread_window_secs as i64),
            speed_window: TimeDelta::seconds(config.speed_window_secs as i64),
            instruments: instruments.ids().cloned().collect(),
            books: FnvHashMap::default(),
            quotes: FnvHashMap::default(),
            series,
            last_row: None,
            ready: false,
        }
    }

    /// Ingest a raw depth snapshot. See [`DepthTable::apply`].
    pub fn update<IterAsks, IterBids, L>(
        &mut self,
        instrument: &InstrumentId,
        asks: IterAsks,
        bids: IterBids,
        time: DateTime<Utc>,
    ) -> Result<bool, DepthError>
    where
        IterAsks: IntoIterator<Item = L>,
        IterBids: IntoIterator<Item = L>,
        L: Into<Level>,
    {
        self.apply(instrument, MarketDepth::new(time, asks, bids))
    }

    /// Store the latest [`MarketDepth`] for `instrument`.
    ///
    /// Returns `true` if the update completed a snapshot and a spread row was appended.
    pub fn apply(&mut self, instrument: &InstrumentId, depth: MarketDepth) -> Result<bool, DepthError> {
        if !self.instruments.contains(instrument) {
            return Err(DepthError::UnknownInstrument(instrument.clone()));
        }

        let time = depth.time();
        if let (Some(ask), Some(bid)) = (depth.best_ask(), depth.best_bid()) {
            let quotes = self.quotes.entry(instrument.clone()).or_default();
            quotes.push_back(Quote {
                time,
                ask: ask.price,
                bid: bid.price,
            });
            let cutoff = time - self.speed_window;
            while quotes.front().is_some_and(|quote| quote.time < cutoff) {
                quotes.pop_front();
            }
        }
        self.books.insert(instrument.clone(), depth);

        if !self.ready {
            self.ready = self.instruments.iter().all(|id| {
                self.books
                    .get(id)
                    .is_some_and(MarketDepth::is_two_sided)
            });
            if !self.ready {
                debug!(%instrument, reported = self.books.len(), "depth ramp-up in progress");
                return Ok(false);
            }
            info!(instruments = self.instruments.len(), "depth ramp-up complete");
        }

        self.append_row(time)
    }

    fn append_row(&mut self, time: DateTime<Utc>) -> Result<bool, DepthError> {
        let mut spreads = Vec::with_capacity(self.series.len());
        for pair in self.series.keys() {
            let ask = self.books.get(&pair.long).and_then(MarketDepth::best_ask);
            let bid = self.books.get(&pair.short).and_then(MarketDepth::best_bid);
            match (ask, bid) {
                (Some(ask), Some(bid)) => spreads.push((pair.clone(), ask.price - bid.price)),
                // An instrument reported a one-sided book, the snapshot is incomplete
                _ => return Ok(false),
            }
        }

        // Rows are time ordered even if exchange timestamps across instruments are not
        let time = self.last_row.map_or(time, |last| last.max(time));
        let cutoff = time - self.spread_window;
        for (pair, spread) in spreads {
            if let Some(series) = self.series.get_mut(&pair) {
                series.push(time, spread);
                series.evict_before(cutoff);
            }
        }
        self.last_row = Some(time);

        Ok(true)
    }

    /// Whether every instrument has reported at least one two-sided book.
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn instruments(&self) -> &[InstrumentId] {
        &self.instruments
    }

    /// Number of spread rows currently inside the window.
    pub fn rows(&self) -> usize {
        self.series.values().next().map_or(0, SpreadSeries::len)
    }

    /// Rolling [`SpreadSeries`] of `ask(long) - bid(short)`.
    pub fn series(&self, long: &InstrumentId, short: &InstrumentId) -> Result<&SpreadSeries, DepthError> {
        if !self.ready {
            return Err(DepthError::NotReady);
        }
        let pair = InstrumentPair::new(long.clone(), short.clone())
            .map_err(|_| DepthError::UnknownInstrument(long.clone()))?;

        self.series.get(&pair).ok_or_else(|| {
            let unknown = if self.instruments.contains(long) { short } else { long };
            DepthError::UnknownInstrument(unknown.clone())
        })
    }

    /// Latest `ask(long) - bid(short)`.
    pub fn spread(&self, long: &InstrumentId, short: &InstrumentId) -> Result<Decimal, DepthError> {
        let series = self.series(long, short)?;
        series
            .latest()
            .ok_or(DepthError::InsufficientHistory { rows: 0 })
    }

    /// Mean spread over the window, excluding the latest row.
    pub fn historical_mean_spread(
        &self,
        long: &InstrumentId,
        short: &InstrumentId,
    ) -> Result<Decimal, DepthError> {
        self.series(long, short)?.historical_mean()
    }

    /// Latest spread minus the historical mean spread.
    pub fn deviation(&self, long: &InstrumentId, short: &InstrumentId) -> Result<Decimal, DepthError> {
        let series = self.series(long, short)?;
        let mean = series.historical_mean()?;
        Ok(series.latest().unwrap_or(mean) - mean)
    }

    /// Standard score of the latest spread against the window history.
    pub fn z_score(&self, long: &InstrumentId, short: &InstrumentId) -> Result<Decimal, DepthError> {
        self.series(long, short)?.z_score()
    }

    /// First-difference slope of the top-of-book `side` price over the speed window, in
    /// price units per second. Zero when the window spans no time.
    pub fn price_speed(&self, instrument: &InstrumentId, side: BookSide) -> Result<Decimal, DepthError> {
        if !self.instruments.contains(instrument) {
            return Err(DepthError::UnknownInstrument(instrument.clone()));
        }
        if !self.ready {
            return Err(DepthError::NotReady);
        }

        let Some((first, last)) = self
            .quotes
            .get(instrument)
            .and_then(|quotes| quotes.front().zip(quotes.back()))
        else {
            return Err(DepthError::NotReady);
        };

        let span_ms = (last.time - first.time).num_milliseconds();
        if span_ms <= 0 {
            return Ok(Decimal::ZERO);
        }

        let delta = match side {
            BookSide::Ask => last.ask - first.ask,
            BookSide::Bid => last.bid - first.bid,
        };
        Ok(delta * Decimal::from(1_000) / Decimal::from(span_ms))
    }

    /// Latest [`MarketDepth`] for `instrument`.
    pub fn market_depth(&self, instrument: &InstrumentId) -> Result<&MarketDepth, DepthError> {
        if !self.instruments.contains(instrument) {
            return Err(DepthError::UnknownInstrument(instrument.clone()));
        }
        self.books.get(instrument).ok_or(DepthError::NotReady)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use calendar_instrument::{ExpiryClass, Instrument};
    use rust_decimal_macros::dec;
    use smol_str::SmolStr;

    fn instruments() -> Instruments {
        let instrument = |id: &str, class| {
            Instrument::new(
                InstrumentId::from(id),
                SmolStr::new("BTC-USD"),
                class,
                Utc::now(),
                dec!(100),
                dec!(10),
            )
        };
        Instruments::builder()
            .add_instrument(instrument("A", ExpiryClass::Near))
            .add_instrument(instrument("B", ExpiryClass::Far))
            .build()
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + seconds, 0).unwrap_or_default()
    }

    fn quote(ask: Decimal, bid: Decimal) -> (Vec<(Decimal, Decimal)>, Vec<(Decimal, Decimal)>) {
        (vec![(ask, dec!(10))], vec![(bid, dec!(10))])
    }

    fn update(table: &mut DepthTable, id: &str, ask: Decimal, bid: Decimal, seconds: i64) -> bool {
        let (asks, bids) = quote(ask, bid);
        table.update(&InstrumentId::from(id), asks, bids, at(seconds)).unwrap()
    }

    #[test]
    fn test_ramp_up_gate() {
        let mut table = DepthTable::new(&instruments(), DepthTableConfig::default());
        let (a, b) = (InstrumentId::from("A"), InstrumentId::from("B"));

        assert!(!update(&mut table, "A", dec!(101), dec!(100), 0));
        assert!(!table.is_ready());
        assert_eq!(table.spread(&a, &b), Err(DepthError::NotReady));
        assert_eq!(table.z_score(&a, &b), Err(DepthError::NotReady));
        assert_eq!(table.price_speed(&a, BookSide::Ask), Err(DepthError::NotReady));

        assert!(update(&mut table, "B", dec!(103), dec!(102), 1));
        assert!(table.is_ready());
        assert_eq!(table.rows(), 1);
        assert_eq!(table.spread(&a, &b), Ok(dec!(-1)));
        assert_eq!(table.spread(&b, &a), Ok(dec!(3)));
        assert_eq!(
            table.historical_mean_spread(&a, &b),
            Err(DepthError::InsufficientHistory { rows: 1 })
        );
    }

    #[test]
    fn test_spread_statistics() {
        let mut table = DepthTable::new(&instruments(), DepthTableConfig::default());
        let (a, b) = (InstrumentId::from("A"), InstrumentId::from("B"));

        update(&mut table, "A", dec!(100), dec!(99), 0);
        update(&mut table, "B", dec!(103), dec!(102), 1); // A/B -2
        update(&mut table, "A", dec!(102), dec!(101), 2); // A/B 0
        update(&mut table, "B", dec!(105), dec!(104), 3); // A/B -2

        assert_eq!(table.rows(), 3);
        assert_eq!(table.spread(&a, &b), Ok(dec!(-2)));
        assert_eq!(table.historical_mean_spread(&a, &b), Ok(dec!(-1)));
        assert_eq!(table.deviation(&a, &b), Ok(dec!(-1)));
        assert_eq!(table.z_score(&a, &b), Ok(dec!(-1)));
    }

    #[test]
    fn test_rows_evicted_outside_window() {
        let config = DepthTableConfig {
            spread_window_secs: 10,
            speed_window_secs: 10,
        };
        let mut table = DepthTable::new(&instruments(), config);

        update(&mut table, "A", dec!(101), dec!(100), 0);
        for second in 1..=30 {
            update(&mut table, "B", dec!(103), dec!(102), second);
        }

        // Rows at seconds 20..=30 remain
        assert_eq!(table.rows(), 11);
        let series = table.series(&"A".into(), &"B".into()).unwrap();
        assert!(series.points().all(|point| point.time >= at(20)));
    }

    #[test]
    fn test_price_speed() {
        let mut table = DepthTable::new(&instruments(), DepthTableConfig::default());
        let a = InstrumentId::from("A");

        update(&mut table, "A", dec!(100), dec!(99), 0);
        update(&mut table, "B", dec!(103), dec!(102), 0);
        assert_eq!(table.price_speed(&a, BookSide::Ask), Ok(Decimal::ZERO));

        update(&mut table, "A", dec!(104), dec!(101), 2);
        assert_eq!(table.price_speed(&a, BookSide::Ask), Ok(dec!(2)));
        assert_eq!(table.price_speed(&a, BookSide::Bid), Ok(dec!(1)));
    }

    #[test]
    fn test_unknown_instrument() {
        let mut table = DepthTable::new(&instruments(), DepthTableConfig::default());
        let unknown = InstrumentId::from("Z");
        let (asks, bids) = quote(dec!(1), dec!(1));

        assert_eq!(
            table.update(&unknown, asks, bids, at(0)),
            Err(DepthError::UnknownInstrument(unknown.clone()))
        );
        assert_eq!(
            table.market_depth(&unknown),
            Err(DepthError::UnknownInstrument(unknown))
        );
    }
}
