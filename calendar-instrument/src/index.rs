use crate::instrument::{Instrument, InstrumentId};
use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// Errors generated when looking up instruments or building pairs.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum IndexError {
    #[error("unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),

    #[error("instrument pair requires distinct instruments, got {0} twice")]
    SameInstrument(InstrumentId),
}

/// Immutable set of tradeable [`Instrument`]s, built once from exchange metadata.
///
/// Iteration order is insertion order, which keeps pair evaluation deterministic.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize, Serialize)]
pub struct Instruments {
    instruments: IndexMap<InstrumentId, Instrument>,
}

impl Instruments {
    pub fn builder() -> InstrumentsBuilder {
        InstrumentsBuilder::default()
    }

    pub fn get(&self, id: &InstrumentId) -> Option<&Instrument> {
        self.instruments.get(id)
    }

    /// Find an [`Instrument`], returning an [`IndexError`] if it is not part of the set.
    pub fn find(&self, id: &InstrumentId) -> Result<&Instrument, IndexError> {
        self.get(id)
            .ok_or_else(|| IndexError::UnknownInstrument(id.clone()))
    }

    pub fn contains(&self, id: &InstrumentId) -> bool {
        self.instruments.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &InstrumentId> {
        self.instruments.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    /// Every ordered (long, short) pair of distinct instruments.
    pub fn pairs(&self) -> Vec<InstrumentPair> {
        self.instruments
            .keys()
            .permutations(2)
            .map(|pair| InstrumentPair {
                long: pair[0].clone(),
                short: pair[1].clone(),
            })
            .collect()
    }
}

/// Builder for [`Instruments`].
#[derive(Debug, Default)]
pub struct InstrumentsBuilder {
    instruments: IndexMap<InstrumentId, Instrument>,
}

impl InstrumentsBuilder {
    /// Add an [`Instrument`], replacing any previous instrument with the same id.
    pub fn add_instrument(mut self, instrument: Instrument) -> Self {
        self.instruments.insert(instrument.id.clone(), instrument);
        self
    }

    pub fn build(self) -> Instruments {
        Instruments {
            instruments: self.instruments,
        }
    }
}

/// Ordered pair of distinct instruments: one held long, the other short.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct InstrumentPair {
    pub long: InstrumentId,
    pub short: InstrumentId,
}

impl InstrumentPair {
    pub fn new(long: InstrumentId, short: InstrumentId) -> Result<Self, IndexError> {
        if long == short {
            return Err(IndexError::SameInstrument(long));
        }
        Ok(Self { long, short })
    }

    /// Same instruments with the long and short roles swapped.
    pub fn reversed(&self) -> Self {
        Self {
            long: self.short.clone(),
            short: self.long.clone(),
        }
    }

    /// Unordered key shared by a pair and its reverse.
    pub fn unordered(&self) -> (InstrumentId, InstrumentId) {
        if self.long <= self.short {
            (self.long.clone(), self.short.clone())
        } else {
            (self.short.clone(), self.long.clone())
        }
    }
}

impl Display for InstrumentPair {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "long {} / short {}", self.long, self.short)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::kind::ExpiryClass;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use smol_str::SmolStr;

    fn instrument(id: &str, class: ExpiryClass) -> Instrument {
        Instrument::new(
            InstrumentId::from(id),
            SmolStr::new("BTC-USD"),
            class,
            Utc::now(),
            dec!(100),
            dec!(10),
        )
    }

    fn instruments() -> Instruments {
        Instruments::builder()
            .add_instrument(instrument("BTC-USD-A", ExpiryClass::Near))
            .add_instrument(instrument("BTC-USD-B", ExpiryClass::Mid))
            .add_instrument(instrument("BTC-USD-C", ExpiryClass::Far))
            .build()
    }

    #[test]
    fn test_find_unknown_instrument() {
        let instruments = instruments();
        assert!(instruments.find(&InstrumentId::from("BTC-USD-A")).is_ok());
        assert_eq!(
            instruments.find(&InstrumentId::from("ETH-USD-A")),
            Err(IndexError::UnknownInstrument(InstrumentId::from("ETH-USD-A")))
        );
    }

    #[test]
    fn test_pairs_are_ordered_and_distinct() {
        let pairs = instruments().pairs();
        assert_eq!(pairs.len(), 6);
        assert!(pairs.iter().all(|pair| pair.long != pair.short));
        assert!(pairs.contains(&InstrumentPair {
            long: InstrumentId::from("BTC-USD-C"),
            short: InstrumentId::from("BTC-USD-A"),
        }));
    }

    #[test]
    fn test_pair_rejects_same_instrument() {
        let id = InstrumentId::from("BTC-USD-A");
        assert_eq!(
            InstrumentPair::new(id.clone(), id.clone()),
            Err(IndexError::SameInstrument(id))
        );
    }

    #[test]
    fn test_pair_unordered_key() {
        let pair = InstrumentPair::new("B".into(), "A".into()).unwrap();
        assert_eq!(pair.unordered(), pair.reversed().unordered());
    }
}
