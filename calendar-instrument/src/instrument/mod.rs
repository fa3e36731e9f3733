use self::kind::ExpiryClass;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Futures [`ExpiryClass`] definitions.
pub mod kind;

/// Exchange instrument identifier (eg/ `BTC-USD-250131`).
#[derive(
    Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Default, Deserialize, Serialize,
)]
pub struct InstrumentId(pub SmolStr);

impl InstrumentId {
    pub fn new(id: impl Into<SmolStr>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}

impl From<String> for InstrumentId {
    fn from(value: String) -> Self {
        Self(SmolStr::new(value))
    }
}

impl AsRef<str> for InstrumentId {
    fn as_ref(&self) -> &str {
        self.0.as_str()
    }
}

/// One tradeable delivery futures contract.
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize, Constructor)]
pub struct Instrument {
    pub id: InstrumentId,
    /// Underlying index, eg/ `BTC-USD`.
    pub underlying: SmolStr,
    pub expiry_class: ExpiryClass,
    pub expiry: DateTime<Utc>,
    /// Face value of one contract in quote currency.
    pub contract_value: Decimal,
    pub leverage: Decimal,
}

impl Instrument {
    /// Notional quote value of `volume` contracts.
    pub fn notional(&self, volume: u32) -> Decimal {
        self.contract_value * Decimal::from(volume)
    }

    pub fn is_expired(&self) -> bool {
        self.expiry <= Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_instrument_id_display() {
        let id = InstrumentId::from("BTC-USD-250131");
        assert_eq!(id.to_string(), "BTC-USD-250131");
        assert_eq!(id.as_str(), "BTC-USD-250131");
    }

    #[test]
    fn test_instrument_notional() {
        let instrument = Instrument::new(
            InstrumentId::from("BTC-USD-250131"),
            SmolStr::new("BTC-USD"),
            ExpiryClass::Near,
            Utc::now() + chrono::Duration::days(3),
            dec!(100),
            dec!(10),
        );

        assert_eq!(instrument.notional(5), dec!(500));
        assert!(!instrument.is_expired());
    }
}
