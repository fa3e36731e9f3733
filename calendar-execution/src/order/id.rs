use derive_more::Display;
use serde::{Deserialize, Deserializer, Serialize};
use smol_str::{SmolStr, format_smolstr};

/// Exchange assigned order identifier.
#[derive(
    Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Default, Serialize,
)]
pub struct OrderId(pub u64);

impl<'de> Deserialize<'de> for OrderId {
    /// OKX encodes order ids as numeric strings, eg/ "312269865356374016".
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            String(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(id) => Ok(Self(id)),
            Raw::String(id) => id.parse().map(Self).map_err(serde::de::Error::custom),
        }
    }
}

/// Arbitrage transaction identifier, `{prefix}_{counter}`.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Display, Default, Deserialize, Serialize)]
pub struct TransactionId(pub SmolStr);

impl TransactionId {
    pub fn new(prefix: &str, counter: u64) -> Self {
        Self(format_smolstr!("{}_{}", prefix, counter))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(SmolStr::new(value))
    }
}
