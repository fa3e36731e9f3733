use super::message::de_str_epoch_ms;
use crate::books::Level;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

/// OKX `books5` depth snapshot.
///
/// ### Raw Payload Examples
/// See docs: <https://www.okx.com/docs-v5/en/#order-book-trading-market-data-ws-order-book-channel>
/// ```json
/// {
///   "asks": [["8446", "95", "0", "3"]],
///   "bids": [["8445", "8", "0", "1"]],
///   "instId": "BTC-USD-250131",
///   "ts": "1597026383085",
///   "seqId": 123456
/// }
/// ```
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxBook {
    pub asks: Vec<OkxLevel>,
    pub bids: Vec<OkxLevel>,
    #[serde(default)]
    pub inst_id: Option<String>,
    #[serde(deserialize_with = "de_str_epoch_ms")]
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub seq_id: Option<i64>,
}

/// OKX depth level `[price, size, deprecated, order_count]`.
///
/// Only price and size are used, trailing elements are ignored.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Serialize)]
pub struct OkxLevel {
    pub price: Decimal,
    pub amount: Decimal,
}

impl<'de> Deserialize<'de> for OkxLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Vec::<String>::deserialize(deserializer)?;
        let field = |index: usize, name: &'static str| -> Result<Decimal, D::Error> {
            raw.get(index)
                .ok_or_else(|| <D::Error as serde::de::Error>::missing_field(name))?
                .parse::<Decimal>()
                .map_err(serde::de::Error::custom)
        };

        Ok(Self {
            price: field(0, "price")?,
            amount: field(1, "size")?,
        })
    }
}

impl From<OkxLevel> for Level {
    fn from(level: OkxLevel) -> Self {
        Level::new(level.price, level.amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_de_okx_level_ignores_trailing_fields() {
        let level: OkxLevel = serde_json::from_str(r#"["8446.5", "95", "0", "3"]"#).unwrap();
        assert_eq!(
            level,
            OkxLevel {
                price: dec!(8446.5),
                amount: dec!(95)
            }
        );
    }

    #[test]
    fn test_de_okx_level_rejects_short_or_invalid() {
        assert!(serde_json::from_str::<OkxLevel>(r#"["8446.5"]"#).is_err());
        assert!(serde_json::from_str::<OkxLevel>(r#"["abc", "1"]"#).is_err());
    }

    #[test]
    fn test_de_okx_book_from_value() {
        let value = serde_json::json!({
            "asks": [["101", "2", "0", "1"]],
            "bids": [["100", "3", "0", "1"]],
            "ts": "1700000000000"
        });
        let book: OkxBook = serde_json::from_value(value).unwrap();
        assert_eq!(book.inst_id, None);
        assert_eq!(book.ts.timestamp_millis(), 1_700_000_000_000);
        assert_eq!(Level::from(book.bids[0]), Level::new(dec!(100), dec!(3)));
    }
}
