use super::channel::OkxChannel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};

/// Subscription argument echoed back on every push and subscribe event.
///
/// ### Raw Payload Examples
/// ```json
/// {"channel": "books5", "instId": "BTC-USD-250131"}
/// {"channel": "orders", "instType": "FUTURES"}
/// ```
#[derive(Clone, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxArg {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inst_type: Option<String>,
}

impl OkxArg {
    pub fn new(channel: OkxChannel, inst_id: Option<&str>) -> Self {
        Self {
            channel: channel.0.to_string(),
            inst_id: inst_id.map(str::to_string),
            inst_type: None,
        }
    }

    pub fn with_inst_type(channel: OkxChannel, inst_type: &str) -> Self {
        Self {
            channel: channel.0.to_string(),
            inst_id: None,
            inst_type: Some(inst_type.to_string()),
        }
    }
}

/// Control event kind.
#[derive(Clone, Copy, Eq, PartialEq, Debug, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OkxEvent {
    Login,
    Subscribe,
    Unsubscribe,
    Error,
    #[serde(rename = "channel-conn-count")]
    ChannelConnCount,
    Notice,
    #[serde(other)]
    Unknown,
}

/// Any frame received over an OKX WebSocket, before routing.
///
/// Push frames have `arg` + `data`, control frames have `event`.
#[derive(Clone, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkxFrame {
    #[serde(default)]
    pub event: Option<OkxEvent>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub arg: Option<OkxArg>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl OkxFrame {
    /// Whether the frame reports success (`code` absent or "0").
    pub fn is_ok(&self) -> bool {
        self.code.as_deref().is_none_or(|code| code == "0")
    }

    /// Channel of a push frame.
    pub fn channel(&self) -> Option<&str> {
        self.arg.as_ref().map(|arg| arg.channel.as_str())
    }

    /// Decode the `data` array of a push frame.
    pub fn into_push<T>(self) -> Result<OkxPush<T>, serde_json::Error>
    where
        T: DeserializeOwned,
    {
        let arg = self
            .arg
            .ok_or_else(|| <serde_json::Error as serde::de::Error>::missing_field("arg"))?;
        let data = match self.data {
            Some(data) => serde_json::from_value(data)?,
            None => Vec::new(),
        };
        Ok(OkxPush { arg, data })
    }
}

/// Decoded push frame.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct OkxPush<T> {
    pub arg: OkxArg,
    pub data: Vec<T>,
}

/// Deserialize an OKX epoch millisecond string (eg/ "1597026383085") as `DateTime<Utc>`.
pub fn de_str_epoch_ms<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let millis = raw.parse::<i64>().map_err(serde::de::Error::custom)?;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| serde::de::Error::custom(format!("epoch ms out of range: {millis}")))
}

/// Deserialize an optional OKX epoch millisecond string, where "" means absent.
pub fn de_opt_str_epoch_ms<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") => Ok(None),
        Some(raw) => {
            let millis = raw.parse::<i64>().map_err(serde::de::Error::custom)?;
            Ok(DateTime::<Utc>::from_timestamp_millis(millis))
        }
    }
}
