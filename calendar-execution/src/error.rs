use calendar_data::error::DataError;
use calendar_integration::error::SocketError;
use thiserror::Error;

/// OKX error code for insufficient margin on placement.
pub const MARGIN_NOT_ENOUGH: &str = "51008";

/// OKX cancel error codes meaning the order is no longer live: does not exist, already
/// cancelled, or already filled.
pub const ORDER_NOT_LIVE: [&str; 3] = ["51400", "51401", "51402"];

/// Errors returned by an [`ExchangeClient`](crate::client::ExchangeClient).
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("exchange rejected request with code {code}: {msg}")]
    Api { code: String, msg: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("authentication error: {0}")]
    Auth(String),
}

impl ClientError {
    pub fn api(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            msg: msg.into(),
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code.as_str()),
            _ => None,
        }
    }

    /// Placement rejected for insufficient margin.
    pub fn is_margin_not_enough(&self) -> bool {
        self.code() == Some(MARGIN_NOT_ENOUGH)
    }

    /// Cancel rejected because the order already left the book.
    pub fn is_order_not_live(&self) -> bool {
        self.code().is_some_and(|code| ORDER_NOT_LIVE.contains(&code))
    }
}

/// Protocol invariant violations. All are fatal to the connection that produced them.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown order status code: {0}")]
    UnknownStatusCode(String),

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("failed to decode {context}: {error}")]
    Decode {
        context: &'static str,
        error: String,
    },

    #[error("socket: {0}")]
    Socket(#[from] SocketError),
}

impl From<DataError> for ProtocolError {
    fn from(error: DataError) -> Self {
        match error {
            DataError::UnknownChannel(channel) => Self::UnknownChannel(channel),
            other => Self::Decode {
                context: "market data",
                error: other.to_string(),
            },
        }
    }
}

impl From<ProtocolError> for SocketError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Socket(error) => error,
            other => SocketError::Protocol(other.to_string()),
        }
    }
}
