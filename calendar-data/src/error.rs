use calendar_instrument::InstrumentId;
use thiserror::Error;

/// Failures of a derived depth statistic.
///
/// Callers skip the tick; none of these are fatal.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum DepthError {
    #[error("depth model not ready: waiting for every instrument to report at least once")]
    NotReady,

    #[error("insufficient spread history: {rows} rows, at least 2 required")]
    InsufficientHistory { rows: usize },

    #[error("unknown instrument: {0}")]
    UnknownInstrument(InstrumentId),
}

/// Failures decoding exchange market data.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("malformed message: {error} for payload: {payload}")]
    Malformed {
        error: serde_json::Error,
        payload: String,
    },

    #[error("invalid level: {0}")]
    InvalidLevel(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),
}
