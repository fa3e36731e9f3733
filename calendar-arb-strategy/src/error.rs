use calendar_data::error::{DataError, DepthError};
use calendar_execution::{audit::AuditError, error::ClientError};
use calendar_instrument::IndexError;
use calendar_integration::error::SocketError;
use thiserror::Error;

/// Failures surfaced by the arbitrage engine and its runner.
///
/// Per-leg order outcomes are not errors: they are returned to the transaction as
/// [`OrderOutcome`](calendar_execution::OrderOutcome) values.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("depth: {0}")]
    Depth(#[from] DepthError),

    #[error("data: {0}")]
    Data(#[from] DataError),

    #[error("exchange client: {0}")]
    Client(#[from] ClientError),

    #[error("socket: {0}")]
    Socket(#[from] SocketError),

    #[error("audit: {0}")]
    Audit(#[from] AuditError),

    #[error("instrument: {0}")]
    Index(#[from] IndexError),

    #[error("configuration: {0}")]
    Config(String),

    #[error("recording io: {0}")]
    RecordingIo(#[from] std::io::Error),

    #[error("recording format: {0}")]
    RecordingFormat(#[from] serde_json::Error),
}
