use crate::protocol::websocket::WsError;
use std::time::Duration;
use thiserror::Error;

/// All socket IO related errors generated by the protocol layer.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("failed to parse url: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<WsError>),

    #[error("Deserialising JSON error: {error} for payload: {payload}")]
    Deserialise {
        error: serde_json::Error,
        payload: String,
    },

    #[error("Serialising JSON error: {0}")]
    Serialise(serde_json::Error),

    #[error("received frame that is not valid utf-8")]
    Utf8,

    #[error("login rejected: {0}")]
    Login(String),

    #[error("error subscribing to resources over the socket: {0}")]
    Subscribe(String),

    #[error("no heartbeat reply received within {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("protocol invariant violated: {0}")]
    Protocol(String),

    #[error("socket terminated: {0}")]
    Terminated(String),
}

impl From<WsError> for SocketError {
    fn from(error: WsError) -> Self {
        SocketError::WebSocket(Box::new(error))
    }
}
