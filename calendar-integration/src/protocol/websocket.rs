use crate::error::SocketError;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;
use url::Url;

/// Convenient type alias for a tungstenite `WebSocketStream`.
pub type WebSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Communicative type alias for a tungstenite [`Message`](tokio_tungstenite::tungstenite::Message).
pub type WsMessage = tokio_tungstenite::tungstenite::Message;

/// Communicative type alias for a tungstenite [`Error`](tokio_tungstenite::tungstenite::Error).
pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Connect asynchronously to a [`WebSocket`] server.
pub async fn connect(url: &Url) -> Result<WebSocket, SocketError> {
    debug!(%url, "attempting to establish WebSocket connection");
    tokio_tungstenite::connect_async(url.as_str())
        .await
        .map(|(websocket, _)| websocket)
        .map_err(SocketError::from)
}

/// Decode a text or binary frame payload into UTF-8 text.
///
/// Returns `Ok(None)` for control frames which carry no application payload.
pub fn frame_text(message: &WsMessage) -> Result<Option<String>, SocketError> {
    match message {
        WsMessage::Text(text) => Ok(Some(text.as_str().to_owned())),
        WsMessage::Binary(bytes) => String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| SocketError::Utf8),
        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Close(_) | WsMessage::Frame(_) => {
            Ok(None)
        }
    }
}
