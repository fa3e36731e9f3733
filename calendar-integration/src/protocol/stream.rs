//! Persistent WebSocket connection.
//!
//! One [`PersistentConnection`] owns one socket to one endpoint. It loops receiving frames
//! with a short per-receive timeout:
//!
//! - A receive timeout with no data sends a heartbeat ping.
//! - No pong by the following timeout is a connection failure.
//! - Any fatal routing error, transport error or server close is a connection failure.
//!
//! Every connection failure tears the socket down and performs a full reconnect, running
//! the [`Session`] handshake (login + subscribe) again. Subscription state is never carried
//! across sockets.

use crate::{
    error::SocketError,
    protocol::websocket::{WebSocket, WsMessage, connect, frame_text},
};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

/// Exchange specific behaviour driven by a [`PersistentConnection`].
#[async_trait]
pub trait Session: Send + Sync {
    /// Name used in logs, eg/ "okx_public".
    fn name(&self) -> &str;

    fn url(&self) -> &Url;

    /// Authenticate and subscribe on a freshly connected socket.
    ///
    /// Invoked on every (re)connect.
    async fn handshake(&self, websocket: &mut WebSocket) -> Result<(), SocketError>;

    /// Heartbeat frame sent after a receive timeout.
    fn ping(&self) -> WsMessage {
        WsMessage::text("ping")
    }

    /// Whether a decoded payload is the reply to [`Session::ping`].
    fn is_pong(&self, payload: &str) -> bool {
        payload == "pong"
    }

    /// Decode and route one application payload to its consumers.
    ///
    /// Malformed but harmless payloads should be logged and return `Ok`. An `Err` is fatal:
    /// the connection is torn down and rebuilt.
    fn route(&self, payload: &str) -> Result<(), SocketError>;
}

/// Timing configuration for a [`PersistentConnection`].
#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize, Serialize)]
pub struct ConnectionConfig {
    /// Per-receive timeout before a heartbeat ping is sent.
    pub receive_timeout_ms: u64,
    /// Delay before the first reconnect attempt after a failure.
    pub reconnect_delay_ms: u64,
    /// Upper bound for the doubling reconnect delay.
    pub max_reconnect_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            receive_timeout_ms: 5_000,
            reconnect_delay_ms: 500,
            max_reconnect_delay_ms: 30_000,
        }
    }
}

impl ConnectionConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }
}

/// Long-lived connection to one endpoint, driven by a [`Session`].
#[derive(Debug)]
pub struct PersistentConnection<S> {
    session: S,
    config: ConnectionConfig,
}

impl<S> PersistentConnection<S>
where
    S: Session,
{
    pub fn new(session: S, config: ConnectionConfig) -> Self {
        Self { session, config }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Serve the connection forever, reconnecting and resubscribing after every failure.
    ///
    /// Stop it by aborting the task it runs on.
    pub async fn run(&self) {
        let mut delay = Duration::from_millis(self.config.reconnect_delay_ms);
        let max_delay = Duration::from_millis(self.config.max_reconnect_delay_ms);

        loop {
            let (error, established) = self.serve().await;
            if established {
                delay = Duration::from_millis(self.config.reconnect_delay_ms);
            }

            warn!(
                session = %self.session.name(),
                ?error,
                reconnect_in = ?delay,
                "connection failed, reconnecting and resubscribing"
            );

            tokio::time::sleep(delay).await;
            delay = (delay * 2).min(max_delay);
        }
    }

    /// Drive one socket until it fails.
    ///
    /// Returns the failure and whether the handshake completed on this socket.
    pub async fn serve(&self) -> (SocketError, bool) {
        let mut websocket = match connect(self.session.url()).await {
            Ok(websocket) => websocket,
            Err(error) => return (error, false),
        };

        if let Err(error) = self.session.handshake(&mut websocket).await {
            error!(session = %self.session.name(), ?error, "handshake failed");
            let _ = websocket.close(None).await;
            return (error, false);
        }
        info!(session = %self.session.name(), url = %self.session.url(), "connected and subscribed");

        let error = self.receive_loop(&mut websocket).await;
        let _ = websocket.close(None).await;
        (error, true)
    }

    async fn receive_loop(&self, websocket: &mut WebSocket) -> SocketError {
        let timeout = self.config.receive_timeout();
        let mut awaiting_pong = false;

        loop {
            let message = match tokio::time::timeout(timeout, websocket.next()).await {
                Err(_elapsed) if awaiting_pong => {
                    warn!(session = %self.session.name(), "heartbeat missed");
                    return SocketError::HeartbeatTimeout(timeout);
                }
                Err(_elapsed) => {
                    debug!(session = %self.session.name(), "receive timeout, sending ping");
                    if let Err(error) = websocket.send(self.session.ping()).await {
                        return SocketError::from(error);
                    }
                    awaiting_pong = true;
                    continue;
                }
                Ok(None) => return SocketError::Terminated("stream ended".to_string()),
                Ok(Some(Err(error))) => return SocketError::from(error),
                Ok(Some(Ok(message))) => message,
            };

            match &message {
                WsMessage::Ping(payload) => {
                    if let Err(error) = websocket.send(WsMessage::Pong(payload.clone())).await {
                        return SocketError::from(error);
                    }
                    continue;
                }
                WsMessage::Close(frame) => {
                    return SocketError::Terminated(format!("server closed: {frame:?}"));
                }
                _ => {}
            }

            let payload = match frame_text(&message) {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(error) => return error,
            };

            if self.session.is_pong(&payload) {
                awaiting_pong = false;
                continue;
            }

            if let Err(error) = self.session.route(&payload) {
                error!(session = %self.session.name(), ?error, "fatal routing error");
                return error;
            }
        }
    }
}
