/// WebSocket type aliases and connect helpers.
pub mod websocket;

/// Persistent connection loop: handshake, heartbeat, routing and reconnect.
pub mod stream;
