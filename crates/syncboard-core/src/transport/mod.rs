//! Transport abstraction for the relay connection.
//!
//! The core never owns a socket. Hosts plug in an implementation of
//! [`TransportAdapter`] (a WebSocket client, a socket.io bridge, or the
//! in-memory [`MemoryTransport`] used in tests) and the session pumps it.

mod memory;

pub use memory::{MemoryTransport, SentMessage};

use serde_json::Value;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected")]
    NotConnected,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Send failed: {0}")]
    Send(String),
    #[error("Transport error: {0}")]
    Other(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

/// Identifies one successful `connect` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

/// Events surfaced by a transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// First connection established.
    Connected,
    /// Connection re-established after a drop.
    Reconnected,
    /// Connection lost.
    Disconnected,
    /// An event received from the relay.
    Message { event: String, payload: Value },
}

/// Bidirectional message channel to the relay.
///
/// Delivery is fire-and-forget and at most once from the adapter's side.
/// Inbound traffic is drained with [`poll_events`](Self::poll_events); since
/// the session owns the only dispatch table, registering a handler twice
/// cannot duplicate delivery.
pub trait TransportAdapter {
    /// Open the connection.
    fn connect(&mut self) -> TransportResult<ConnectionHandle>;

    /// Send one event.
    fn send(&mut self, event: &str, payload: Value) -> TransportResult<()>;

    /// Drain everything received since the last poll.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Close the connection.
    fn disconnect(&mut self);

    /// Check if connected.
    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }
}
