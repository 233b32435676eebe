//! In-memory transport implementation.

use super::{
    ConnectionHandle, ConnectionState, TransportAdapter, TransportError, TransportEvent,
    TransportResult,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

/// A message handed to [`MemoryTransport::send`].
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub event: String,
    pub payload: Value,
}

#[derive(Debug, Default)]
struct Shared {
    state: ConnectionState,
    connections: u64,
    sent: Vec<SentMessage>,
    incoming: VecDeque<TransportEvent>,
    fail_sends: bool,
    fail_connect: bool,
}

/// In-memory transport for testing and offline use.
///
/// Clones share the same channel, so a test can keep one clone as the
/// "relay side" while the session owns the other.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<RwLock<Shared>>,
}

impl MemoryTransport {
    /// Create a new disconnected transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> TransportResult<R> {
        let mut shared = self
            .shared
            .write()
            .map_err(|e| TransportError::Other(format!("Lock error: {}", e)))?;
        Ok(f(&mut shared))
    }

    /// Queue an inbound relay message.
    pub fn push_message(&self, event: &str, payload: Value) {
        let _ = self.with(|shared| {
            shared.incoming.push_back(TransportEvent::Message {
                event: event.to_string(),
                payload,
            })
        });
    }

    /// Simulate a dropped connection.
    pub fn simulate_disconnect(&self) {
        let _ = self.with(|shared| {
            shared.state = ConnectionState::Disconnected;
            shared.incoming.push_back(TransportEvent::Disconnected);
        });
    }

    /// Simulate the connection coming back.
    pub fn simulate_reconnect(&self) {
        let _ = self.with(|shared| {
            shared.state = ConnectionState::Connected;
            shared.connections += 1;
            shared.incoming.push_back(TransportEvent::Reconnected);
        });
    }

    /// Make subsequent sends fail.
    pub fn set_fail_sends(&self, fail: bool) {
        let _ = self.with(|shared| shared.fail_sends = fail);
    }

    /// Make subsequent connects fail.
    pub fn set_fail_connect(&self, fail: bool) {
        let _ = self.with(|shared| shared.fail_connect = fail);
    }

    /// Take every message sent so far.
    pub fn take_sent(&self) -> Vec<SentMessage> {
        self.with(|shared| std::mem::take(&mut shared.sent))
            .unwrap_or_default()
    }

    /// Names of the messages sent so far, without draining them.
    pub fn sent_events(&self) -> Vec<String> {
        self.with(|shared| shared.sent.iter().map(|m| m.event.clone()).collect())
            .unwrap_or_default()
    }
}

impl TransportAdapter for MemoryTransport {
    fn connect(&mut self) -> TransportResult<ConnectionHandle> {
        self.with(|shared| {
            if shared.fail_connect {
                shared.state = ConnectionState::Error;
                return Err(TransportError::Connect("refused".to_string()));
            }
            shared.connections += 1;
            shared.state = ConnectionState::Connected;
            shared.incoming.push_back(TransportEvent::Connected);
            Ok(ConnectionHandle(shared.connections))
        })?
    }

    fn send(&mut self, event: &str, payload: Value) -> TransportResult<()> {
        self.with(|shared| {
            if shared.state != ConnectionState::Connected {
                return Err(TransportError::NotConnected);
            }
            if shared.fail_sends {
                return Err(TransportError::Send(format!("'{}' rejected", event)));
            }
            shared.sent.push(SentMessage {
                event: event.to_string(),
                payload,
            });
            Ok(())
        })?
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        match self.with(|shared| shared.incoming.drain(..).collect()) {
            Ok(events) => events,
            Err(e) => {
                log::error!("Memory transport poll failed: {}", e);
                Vec::new()
            }
        }
    }

    fn state(&self) -> ConnectionState {
        self.shared
            .read()
            .map(|shared| shared.state)
            .unwrap_or(ConnectionState::Error)
    }

    fn disconnect(&mut self) {
        let _ = self.with(|shared| {
            shared.state = ConnectionState::Disconnected;
            shared.incoming.clear();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_and_send() {
        let mut transport = MemoryTransport::new();
        assert_eq!(transport.state(), ConnectionState::Disconnected);

        let handle = transport.connect().unwrap();
        assert_eq!(handle, ConnectionHandle(1));
        assert!(transport.is_connected());
        assert_eq!(transport.poll_events(), vec![TransportEvent::Connected]);

        transport.send("draw", json!({"x": 1})).unwrap();
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].event, "draw");
        assert!(transport.take_sent().is_empty());
    }

    #[test]
    fn test_send_requires_connection() {
        let mut transport = MemoryTransport::new();
        assert!(matches!(
            transport.send("draw", Value::Null),
            Err(TransportError::NotConnected)
        ));
    }

    #[test]
    fn test_failing_sends() {
        let mut transport = MemoryTransport::new();
        transport.connect().unwrap();
        transport.set_fail_sends(true);
        assert!(matches!(
            transport.send("stop-draw", Value::Null),
            Err(TransportError::Send(_))
        ));
        assert!(transport.sent_events().is_empty());
    }

    #[test]
    fn test_refused_connect() {
        let mut transport = MemoryTransport::new();
        transport.set_fail_connect(true);
        assert!(transport.connect().is_err());
        assert_eq!(transport.state(), ConnectionState::Error);
    }

    #[test]
    fn test_clones_share_channel() {
        let mut client = MemoryTransport::new();
        let relay = client.clone();
        client.connect().unwrap();
        client.poll_events();

        relay.push_message("clear-canvas", json!({}));
        relay.simulate_disconnect();
        relay.simulate_reconnect();

        let events = client.poll_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1], TransportEvent::Disconnected);
        assert_eq!(events[2], TransportEvent::Reconnected);
        assert!(client.is_connected());
    }
}
