//! In-memory transport for testing the engine without a network.
//!
//! [`MockConnector`] records every transport the engine opens.  Tests grab the
//! resulting [`MockSocket`] and play the broker's part: complete the
//! handshake, deliver frames, fail or drop the socket, and inspect what the
//! engine sent.
//!
//! ```rust
//! use std::sync::Arc;
//! use jsonmsg_client::infrastructure::transport::mock::MockConnector;
//!
//! let connector = MockConnector::new();
//! let shared: Arc<dyn jsonmsg_client::infrastructure::transport::Connector> =
//!     Arc::new(connector.clone());
//! assert_eq!(connector.open_count(), 0);
//! # drop(shared);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::{emit, Connector, EventSender, ReadyState, Transport, TransportError};
use crate::domain::events::TransportEvent;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── MockConnector ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct ConnectorState {
    sockets: Vec<MockSocket>,
    refuse_next: Option<String>,
}

/// A [`Connector`] that hands out in-memory sockets.  Clones share state.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `open` call fail with [`TransportError::InvalidUri`].
    pub fn refuse_next_open(&self, reason: impl Into<String>) {
        lock(&self.state).refuse_next = Some(reason.into());
    }

    /// Number of transports opened so far.
    pub fn open_count(&self) -> usize {
        lock(&self.state).sockets.len()
    }

    /// The `index`-th socket opened, oldest first.
    pub fn socket(&self, index: usize) -> Option<MockSocket> {
        lock(&self.state).sockets.get(index).cloned()
    }

    /// The most recently opened socket.
    pub fn last_socket(&self) -> Option<MockSocket> {
        lock(&self.state).sockets.last().cloned()
    }
}

impl Connector for MockConnector {
    fn open(
        &self,
        uri: &str,
        epoch: u64,
        events: EventSender,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut state = lock(&self.state);
        if let Some(reason) = state.refuse_next.take() {
            return Err(TransportError::InvalidUri {
                uri: uri.to_string(),
                reason,
            });
        }
        let socket = MockSocket {
            uri: uri.to_string(),
            epoch,
            events,
            shared: Arc::new(Mutex::new(SocketState {
                ready: ReadyState::Connecting,
                sent: Vec::new(),
                fail_sends: false,
                close_calls: 0,
            })),
        };
        state.sockets.push(socket.clone());
        Ok(Box::new(MockTransport { socket }))
    }
}

// ── MockSocket ────────────────────────────────────────────────────────────────

struct SocketState {
    ready: ReadyState,
    sent: Vec<String>,
    fail_sends: bool,
    close_calls: usize,
}

/// The broker side of one mock transport.
#[derive(Clone)]
pub struct MockSocket {
    uri: String,
    epoch: u64,
    events: EventSender,
    shared: Arc<Mutex<SocketState>>,
}

impl MockSocket {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Completes the WebSocket handshake.
    pub fn open(&self) {
        lock(&self.shared).ready = ReadyState::Open;
        emit(&self.events, self.epoch, TransportEvent::Opened);
    }

    /// Delivers one raw text frame to the engine.
    pub fn deliver(&self, text: impl Into<String>) {
        emit(&self.events, self.epoch, TransportEvent::Message(text.into()));
    }

    /// Delivers one JSON frame to the engine.
    pub fn deliver_json(&self, frame: Value) {
        self.deliver(frame.to_string());
    }

    /// Reports a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        lock(&self.shared).ready = ReadyState::Closed;
        emit(&self.events, self.epoch, TransportEvent::Error(reason.into()));
    }

    /// Closes the socket from the broker side.
    pub fn drop_connection(&self) {
        lock(&self.shared).ready = ReadyState::Closed;
        emit(
            &self.events,
            self.epoch,
            TransportEvent::Closed {
                code: Some(1006),
                reason: "connection dropped".to_string(),
            },
        );
    }

    /// Makes every later `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        lock(&self.shared).fail_sends = fail;
    }

    /// Every text frame the engine sent, oldest first.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.shared).sent.clone()
    }

    /// Sent frames parsed as JSON.  Unparseable frames become `Value::Null`.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .map(|s| serde_json::from_str(s).unwrap_or(Value::Null))
            .collect()
    }

    /// `Action` values of the sent frames, oldest first.
    pub fn sent_actions(&self) -> Vec<String> {
        self.sent_json()
            .iter()
            .map(|v| v["Action"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    /// Removes and returns the sent frames.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut lock(&self.shared).sent)
    }

    pub fn ready_state(&self) -> ReadyState {
        lock(&self.shared).ready
    }

    /// Whether the engine called `close` on this transport.
    pub fn was_closed(&self) -> bool {
        lock(&self.shared).close_calls > 0
    }
}

struct MockTransport {
    socket: MockSocket,
}

impl Transport for MockTransport {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let mut state = lock(&self.socket.shared);
        if state.ready != ReadyState::Open {
            return Err(TransportError::NotOpen(state.ready));
        }
        if state.fail_sends {
            return Err(TransportError::Stopped);
        }
        state.sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        let mut state = lock(&self.socket.shared);
        state.close_calls += 1;
        state.ready = ReadyState::Closed;
    }

    fn ready_state(&self) -> ReadyState {
        lock(&self.socket.shared).ready
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EngineEvent;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[test]
    fn test_open_records_socket_and_reports_event() {
        // Arrange
        let connector = MockConnector::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Act
        let transport = connector.open("ws://h/ws", 3, tx).unwrap();
        let socket = connector.last_socket().unwrap();
        socket.open();

        // Assert
        assert_eq!(connector.open_count(), 1);
        assert_eq!(socket.epoch(), 3);
        assert_eq!(transport.ready_state(), ReadyState::Open);
        assert_eq!(
            rx.try_recv().unwrap(),
            EngineEvent::Transport {
                epoch: 3,
                event: TransportEvent::Opened
            }
        );
    }

    #[test]
    fn test_send_before_open_fails() {
        let connector = MockConnector::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = connector.open("ws://h", 1, tx).unwrap();

        let result = transport.send("x".to_string());

        assert_eq!(result, Err(TransportError::NotOpen(ReadyState::Connecting)));
    }

    #[test]
    fn test_sent_frames_are_recorded() {
        // Arrange
        let connector = MockConnector::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = connector.open("ws://h", 1, tx).unwrap();
        let socket = connector.last_socket().unwrap();
        socket.open();

        // Act
        transport.send(json!({"Action": "Ping"}).to_string()).unwrap();

        // Assert
        assert_eq!(socket.sent_actions(), vec!["Ping"]);
        assert_eq!(socket.take_sent().len(), 1);
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn test_refused_open_returns_error() {
        let connector = MockConnector::new();
        connector.refuse_next_open("no route");
        let (tx, _rx) = mpsc::unbounded_channel();

        assert!(connector.open("ws://h", 1, tx.clone()).is_err());
        assert!(connector.open("ws://h", 2, tx).is_ok());
    }

    #[test]
    fn test_close_is_observable() {
        let connector = MockConnector::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = connector.open("ws://h", 1, tx).unwrap();

        transport.close();

        let socket = connector.last_socket().unwrap();
        assert!(socket.was_closed());
        assert_eq!(socket.ready_state(), ReadyState::Closed);
    }
}
