//! Transport abstraction for the engine.
//!
//! The engine only needs a very small surface from a WebSocket:
//!
//! - open it (asynchronously; completion is reported as an event),
//! - send one text frame,
//! - close it,
//! - ask whether it is open.
//!
//! Everything the socket *produces* (open, message, error, close) is pushed
//! onto the engine's event queue as a [`TransportEvent`] tagged with the epoch
//! the transport was opened under.  This keeps the traits synchronous and lets
//! the engine ignore late events from a socket it has already torn down.
//!
//! Two implementations exist: [`websocket::WsConnector`] (tokio-tungstenite)
//! and [`mock::MockConnector`] (in-memory, for tests).

pub mod mock;
pub mod websocket;

use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::domain::events::{EngineEvent, TransportEvent};

pub use jsonmsg_core::protocol::SUBPROTOCOL;

/// Queue the transports report into.
pub type EventSender = UnboundedSender<EngineEvent>;

/// WebSocket ready state as observed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The URI could not be turned into a WebSocket request.
    #[error("invalid WebSocket URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// `send` was called while the socket was not open.
    #[error("transport is not open (state {0:?})")]
    NotOpen(ReadyState),

    /// The socket task has exited.
    #[error("transport task has stopped")]
    Stopped,
}

/// Opens transports.
pub trait Connector: Send + Sync {
    /// Starts opening a transport to `uri` and returns its handle at once.
    ///
    /// All events of the new transport are sent to `events` tagged with
    /// `epoch`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidUri`] if no connection attempt could
    /// be started.
    fn open(
        &self,
        uri: &str,
        epoch: u64,
        events: EventSender,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// A live (or opening) transport owned by the engine.
pub trait Transport: Send {
    /// Queues one text frame for transmission.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is not open or its task has stopped.
    fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Starts a graceful close.  Safe to call in any state.
    fn close(&mut self);

    fn ready_state(&self) -> ReadyState;
}

/// Pushes a transport event onto the engine queue.
///
/// A closed queue means the engine has shut down; the event is dropped.
pub(crate) fn emit(events: &EventSender, epoch: u64, event: TransportEvent) {
    let _ = events.send(EngineEvent::Transport { epoch, event });
}
