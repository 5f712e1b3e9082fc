//! Events delivered to the engine task.
//!
//! The engine owns one unbounded queue of [`EngineEvent`]s.  Transports push
//! socket events onto it and timer guards push their fires onto it, so every
//! asynchronous occurrence is handled in arrival order on the engine task.

/// Something that happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The WebSocket handshake completed and the sub-protocol was accepted.
    Opened,
    /// One text frame arrived.
    Message(String),
    /// The transport failed; it will produce no further events.
    Error(String),
    /// The peer closed the socket, or the stream ended.
    Closed { code: Option<u16>, reason: String },
}

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ConnectTimeout,
    KeepAlive,
    /// Per-request acknowledgment timeout for the given request ID.
    RequestTimeout(u64),
}

/// A timer fire, identified by the token of the guard that scheduled it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    pub token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// A transport event tagged with the epoch of the session that opened the
    /// transport.  Events from an older epoch are ignored.
    Transport { epoch: u64, event: TransportEvent },
    Timer(TimerFired),
}
