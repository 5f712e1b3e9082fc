//! The connection state machine.
//!
//! [`Connection`] is the engine root.  It owns the transport handle, the
//! request correlator, the keepalive monitor, every timer guard, the trace
//! buffer and the application callbacks, and it is driven entirely by two
//! kinds of input:
//!
//! - **Caller operations** (`connect`, `send`, ...) which return
//!   synchronously with a [`ClientError`] on misuse.
//! - **Events** ([`EngineEvent`]) from the transport and the timers, handed
//!   to [`handle_event`](Connection::handle_event).
//!
//! # States
//!
//! ```text
//!                connect()            transport open           Connected frame
//! Disconnected ───────────▶ Connecting ──────────▶ AwaitingConnectAck ─────────▶ Connected
//!      ▲                         │                         │                          │
//!      │                         ▼                         ▼                          ▼
//!      └──────────────────────────────── teardown(error) ◀────────────────────────────┘
//! ```
//!
//! `disconnect()` passes through `Disconnecting` while the `Close` frame is
//! sent, then tears down with `OK`.
//!
//! # Teardown
//!
//! Every way a session can end goes through [`teardown`](Connection::teardown)
//! exactly once.  It cancels all timers, bumps the epoch so queued transport
//! events are ignored, closes and drops the transport, fails every pending
//! request with [`RequestFailure::ConnectionClosed`], and finally invokes one
//! terminal callback: the connect `on_failure` if `Connected` was never
//! reached, otherwise [`ConnectionHandler::on_connection_lost`].

use std::collections::HashMap;
use std::sync::Arc;

use jsonmsg_core::domain::options::{ConnectFailureCallback, ConnectSuccessCallback};
use jsonmsg_core::protocol::frames::{AckFrame, ConnectedFrame};
use jsonmsg_core::{
    encode_frame, ClientError, ConnectOptions, ConnectionError, ErrorCode, Message,
    OutboundFrame, RequestCorrelator, RequestFailure, RequestOptions, RequestTarget,
    SubscribeOptions, TraceBuffer, TraceEntry,
};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, warn};

use super::dispatcher::{guarded, DispatchTarget, MessageDispatcher};
use super::handler::ConnectionHandler;
use super::keepalive::{KeepAliveMonitor, KeepAliveVerdict};
use crate::domain::config::ClientConfig;
use crate::domain::events::{EngineEvent, TimerFired, TimerKind, TransportEvent};
use crate::infrastructure::timer::{TimerGuard, TimerScheduler};
use crate::infrastructure::transport::{Connector, Transport};

/// Protocol session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    AwaitingConnectAck,
    Connected,
    Disconnecting,
}

/// Per-session parameters captured at `connect` time.
struct SessionParams {
    user: Option<String>,
    password: Option<String>,
    keep_alive_secs: u32,
    on_success: Option<ConnectSuccessCallback>,
    on_failure: Option<ConnectFailureCallback>,
}

pub struct Connection {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    events: UnboundedSender<EngineEvent>,
    handler: Box<dyn ConnectionHandler>,

    state: ConnectionState,
    epoch: u64,
    transport: Option<Box<dyn Transport>>,
    session: Option<SessionParams>,
    reached_connected: bool,

    timers: TimerScheduler,
    connect_timer: Option<TimerGuard>,
    keepalive: KeepAliveMonitor,
    request_timers: HashMap<u64, TimerGuard>,
    correlator: RequestCorrelator,
    trace: TraceBuffer,
}

impl Connection {
    /// Creates a disconnected engine.  `events` must feed back into
    /// [`handle_event`](Self::handle_event).
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        handler: Box<dyn ConnectionHandler>,
        events: UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            config,
            connector,
            timers: TimerScheduler::new(events.clone()),
            events,
            handler,
            state: ConnectionState::Disconnected,
            epoch: 0,
            transport: None,
            session: None,
            reached_connected: false,
            connect_timer: None,
            keepalive: KeepAliveMonitor::new(0),
            request_timers: HashMap::new(),
            correlator: RequestCorrelator::new(),
            trace: TraceBuffer::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn pending_requests(&self) -> usize {
        self.correlator.len()
    }

    // ── Caller operations ─────────────────────────────────────────────────────

    /// Starts a new session.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidState`] unless disconnected with no transport.
    /// - [`ClientError::InvalidArgument`] if `options` fail validation.
    /// - [`ClientError::Transport`] if the connector cannot start.
    pub fn connect(&mut self, mut options: ConnectOptions) -> Result<(), ClientError> {
        if self.state != ConnectionState::Disconnected || self.transport.is_some() {
            return Err(ClientError::InvalidState(format!(
                "connect requires Disconnected, state is {:?}",
                self.state
            )));
        }
        options.validate()?;

        let epoch = self.epoch + 1;
        let transport = self
            .connector
            .open(self.config.uri(), epoch, self.events.clone())
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        self.epoch = epoch;
        self.transport = Some(transport);
        self.reached_connected = false;
        self.keepalive = KeepAliveMonitor::new(options.keep_alive_secs());
        self.connect_timer = Some(
            self.timers
                .schedule(TimerKind::ConnectTimeout, options.connect_timeout()),
        );
        self.session = Some(SessionParams {
            user: options.user_name().map(str::to_string),
            password: options.password_value().map(str::to_string),
            keep_alive_secs: options.keep_alive_secs(),
            on_success: options.take_on_success(),
            on_failure: options.take_on_failure(),
        });

        info!(
            "client {}: connecting to {} (epoch {epoch})",
            self.config.client_id(),
            self.config.uri()
        );
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    /// Ends the session with `OK`.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] if there is no transport.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        if self.transport.is_none() {
            return Err(ClientError::InvalidState("not connected".to_string()));
        }
        self.set_state(ConnectionState::Disconnecting);
        // Best effort: the socket may not even be open yet.
        let _ = self.write_frame(&OutboundFrame::Close);
        self.teardown(ConnectionError::ok("disconnect requested"));
        Ok(())
    }

    /// Subscribes to `topic`.  Returns the request ID.
    ///
    /// The subscription name defaults to the topic.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] unless connected;
    /// [`ClientError::InvalidArgument`] for an empty topic or bad options.
    pub fn create_topic_subscription(
        &mut self,
        topic: &str,
        options: SubscribeOptions,
    ) -> Result<u64, ClientError> {
        self.require_connected("create_topic_subscription")?;
        require_non_empty("topic filter", topic)?;
        options.validate()?;

        let (name, request) = options.into_parts();
        let name = name.unwrap_or_else(|| topic.to_string());
        let target = RequestTarget::Subscribe {
            name: name.clone(),
            topic: topic.to_string(),
        };
        let topic = topic.to_string();
        Ok(self.issue_request(target, request, move |id| OutboundFrame::Subscribe {
            name,
            topic,
            id,
        }))
    }

    /// Stops delivery for the subscription `name`.
    ///
    /// # Errors
    ///
    /// As for [`create_topic_subscription`](Self::create_topic_subscription).
    pub fn close_topic_subscription(
        &mut self,
        name: &str,
        options: RequestOptions,
    ) -> Result<u64, ClientError> {
        self.require_connected("close_topic_subscription")?;
        require_non_empty("subscription name", name)?;
        options.validate()?;

        let target = RequestTarget::CloseSubscription {
            name: name.to_string(),
        };
        let name = name.to_string();
        Ok(self.issue_request(target, options, move |id| {
            OutboundFrame::CloseSubscription { id, name }
        }))
    }

    /// Removes the subscription `name` from the server.
    ///
    /// # Errors
    ///
    /// As for [`create_topic_subscription`](Self::create_topic_subscription).
    pub fn destroy_topic_subscription(
        &mut self,
        name: &str,
        options: RequestOptions,
    ) -> Result<u64, ClientError> {
        self.require_connected("destroy_topic_subscription")?;
        require_non_empty("subscription name", name)?;
        options.validate()?;

        let target = RequestTarget::DestroySubscription {
            name: name.to_string(),
        };
        let name = name.to_string();
        Ok(self.issue_request(target, options, move |id| {
            OutboundFrame::DestroySubscription { id, name }
        }))
    }

    /// Publishes `message`.  Returns the request ID.
    ///
    /// QoS 1 and 2 are acknowledged by the server and resolved like any other
    /// request.  QoS 0 carries no ID on the wire; its `on_success` runs as
    /// soon as the frame is handed to the transport and any timeout is
    /// ignored.
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidState`] unless connected;
    /// [`ClientError::InvalidArgument`] for an empty destination or bad
    /// options.
    pub fn send(&mut self, message: Message, options: RequestOptions) -> Result<u64, ClientError> {
        self.require_connected("send")?;
        require_non_empty("destination name", message.destination_name())?;
        options.validate()?;

        let topic = message.destination_name().to_string();
        let qos = message.qos();
        let body = message.payload().clone();

        if qos.expects_ack() {
            let target = RequestTarget::Send {
                topic: topic.clone(),
            };
            return Ok(self.issue_request(target, options, move |id| OutboundFrame::Send {
                topic,
                qos,
                id: Some(id),
                body,
            }));
        }

        let id = self.correlator.allocate_id();
        let frame = OutboundFrame::Send {
            topic: topic.clone(),
            qos,
            id: None,
            body,
        };
        let (_, on_success, on_failure) = options.into_parts();
        let target = RequestTarget::Send { topic };
        match self.write_frame(&frame) {
            Ok(()) => {
                if let Some(f) = on_success {
                    if let Err(e) = guarded("send on_success", || f(&target)) {
                        self.teardown(e);
                    }
                }
            }
            Err(e) => {
                // Rejected before the terminal callback, like a drained request.
                if let Some(f) = on_failure {
                    if let Err(panic) = guarded("send on_failure", || {
                        f(&target, &RequestFailure::ConnectionClosed)
                    }) {
                        error!("send {id}: failure callback: {panic}");
                    }
                }
                self.teardown(e);
            }
        }
        Ok(id)
    }

    pub fn start_trace(&mut self) {
        self.trace.start();
    }

    pub fn stop_trace(&mut self) {
        self.trace.stop();
    }

    /// Snapshot of the trace buffer, or `None` while tracing is off.
    pub fn trace_log(&self) -> Option<Vec<TraceEntry>> {
        self.trace.entries()
    }

    /// Tears down any live session with `OK`.  Used when the engine stops.
    pub fn shutdown(&mut self) {
        if self.transport.is_some() {
            let _ = self.disconnect();
        }
    }

    // ── Events ────────────────────────────────────────────────────────────────

    /// Handles one transport event or timer fire.
    pub fn handle_event(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Transport { epoch, event } => {
                if epoch != self.epoch || self.transport.is_none() {
                    debug!("ignoring stale transport event from epoch {epoch}: {event:?}");
                    return;
                }
                self.handle_transport_event(event);
            }
            EngineEvent::Timer(fired) => self.handle_timer(fired),
        }
    }

    fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Opened => {
                if self.state != ConnectionState::Connecting {
                    debug!("ignoring transport open in state {:?}", self.state);
                    return;
                }
                self.set_state(ConnectionState::AwaitingConnectAck);
                let frame = self.connect_frame();
                self.transmit(&frame);
            }
            TransportEvent::Message(text) => {
                self.trace.push(|| format!("received {text}"));
                if let Err(e) = MessageDispatcher::dispatch(self, &text) {
                    self.teardown(e);
                }
            }
            TransportEvent::Error(reason) => {
                self.teardown(ConnectionError::new(ErrorCode::SocketError, reason));
            }
            TransportEvent::Closed { code, reason } => {
                let text = match code {
                    Some(code) => format!("socket closed (code {code}): {reason}"),
                    None => format!("socket closed: {reason}"),
                };
                self.teardown(ConnectionError::new(ErrorCode::SocketClose, text));
            }
        }
    }

    fn handle_timer(&mut self, fired: TimerFired) {
        match fired.kind {
            TimerKind::ConnectTimeout => {
                if !self.connect_timer.as_ref().is_some_and(|t| t.matches(&fired)) {
                    return;
                }
                self.connect_timer = None;
                if self.state != ConnectionState::Connected {
                    warn!("client {}: connect timed out", self.config.client_id());
                    self.teardown(ConnectionError::new(
                        ErrorCode::ConnectTimeout,
                        "no Connected frame before the connect timeout",
                    ));
                }
            }
            TimerKind::KeepAlive => match self.keepalive.on_fire(&fired, &mut self.timers) {
                KeepAliveVerdict::Stale => {}
                KeepAliveVerdict::SendPing => {
                    debug!("keepalive: sending Ping");
                    self.transmit(&OutboundFrame::Ping);
                }
                KeepAliveVerdict::Expired => {
                    warn!("client {}: keepalive expired", self.config.client_id());
                    self.teardown(ConnectionError::new(
                        ErrorCode::PingTimeout,
                        "no traffic from server within the keepalive interval",
                    ));
                }
            },
            TimerKind::RequestTimeout(id) => {
                if !self.request_timers.get(&id).is_some_and(|t| t.matches(&fired)) {
                    return;
                }
                self.request_timers.remove(&id);
                warn!("request {id}: timed out");
                let correlator = &mut self.correlator;
                if let Err(e) = guarded("request on_failure", || correlator.expire(id)) {
                    self.teardown(e);
                }
            }
        }
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    /// Ends the current session.  See the module docs for the sequence.
    pub fn teardown(&mut self, reason: ConnectionError) {
        if self.transport.is_none() && self.state == ConnectionState::Disconnected {
            return;
        }
        if reason.is_ok() {
            info!("client {}: session ended: {reason}", self.config.client_id());
        } else {
            warn!("client {}: session ended: {reason}", self.config.client_id());
        }

        self.connect_timer = None;
        self.keepalive.cancel();
        self.request_timers.clear();
        self.epoch += 1;
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        let was_connected = std::mem::take(&mut self.reached_connected);
        let session = self.session.take();
        self.set_state(ConnectionState::Disconnected);

        for pending in self.correlator.drain() {
            let id = pending.id();
            if let Err(e) = guarded("request on_failure", || {
                pending.fail(&RequestFailure::ConnectionClosed)
            }) {
                error!("request {id}: failure callback during teardown: {e}");
            }
        }

        let terminal = if was_connected {
            let handler = &mut self.handler;
            guarded("on_connection_lost", || handler.on_connection_lost(&reason))
        } else if let Some(on_failure) = session.and_then(|s| s.on_failure) {
            guarded("connect on_failure", || on_failure(&reason))
        } else {
            Ok(())
        };
        if let Err(e) = terminal {
            error!("client {}: terminal callback failed: {e}", self.config.client_id());
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn set_state(&mut self, next: ConnectionState) {
        if self.state != next {
            debug!("state {:?} -> {next:?}", self.state);
            let previous = self.state;
            self.trace.push(|| format!("state {previous:?} -> {next:?}"));
            self.state = next;
        }
    }

    fn require_connected(&self, operation: &str) -> Result<(), ClientError> {
        if self.state == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ClientError::InvalidState(format!(
                "{operation} requires Connected, state is {:?}",
                self.state
            )))
        }
    }

    fn connect_frame(&self) -> OutboundFrame {
        let (user, password, keep_alive_timeout) = match &self.session {
            Some(s) => (s.user.clone(), s.password.clone(), s.keep_alive_secs),
            None => (None, None, 0),
        };
        OutboundFrame::Connect {
            client_id: self.config.client_id().to_string(),
            user,
            password,
            keep_alive_timeout,
        }
    }

    /// Registers a correlated request, arms its timeout and sends its frame.
    fn issue_request(
        &mut self,
        target: RequestTarget,
        options: RequestOptions,
        frame: impl FnOnce(u64) -> OutboundFrame,
    ) -> u64 {
        let (timeout, on_success, on_failure) = options.into_parts();
        let id = self.correlator.register(target, on_success, on_failure);
        if let Some(timeout) = timeout {
            let guard = self.timers.schedule(TimerKind::RequestTimeout(id), timeout);
            self.request_timers.insert(id, guard);
        }
        self.transmit(&frame(id));
        id
    }

    /// Encodes, traces and writes a frame.
    fn write_frame(&mut self, frame: &OutboundFrame) -> Result<(), ConnectionError> {
        let text = encode_frame(frame)
            .map_err(|e| ConnectionError::new(ErrorCode::InternalError, e.to_string()))?;
        self.trace.push(|| match encode_frame(&frame.redacted()) {
            Ok(redacted) => format!("sent {redacted}"),
            Err(_) => format!("sent {}", frame.frame_type()),
        });
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ConnectionError::new(ErrorCode::SocketError, "no transport"))?;
        transport
            .send(text)
            .map_err(|e| ConnectionError::new(ErrorCode::SocketError, e.to_string()))?;
        debug!("sent {}", frame.frame_type());
        Ok(())
    }

    /// Writes a frame, tearing the session down if that fails.  Returns
    /// whether the frame was written.
    fn transmit(&mut self, frame: &OutboundFrame) -> bool {
        match self.write_frame(frame) {
            Ok(()) => true,
            Err(e) => {
                self.teardown(e);
                false
            }
        }
    }
}

impl DispatchTarget for Connection {
    fn state(&self) -> ConnectionState {
        self.state
    }

    fn on_connected(&mut self, frame: ConnectedFrame) -> Result<(), ConnectionError> {
        if frame.rc != 0 {
            let reason = frame
                .reason
                .unwrap_or_else(|| "connection refused by server".to_string());
            return Err(
                ConnectionError::new(ErrorCode::ConnackReturnCode, reason)
                    .with_result_code(frame.rc),
            );
        }
        self.connect_timer = None;
        self.reached_connected = true;
        self.set_state(ConnectionState::Connected);
        self.keepalive.arm(&mut self.timers);
        info!("client {}: connected", self.config.client_id());

        let callbacks = self
            .session
            .as_mut()
            .map(|s| (s.on_success.take(), s.on_failure.take()));
        if let Some((Some(on_success), _)) = callbacks {
            guarded("connect on_success", on_success)?;
        }
        Ok(())
    }

    fn on_message(&mut self, message: Message) -> Result<(), ConnectionError> {
        let handler = &mut self.handler;
        guarded("on_message_arrived", || handler.on_message_arrived(message))?.map_err(|e| {
            ConnectionError::new(
                ErrorCode::InternalError,
                format!("on_message_arrived failed: {e:#}"),
            )
        })
    }

    fn on_ack(&mut self, ack: AckFrame) -> Result<(), ConnectionError> {
        if let Some(mut timer) = self.request_timers.remove(&ack.id) {
            timer.cancel();
        }
        let correlator = &mut self.correlator;
        if let Some(resolved) = guarded("request callback", || correlator.resolve(&ack))? {
            debug!(
                "request {} ({:?}) {}",
                resolved.id,
                resolved.kind,
                if resolved.accepted { "accepted" } else { "rejected" }
            );
        }
        Ok(())
    }

    fn send_pong(&mut self) -> Result<(), ConnectionError> {
        self.write_frame(&OutboundFrame::Pong)
    }

    fn reset_keepalive(&mut self) {
        self.keepalive.reset(&mut self.timers);
    }
}

fn require_non_empty(what: &str, value: &str) -> Result<(), ClientError> {
    if value.is_empty() {
        Err(ClientError::InvalidArgument(format!("{what} must not be empty")))
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
