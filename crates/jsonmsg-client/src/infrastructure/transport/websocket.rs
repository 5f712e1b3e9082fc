//! tokio-tungstenite implementation of the transport traits.
//!
//! # Task layout
//!
//! [`WsConnector::open`] spawns one socket task per transport and returns a
//! [`WsTransport`] handle immediately.  The handle talks to the task through
//! an unbounded channel of [`Outgoing`] commands; the task reports everything
//! it observes back to the engine queue.
//!
//! ```text
//!  engine ──Outgoing──▶ socket task ──WsMessage──▶ broker
//!  engine ◀──EngineEvent── socket task ◀──WsMessage── broker
//! ```
//!
//! The task runs `tokio::select!` over the inbound WebSocket stream and the
//! outgoing command channel, so a slow reader never blocks a write.
//!
//! # Sub-protocol negotiation
//!
//! The handshake request carries `Sec-WebSocket-Protocol: json-msg`.  If the
//! server's response does not echo it, the transport reports an error and
//! never becomes open.
//!
//! Only `ws://` works out of the box: the workspace enables the `connect`
//! feature of tokio-tungstenite without a TLS backend, so `wss://` URIs fail
//! at connect time with a transport error.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::{Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

use super::{emit, Connector, EventSender, ReadyState, Transport, TransportError, SUBPROTOCOL};
use crate::domain::events::TransportEvent;

/// Commands from the engine to a socket task.
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// Opens real WebSocket connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(
        &self,
        uri: &str,
        epoch: u64,
        events: EventSender,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let request = build_request(uri)?;
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let state = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));

        debug!("epoch {epoch}: opening WebSocket to {uri}");
        tokio::spawn(run_socket(
            request,
            epoch,
            events,
            outgoing_rx,
            Arc::clone(&state),
        ));

        Ok(Box::new(WsTransport {
            outgoing: outgoing_tx,
            state,
        }))
    }
}

/// Handle to one socket task.
#[derive(Debug)]
pub struct WsTransport {
    outgoing: UnboundedSender<Outgoing>,
    state: Arc<AtomicU8>,
}

impl Transport for WsTransport {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(TransportError::NotOpen(state));
        }
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::Stopped)
    }

    fn close(&mut self) {
        if self.ready_state() == ReadyState::Open {
            self.state.store(ReadyState::Closing as u8, Ordering::SeqCst);
        }
        // An exited task has nothing left to close.
        let _ = self.outgoing.send(Outgoing::Close);
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::SeqCst))
    }
}

/// Builds the handshake request with the json-msg sub-protocol header.
fn build_request(uri: &str) -> Result<Request, TransportError> {
    let mut request = uri
        .into_client_request()
        .map_err(|e| TransportError::InvalidUri {
            uri: uri.to_string(),
            reason: e.to_string(),
        })?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(SUBPROTOCOL));
    Ok(request)
}

/// Returns `true` if the handshake response selected the json-msg protocol.
fn negotiated_json_msg(response: &Response) -> bool {
    response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|p| p.trim() == SUBPROTOCOL))
}

async fn run_socket(
    request: Request,
    epoch: u64,
    events: EventSender,
    mut outgoing: UnboundedReceiver<Outgoing>,
    state: Arc<AtomicU8>,
) {
    let set_state = |s: ReadyState| state.store(s as u8, Ordering::SeqCst);

    // ── Handshake ─────────────────────────────────────────────────────────────
    //
    // The engine may give up (connect timeout, disconnect) while the handshake
    // is still in flight; a Close command or a dropped handle aborts it.
    let ws_stream = tokio::select! {
        result = connect_async(request) => match result {
            Ok((stream, response)) if negotiated_json_msg(&response) => stream,
            Ok((mut stream, _)) => {
                warn!("epoch {epoch}: server did not negotiate the {SUBPROTOCOL} sub-protocol");
                let _ = stream.close(None).await;
                set_state(ReadyState::Closed);
                emit(
                    &events,
                    epoch,
                    TransportEvent::Error(format!(
                        "server did not accept the {SUBPROTOCOL} sub-protocol"
                    )),
                );
                return;
            }
            Err(e) => {
                warn!("epoch {epoch}: WebSocket connect failed: {e}");
                set_state(ReadyState::Closed);
                emit(&events, epoch, TransportEvent::Error(e.to_string()));
                return;
            }
        },
        _ = outgoing.recv() => {
            debug!("epoch {epoch}: transport closed during handshake");
            set_state(ReadyState::Closed);
            return;
        }
    };

    info!("epoch {epoch}: WebSocket open");
    set_state(ReadyState::Open);
    emit(&events, epoch, TransportEvent::Opened);

    // ── Frame loop ────────────────────────────────────────────────────────────
    let (mut sink, mut stream) = ws_stream.split();
    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    emit(&events, epoch, TransportEvent::Message(text));
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    debug!("epoch {epoch}: peer closed the WebSocket (code {code:?})");
                    emit(&events, epoch, TransportEvent::Closed { code, reason });
                    break;
                }
                Some(Ok(WsMessage::Binary(data))) => {
                    warn!("epoch {epoch}: ignoring {}-byte binary frame", data.len());
                }
                // Ping/Pong control frames are answered by tungstenite itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("epoch {epoch}: WebSocket error: {e}");
                    emit(&events, epoch, TransportEvent::Error(e.to_string()));
                    break;
                }
                None => {
                    emit(
                        &events,
                        epoch,
                        TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        },
                    );
                    break;
                }
            },
            command = outgoing.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(WsMessage::Text(text)).await {
                        warn!("epoch {epoch}: WebSocket send failed: {e}");
                        emit(&events, epoch, TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    set_state(ReadyState::Closing);
                    let _ = sink.send(WsMessage::Close(None)).await;
                    let _ = sink.close().await;
                    debug!("epoch {epoch}: WebSocket closed by engine");
                    break;
                }
            },
        }
    }
    set_state(ReadyState::Closed);
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EngineEvent;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{
        ErrorResponse, Request as ServerRequest, Response as ServerResponse,
    };

    #[test]
    fn test_request_carries_json_msg_subprotocol() {
        let request = build_request("ws://127.0.0.1:9/ws").unwrap();
        assert_eq!(
            request.headers().get(SEC_WEBSOCKET_PROTOCOL).unwrap(),
            "json-msg"
        );
    }

    #[test]
    fn test_unparseable_uri_is_rejected() {
        let result = build_request("not a uri");
        assert!(matches!(result, Err(TransportError::InvalidUri { .. })));
    }

    /// Starts a one-connection server that optionally echoes the sub-protocol,
    /// echoes back every text frame it receives, and returns its address.
    async fn spawn_echo_server(echo_protocol: bool) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = move |req: &ServerRequest, mut resp: ServerResponse| {
                if echo_protocol {
                    if let Some(proto) = req.headers().get(SEC_WEBSOCKET_PROTOCOL) {
                        resp.headers_mut()
                            .insert(SEC_WEBSOCKET_PROTOCOL, proto.clone());
                    }
                }
                Ok::<_, ErrorResponse>(resp)
            };
            let Ok(mut ws) = accept_hdr_async(tcp, callback).await else {
                return;
            };
            while let Some(Ok(msg)) = ws.next().await {
                if msg.is_text() && ws.send(msg).await.is_err() {
                    break;
                }
            }
        });
        addr
    }

    async fn next_event(rx: &mut UnboundedReceiver<EngineEvent>) -> TransportEvent {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(EngineEvent::Transport { event, .. })) => event,
            other => panic!("expected a transport event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_send_and_receive_over_loopback() {
        // Arrange
        let addr = spawn_echo_server(true).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WsConnector
            .open(&format!("ws://{addr}/ws"), 1, tx)
            .unwrap();

        // Act
        let opened = next_event(&mut rx).await;
        transport.send(r#"{"Action":"Ping"}"#.to_string()).unwrap();
        let echoed = next_event(&mut rx).await;

        // Assert
        assert_eq!(opened, TransportEvent::Opened);
        assert_eq!(transport.ready_state(), ReadyState::Open);
        assert_eq!(
            echoed,
            TransportEvent::Message(r#"{"Action":"Ping"}"#.to_string())
        );

        transport.close();
        assert_ne!(transport.ready_state(), ReadyState::Open);
    }

    #[tokio::test]
    async fn test_server_without_subprotocol_is_an_error() {
        // Arrange
        let addr = spawn_echo_server(false).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = WsConnector
            .open(&format!("ws://{addr}/ws"), 1, tx)
            .unwrap();

        // Act
        let event = next_event(&mut rx).await;

        // Assert
        assert!(matches!(event, TransportEvent::Error(_)));
        assert!(transport.send("x".to_string()).is_err());
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected() {
        // Arrange: nothing listens on this port, the handshake cannot finish.
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut transport = WsConnector.open("ws://127.0.0.1:9/ws", 1, tx).unwrap();

        // Act
        let result = transport.send("x".to_string());

        // Assert
        assert!(matches!(result, Err(TransportError::NotOpen(_))));
    }
}
