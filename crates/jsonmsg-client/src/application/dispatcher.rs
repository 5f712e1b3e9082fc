//! Inbound frame dispatch.
//!
//! [`MessageDispatcher::dispatch`] takes one raw text frame from the
//! transport, decodes it and routes it to a [`DispatchTarget`] (the
//! [`Connection`](super::connection::Connection) in production, a recording
//! fake in tests).
//!
//! # Routing table
//!
//! | Frame       | Valid in            | Action                               |
//! |-------------|---------------------|--------------------------------------|
//! | `Connected` | AwaitingConnectAck  | complete the handshake               |
//! | `Send`      | Connected           | deliver to `on_message_arrived`      |
//! | `Ack`       | Connected           | resolve the pending request          |
//! | `Close`     | any                 | tear down (OK or SERVER_CLOSE)       |
//! | `Ping`      | any                 | reply with `Pong`                    |
//! | `Pong`      | any                 | nothing beyond the liveness reset    |
//!
//! A frame that cannot be decoded, or arrives in a state where it is not
//! valid, becomes an `INVALID_JSON_MESSAGE_TYPE` error.  An `Ack` before the
//! handshake completes is ignored: no request can be pending then.
//!
//! Every frame that dispatches without error resets the keepalive monitor.
//!
//! Errors are returned, never acted on here: the caller owns teardown.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use jsonmsg_core::protocol::frames::{AckFrame, CloseFrame, ConnectedFrame};
use jsonmsg_core::{decode_frame, ConnectionError, ErrorCode, InboundFrame, Message};
use tracing::{debug, error};

use super::connection::ConnectionState;

/// The operations dispatch needs from the connection.
pub trait DispatchTarget {
    fn state(&self) -> ConnectionState;

    /// Handles `Connected` while awaiting it.
    fn on_connected(&mut self, frame: ConnectedFrame) -> Result<(), ConnectionError>;

    /// Hands a delivered message to the application.
    fn on_message(&mut self, message: Message) -> Result<(), ConnectionError>;

    /// Resolves a request acknowledgment.
    fn on_ack(&mut self, ack: AckFrame) -> Result<(), ConnectionError>;

    /// Replies to a server `Ping`.
    fn send_pong(&mut self) -> Result<(), ConnectionError>;

    /// Records inbound traffic for the keepalive monitor.
    fn reset_keepalive(&mut self);
}

/// Stateless router from raw frames to [`DispatchTarget`] calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Decodes and routes one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns the [`ConnectionError`] the session must be torn down with.
    pub fn dispatch<T: DispatchTarget>(target: &mut T, text: &str) -> Result<(), ConnectionError> {
        let frame = decode_frame(text).map_err(|e| {
            ConnectionError::new(ErrorCode::InvalidJsonMessageType, e.to_string())
        })?;
        let state = target.state();
        debug!("dispatching {} in state {state:?}", frame.frame_type());

        match frame {
            InboundFrame::Connected(connected) => {
                if state != ConnectionState::AwaitingConnectAck {
                    return Err(unexpected("Connected", state));
                }
                target.on_connected(connected)?;
            }
            InboundFrame::Send(send) => {
                if state != ConnectionState::Connected {
                    return Err(unexpected("Send", state));
                }
                target.on_message(Message::from(send))?;
            }
            InboundFrame::Ack(ack) => {
                if state == ConnectionState::Connected {
                    target.on_ack(ack)?;
                } else {
                    debug!("ignoring Ack {} in state {state:?}", ack.id);
                }
            }
            InboundFrame::Close(close) => return Err(server_close(close)),
            InboundFrame::Ping => target.send_pong()?,
            InboundFrame::Pong => {}
        }

        target.reset_keepalive();
        Ok(())
    }
}

fn unexpected(action: &str, state: ConnectionState) -> ConnectionError {
    ConnectionError::new(
        ErrorCode::InvalidJsonMessageType,
        format!("unexpected {action} frame in state {state:?}"),
    )
}

/// Maps a server `Close` frame to the terminal error it implies.
pub fn server_close(close: CloseFrame) -> ConnectionError {
    let reason = close
        .reason
        .unwrap_or_else(|| "closed by server".to_string());
    if close.rc == 0 {
        ConnectionError::ok(reason)
    } else {
        ConnectionError::new(ErrorCode::ServerClose, reason).with_result_code(close.rc)
    }
}

/// Runs an application callback, converting a panic into `INTERNAL_ERROR`.
///
/// `context` names the callback in the error text and log line.
pub fn guarded<R>(context: &str, f: impl FnOnce() -> R) -> Result<R, ConnectionError> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let detail = panic_message(payload.as_ref());
        error!("{context} panicked: {detail}");
        ConnectionError::new(
            ErrorCode::InternalError,
            format!("{context} panicked: {detail}"),
        )
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every call; fails `on_message` when told to.
    struct FakeTarget {
        state: ConnectionState,
        calls: Vec<String>,
        resets: usize,
        fail_message: bool,
    }

    impl FakeTarget {
        fn new(state: ConnectionState) -> Self {
            Self {
                state,
                calls: Vec::new(),
                resets: 0,
                fail_message: false,
            }
        }
    }

    impl DispatchTarget for FakeTarget {
        fn state(&self) -> ConnectionState {
            self.state
        }

        fn on_connected(&mut self, frame: ConnectedFrame) -> Result<(), ConnectionError> {
            self.calls.push(format!("connected rc={}", frame.rc));
            Ok(())
        }

        fn on_message(&mut self, message: Message) -> Result<(), ConnectionError> {
            if self.fail_message {
                return Err(ConnectionError::new(ErrorCode::InternalError, "handler failed"));
            }
            self.calls.push(format!("message {}", message.destination_name()));
            Ok(())
        }

        fn on_ack(&mut self, ack: AckFrame) -> Result<(), ConnectionError> {
            self.calls.push(format!("ack {}", ack.id));
            Ok(())
        }

        fn send_pong(&mut self) -> Result<(), ConnectionError> {
            self.calls.push("pong".to_string());
            Ok(())
        }

        fn reset_keepalive(&mut self) {
            self.resets += 1;
        }
    }

    #[test]
    fn test_connected_while_awaiting_ack_completes_handshake() {
        // Arrange
        let mut target = FakeTarget::new(ConnectionState::AwaitingConnectAck);

        // Act
        let result = MessageDispatcher::dispatch(&mut target, r#"{"Action":"Connected"}"#);

        // Assert
        assert!(result.is_ok());
        assert_eq!(target.calls, vec!["connected rc=0"]);
        assert_eq!(target.resets, 1);
    }

    #[test]
    fn test_connected_after_handshake_is_invalid() {
        let mut target = FakeTarget::new(ConnectionState::Connected);

        let err = MessageDispatcher::dispatch(&mut target, r#"{"Action":"Connected"}"#).unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidJsonMessageType);
        assert!(target.calls.is_empty());
        assert_eq!(target.resets, 0);
    }

    #[test]
    fn test_send_before_handshake_is_invalid() {
        let mut target = FakeTarget::new(ConnectionState::AwaitingConnectAck);

        let err = MessageDispatcher::dispatch(
            &mut target,
            r#"{"Action":"Send","Topic":"/t","QoS":0,"Body":"x"}"#,
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::InvalidJsonMessageType);
    }

    #[test]
    fn test_send_while_connected_is_delivered() {
        let mut target = FakeTarget::new(ConnectionState::Connected);

        MessageDispatcher::dispatch(
            &mut target,
            r#"{"Action":"Send","Topic":"/t","QoS":0,"Body":"x"}"#,
        )
        .unwrap();

        assert_eq!(target.calls, vec!["message /t"]);
        assert_eq!(target.resets, 1);
    }

    #[test]
    fn test_ack_before_handshake_is_ignored_but_resets() {
        let mut target = FakeTarget::new(ConnectionState::AwaitingConnectAck);

        MessageDispatcher::dispatch(&mut target, r#"{"Action":"Ack","ID":1}"#).unwrap();

        assert!(target.calls.is_empty());
        assert_eq!(target.resets, 1);
    }

    #[test]
    fn test_ping_is_answered_with_pong() {
        let mut target = FakeTarget::new(ConnectionState::Connected);

        MessageDispatcher::dispatch(&mut target, r#"{"Action":"Ping"}"#).unwrap();

        assert_eq!(target.calls, vec!["pong"]);
    }

    #[test]
    fn test_pong_only_resets_keepalive() {
        let mut target = FakeTarget::new(ConnectionState::Connected);

        MessageDispatcher::dispatch(&mut target, r#"{"Action":"Pong"}"#).unwrap();

        assert!(target.calls.is_empty());
        assert_eq!(target.resets, 1);
    }

    #[test]
    fn test_close_with_zero_rc_is_ok() {
        let mut target = FakeTarget::new(ConnectionState::Connected);

        let err = MessageDispatcher::dispatch(&mut target, r#"{"Action":"Close","RC":0}"#)
            .unwrap_err();

        assert!(err.is_ok());
    }

    #[test]
    fn test_close_with_nonzero_rc_is_server_close() {
        let mut target = FakeTarget::new(ConnectionState::Connected);

        let err = MessageDispatcher::dispatch(
            &mut target,
            r#"{"Action":"Close","RC":3,"Reason":"maintenance"}"#,
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::ServerClose);
        assert_eq!(err.result_code, Some(3));
        assert_eq!(err.text, "maintenance");
    }

    #[test]
    fn test_malformed_and_unknown_frames_are_invalid() {
        for text in ["not json", r#"{"Action":"Teleport"}"#, r#"{"Action":"Subscribe"}"#] {
            let mut target = FakeTarget::new(ConnectionState::Connected);
            let err = MessageDispatcher::dispatch(&mut target, text).unwrap_err();
            assert_eq!(err.code, ErrorCode::InvalidJsonMessageType, "frame: {text}");
        }
    }

    #[test]
    fn test_handler_error_skips_keepalive_reset() {
        let mut target = FakeTarget::new(ConnectionState::Connected);
        target.fail_message = true;

        let err = MessageDispatcher::dispatch(
            &mut target,
            r#"{"Action":"Send","Topic":"/t","Body":"x"}"#,
        )
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::InternalError);
        assert_eq!(target.resets, 0);
    }

    #[test]
    fn test_guarded_converts_panic_to_internal_error() {
        let result: Result<(), _> = guarded("test callback", || panic!("boom"));

        let err = result.unwrap_err();
        assert_eq!(err.code, ErrorCode::InternalError);
        assert!(err.text.contains("boom"));
    }

    #[test]
    fn test_guarded_passes_value_through() {
        assert_eq!(guarded("test callback", || 42), Ok(42));
    }
}
