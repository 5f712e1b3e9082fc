//! Error kinds shared by the protocol crate and the connection engine.
//!
//! There are two very different ways a json-msg client can fail:
//!
//! - **Synchronously**, because the caller misused the API (connecting twice,
//!   subscribing while disconnected, passing inconsistent options).  These
//!   surface as [`ClientError`] returned straight from the call.
//!
//! - **Asynchronously**, because something happened on the wire (the socket
//!   closed, the server stopped answering, a frame could not be parsed).  These
//!   never cross an async boundary as an `Err`; they are converted into a
//!   [`ConnectionError`] and handed to exactly one terminal callback.
//!
//! Both carry an [`ErrorCode`] so applications can branch on a stable value.

use std::fmt;

use thiserror::Error;

/// Stable error codes reported to applications.
///
/// | Code | Name                        | Meaning                                     |
/// |------|-----------------------------|---------------------------------------------|
/// | 0    | `OK`                        | No error (normal disconnect)                |
/// | 1    | `CONNECT_TIMEOUT`           | No `Connected` frame within the timeout     |
/// | 2    | `PING_TIMEOUT`              | Keepalive expired without inbound traffic   |
/// | 3    | `INTERNAL_ERROR`            | An application callback failed or panicked  |
/// | 4    | `CONNACK_RETURNCODE`        | The server refused the `Connect` frame      |
/// | 5    | `SOCKET_ERROR`              | Transport-level error                       |
/// | 6    | `SOCKET_CLOSE`              | Transport closed underneath the engine      |
/// | 7    | `INVALID_JSON_MESSAGE_TYPE` | Malformed, unknown or unexpected frame      |
/// | 8    | `INVALID_STATE`             | API called in the wrong connection state    |
/// | 9    | `INVALID_ARGUMENT`          | Option or argument validation failed        |
/// | 10   | `REQUEST_TIMEOUT`           | A request was not acknowledged in time      |
/// | 11   | `SERVER_CLOSE`              | The server sent `Close` with a nonzero code |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Ok = 0,
    ConnectTimeout = 1,
    PingTimeout = 2,
    InternalError = 3,
    ConnackReturnCode = 4,
    SocketError = 5,
    SocketClose = 6,
    InvalidJsonMessageType = 7,
    InvalidState = 8,
    InvalidArgument = 9,
    RequestTimeout = 10,
    ServerClose = 11,
}

impl ErrorCode {
    /// Returns the numeric value of this code.
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Returns the upper-case symbolic name, e.g. `"PING_TIMEOUT"`.
    pub fn name(self) -> &'static str {
        match self {
            ErrorCode::Ok => "OK",
            ErrorCode::ConnectTimeout => "CONNECT_TIMEOUT",
            ErrorCode::PingTimeout => "PING_TIMEOUT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConnackReturnCode => "CONNACK_RETURNCODE",
            ErrorCode::SocketError => "SOCKET_ERROR",
            ErrorCode::SocketClose => "SOCKET_CLOSE",
            ErrorCode::InvalidJsonMessageType => "INVALID_JSON_MESSAGE_TYPE",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::RequestTimeout => "REQUEST_TIMEOUT",
            ErrorCode::ServerClose => "SERVER_CLOSE",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// The reason a session ended, handed to the terminal callback.
///
/// `code` is [`ErrorCode::Ok`] for a caller-initiated `disconnect()` and for a
/// server `Close` frame with result code 0.  `result_code` carries the
/// server-supplied `RC` when the failure came from a frame (a refused
/// `Connected` or a `Close` with a nonzero code).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionError {
    pub code: ErrorCode,
    pub text: String,
    pub result_code: Option<u32>,
}

impl ConnectionError {
    pub fn new(code: ErrorCode, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
            result_code: None,
        }
    }

    /// A "no error" terminal reason, used for normal disconnects.
    pub fn ok(text: impl Into<String>) -> Self {
        Self::new(ErrorCode::Ok, text)
    }

    /// Attaches the server's result code.
    pub fn with_result_code(mut self, rc: u32) -> Self {
        self.result_code = Some(rc);
        self
    }

    pub fn is_ok(&self) -> bool {
        self.code == ErrorCode::Ok
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.result_code {
            Some(rc) => write!(f, "{}: {} (RC={rc})", self.code.name(), self.text),
            None => write!(f, "{}: {}", self.code.name(), self.text),
        }
    }
}

/// Errors returned synchronously from the public API.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientError {
    /// The operation is not valid in the current connection state.
    ///
    /// For example, calling `connect` while a transport already exists, or
    /// subscribing before the handshake has completed.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An argument or option combination was rejected by validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport could not be created (e.g. the URI is unusable).
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine task has shut down and can no longer accept commands.
    #[error("client engine has stopped")]
    EngineStopped,
}

impl ClientError {
    /// Maps this error onto the shared [`ErrorCode`] table.
    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::InvalidState(_) | ClientError::EngineStopped => ErrorCode::InvalidState,
            ClientError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            ClientError::Transport(_) => ErrorCode::SocketError,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
