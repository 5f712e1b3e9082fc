//! # jsonmsg-core
//!
//! Shared, I/O-free building blocks for the json-msg publish/subscribe client.
//!
//! The json-msg protocol carries one JSON object per WebSocket text frame.
//! Every object has an `Action` field naming the frame type, for example:
//!
//! ```json
//! {"Action":"Subscribe","Name":"s1","Topic":"/a/b","ID":1}
//! ```
//!
//! This crate has zero dependencies on sockets, timers or async runtimes.  It
//! defines:
//!
//! - **`protocol`** – The frame types, the JSON codec and the
//!   [`RequestCorrelator`] that matches inbound `Ack` frames to the requests
//!   that caused them.
//!
//! - **`domain`** – The [`Message`] value object and the typed option
//!   structures the caller hands to the engine.
//!
//! - **`error`** – [`ErrorCode`], the synchronous [`ClientError`] and the
//!   [`ConnectionError`] delivered to terminal callbacks.
//!
//! - **`trace`** – The bounded diagnostic [`TraceBuffer`].
//!
//! The connection engine itself (state machine, timers, WebSocket transport)
//! lives in the `jsonmsg-client` crate.

pub mod domain;
pub mod error;
pub mod protocol;
pub mod trace;

pub use domain::message::{DestinationType, Message, Qos};
pub use domain::options::{ConnectOptions, RequestOptions, SubscribeOptions};
pub use error::{ClientError, ConnectionError, ErrorCode};
pub use protocol::codec::{decode_frame, encode_frame, ProtocolError};
pub use protocol::correlation::{RequestCorrelator, RequestFailure, RequestKind, RequestTarget};
pub use protocol::frames::{FrameType, InboundFrame, OutboundFrame};
pub use trace::{TraceBuffer, TraceEntry, TRACE_CAPACITY};
