//! Protocol module containing frame types, the JSON codec and request
//! correlation.

pub mod codec;
pub mod correlation;
pub mod frames;

pub use codec::{decode_frame, encode_frame, ProtocolError};
pub use correlation::{PendingRequest, RequestCorrelator, RequestFailure, RequestKind, RequestTarget};
pub use frames::*;

/// WebSocket sub-protocol identifier that must be negotiated on the transport.
pub const SUBPROTOCOL: &str = "json-msg";
