//! JSON encoding and decoding of json-msg frames.
//!
//! # Wire format
//!
//! One frame is one complete WebSocket text message containing one JSON
//! object.  There is no additional framing: the WebSocket layer already
//! delimits messages, so the codec only has to turn a `&str` into a typed
//! frame and back.
//!
//! # Decoding steps
//!
//! 1. Parse the text as a generic JSON value.
//! 2. Require an object with a string `Action` field.
//! 3. Map the action to a [`FrameType`]; unknown actions are errors.
//! 4. Reject actions only a client may send (`Connect`, `Subscribe`, ...).
//! 5. Deserialize the remaining fields into the payload struct for that type.
//!
//! Doing the `Action` lookup by hand (instead of an internally tagged serde
//! enum) gives the caller a precise [`ProtocolError`] for each failure, which
//! ends up in the `INVALID_JSON_MESSAGE_TYPE` error text.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use super::frames::{FrameType, InboundFrame, OutboundFrame};

/// Errors produced while encoding or decoding frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The text is not valid JSON.
    #[error("frame is not valid JSON: {0}")]
    MalformedJson(String),

    /// The JSON value is not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The object has no string `Action` field.
    #[error("frame has no Action field")]
    MissingAction,

    /// The `Action` value does not name a json-msg frame type.
    #[error("unknown frame action: {0:?}")]
    UnknownAction(String),

    /// The server sent an action that only a client may send.
    #[error("{0} frames are never sent by the server")]
    UnexpectedInbound(FrameType),

    /// A known action whose fields are missing or of the wrong type.
    #[error("invalid {action} frame: {reason}")]
    InvalidField { action: FrameType, reason: String },

    /// Serialization of an outbound frame failed.
    #[error("failed to encode frame: {0}")]
    Encode(String),
}

/// Serializes an outbound frame to the text sent on the WebSocket.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serde_json fails, which can only happen
/// for a `Send` body containing a non-finite float.
pub fn encode_frame(frame: &OutboundFrame) -> Result<String, ProtocolError> {
    serde_json::to_string(frame).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Parses one inbound WebSocket text message into a typed frame.
///
/// # Errors
///
/// See [`ProtocolError`] for the individual failure cases.
pub fn decode_frame(text: &str) -> Result<InboundFrame, ProtocolError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;

    let frame_type = {
        let action = value
            .as_object()
            .ok_or(ProtocolError::NotAnObject)?
            .get("Action")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingAction)?;
        FrameType::from_action(action)
            .ok_or_else(|| ProtocolError::UnknownAction(action.to_string()))?
    };

    match frame_type {
        FrameType::Connected => payload(frame_type, value).map(InboundFrame::Connected),
        FrameType::Send => payload(frame_type, value).map(InboundFrame::Send),
        FrameType::Ack => payload(frame_type, value).map(InboundFrame::Ack),
        FrameType::Close => payload(frame_type, value).map(InboundFrame::Close),
        FrameType::Ping => Ok(InboundFrame::Ping),
        FrameType::Pong => Ok(InboundFrame::Pong),
        FrameType::Connect
        | FrameType::Subscribe
        | FrameType::CloseSubscription
        | FrameType::DestroySubscription => Err(ProtocolError::UnexpectedInbound(frame_type)),
    }
}

fn payload<T: DeserializeOwned>(action: FrameType, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidField {
        action,
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::Qos;
    use serde_json::json;

    #[test]
    fn test_decode_connected_with_default_rc() {
        let frame = decode_frame(r#"{"Action":"Connected"}"#).unwrap();
        match frame {
            InboundFrame::Connected(c) => {
                assert_eq!(c.rc, 0);
                assert_eq!(c.reason, None);
            }
            other => panic!("expected Connected, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_send_with_object_body() {
        // Arrange
        let text = r#"{"Action":"Send","Topic":"/t","QoS":1,"Body":{"v":1},"Name":"s1"}"#;

        // Act
        let frame = decode_frame(text).unwrap();

        // Assert
        match frame {
            InboundFrame::Send(s) => {
                assert_eq!(s.topic, "/t");
                assert_eq!(s.qos, Qos::AtLeastOnce);
                assert_eq!(s.body, json!({"v": 1}));
                assert_eq!(s.name.as_deref(), Some("s1"));
                assert!(!s.retain);
            }
            other => panic!("expected Send, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_ack_with_rejection() {
        let frame = decode_frame(r#"{"Action":"Ack","ID":7,"RC":3,"Reason":"denied"}"#).unwrap();
        match frame {
            InboundFrame::Ack(a) => {
                assert_eq!(a.id, 7);
                assert_eq!(a.rc, 3);
                assert_eq!(a.reason.as_deref(), Some("denied"));
            }
            other => panic!("expected Ack, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_json() {
        assert!(matches!(
            decode_frame("{not json"),
            Err(ProtocolError::MalformedJson(_))
        ));
    }

    #[test]
    fn test_decode_rejects_non_object() {
        assert_eq!(decode_frame("[1,2]"), Err(ProtocolError::NotAnObject));
    }

    #[test]
    fn test_decode_rejects_missing_action() {
        assert_eq!(
            decode_frame(r#"{"Topic":"/t"}"#),
            Err(ProtocolError::MissingAction)
        );
    }

    #[test]
    fn test_decode_rejects_unknown_action() {
        assert_eq!(
            decode_frame(r#"{"Action":"Teleport"}"#),
            Err(ProtocolError::UnknownAction("Teleport".to_string()))
        );
    }

    #[test]
    fn test_decode_rejects_client_only_action() {
        assert_eq!(
            decode_frame(r#"{"Action":"Subscribe","Name":"s","Topic":"/t","ID":1}"#),
            Err(ProtocolError::UnexpectedInbound(FrameType::Subscribe))
        );
    }

    #[test]
    fn test_decode_rejects_ack_without_id() {
        assert!(matches!(
            decode_frame(r#"{"Action":"Ack","RC":0}"#),
            Err(ProtocolError::InvalidField {
                action: FrameType::Ack,
                ..
            })
        ));
    }

    #[test]
    fn test_decode_rejects_send_with_bad_qos() {
        assert!(matches!(
            decode_frame(r#"{"Action":"Send","Topic":"/t","QoS":9,"Body":"x"}"#),
            Err(ProtocolError::InvalidField { .. })
        ));
    }

    #[test]
    fn test_encode_qos_zero_send_has_no_id() {
        // Arrange
        let frame = OutboundFrame::Send {
            topic: "/t".to_string(),
            qos: Qos::AtMostOnce,
            id: None,
            body: json!("hi"),
        };

        // Act
        let text = encode_frame(&frame).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        // Assert
        assert_eq!(
            value,
            json!({"Action": "Send", "Topic": "/t", "QoS": 0, "Body": "hi"})
        );
    }
}
