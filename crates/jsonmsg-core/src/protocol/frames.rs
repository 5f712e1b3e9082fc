//! json-msg frame definitions.
//!
//! Every frame is a single JSON object whose `Action` field names its type.
//! Field names on the wire are PascalCase with a few upper-case acronyms
//! (`ClientID`, `ID`, `QoS`, `RC`), so every field carries an explicit serde
//! rename.
//!
//! # Direction
//!
//! Outbound frames (client → server) and inbound frames (server → client) are
//! separate types.  Using two distinct enums makes it a compile-time error to
//! encode a frame only the server may send, and lets the decoder reject
//! outbound-only actions arriving from the server.
//!
//! ```text
//! Client → Server:  Connect, Subscribe, CloseSubscription, DestroySubscription,
//!                   Send, Close, Ping, Pong
//! Server → Client:  Connected, Send, Ack, Close, Ping, Pong
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::message::Qos;

// ── Frame type tags ───────────────────────────────────────────────────────────

/// The value of a frame's `Action` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    Connect,
    Connected,
    Subscribe,
    CloseSubscription,
    DestroySubscription,
    Send,
    Ack,
    Close,
    Ping,
    Pong,
}

impl FrameType {
    /// Returns the `Action` string used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            FrameType::Connect => "Connect",
            FrameType::Connected => "Connected",
            FrameType::Subscribe => "Subscribe",
            FrameType::CloseSubscription => "CloseSubscription",
            FrameType::DestroySubscription => "DestroySubscription",
            FrameType::Send => "Send",
            FrameType::Ack => "Ack",
            FrameType::Close => "Close",
            FrameType::Ping => "Ping",
            FrameType::Pong => "Pong",
        }
    }

    /// Maps an `Action` string to its tag.  Matching is case-sensitive.
    pub fn from_action(action: &str) -> Option<Self> {
        let frame_type = match action {
            "Connect" => FrameType::Connect,
            "Connected" => FrameType::Connected,
            "Subscribe" => FrameType::Subscribe,
            "CloseSubscription" => FrameType::CloseSubscription,
            "DestroySubscription" => FrameType::DestroySubscription,
            "Send" => FrameType::Send,
            "Ack" => FrameType::Ack,
            "Close" => FrameType::Close,
            "Ping" => FrameType::Ping,
            "Pong" => FrameType::Pong,
            _ => return None,
        };
        Some(frame_type)
    }

    /// Returns `true` for the frame types a server may send.
    pub fn is_inbound(self) -> bool {
        !matches!(
            self,
            FrameType::Connect
                | FrameType::Subscribe
                | FrameType::CloseSubscription
                | FrameType::DestroySubscription
        )
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Client → Server ───────────────────────────────────────────────────────────

/// Frames the client sends to the server.
///
/// # Serde representation
///
/// ```json
/// {"Action":"Connect","ClientID":"c1","KeepAliveTimeout":60}
/// {"Action":"Subscribe","Name":"s1","Topic":"/a/b","ID":1}
/// {"Action":"Send","Topic":"/a/b","QoS":1,"ID":2,"Body":"hello"}
/// {"Action":"Ping"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "Action")]
pub enum OutboundFrame {
    /// Opens the protocol session.  First frame after the socket opens.
    Connect {
        #[serde(rename = "ClientID")]
        client_id: String,
        #[serde(rename = "User", skip_serializing_if = "Option::is_none")]
        user: Option<String>,
        #[serde(rename = "Password", skip_serializing_if = "Option::is_none")]
        password: Option<String>,
        /// Keepalive interval in seconds; `0` means disabled.
        #[serde(rename = "KeepAliveTimeout")]
        keep_alive_timeout: u32,
    },

    /// Creates a named subscription on a topic filter.
    Subscribe {
        #[serde(rename = "Name")]
        name: String,
        #[serde(rename = "Topic")]
        topic: String,
        #[serde(rename = "ID")]
        id: u64,
    },

    /// Stops delivery for a subscription, keeping it on the server.
    CloseSubscription {
        #[serde(rename = "ID")]
        id: u64,
        #[serde(rename = "Name")]
        name: String,
    },

    /// Removes a subscription from the server entirely.
    DestroySubscription {
        #[serde(rename = "ID")]
        id: u64,
        #[serde(rename = "Name")]
        name: String,
    },

    /// Publishes a message.  QoS 0 sends carry no `ID` and get no `Ack`.
    Send {
        #[serde(rename = "Topic")]
        topic: String,
        #[serde(rename = "QoS")]
        qos: Qos,
        #[serde(rename = "ID", skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        #[serde(rename = "Body")]
        body: Value,
    },

    /// Announces a graceful disconnect.
    Close,

    /// Keepalive probe.
    Ping,

    /// Reply to a server-initiated `Ping`.
    Pong,
}

impl OutboundFrame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            OutboundFrame::Connect { .. } => FrameType::Connect,
            OutboundFrame::Subscribe { .. } => FrameType::Subscribe,
            OutboundFrame::CloseSubscription { .. } => FrameType::CloseSubscription,
            OutboundFrame::DestroySubscription { .. } => FrameType::DestroySubscription,
            OutboundFrame::Send { .. } => FrameType::Send,
            OutboundFrame::Close => FrameType::Close,
            OutboundFrame::Ping => FrameType::Ping,
            OutboundFrame::Pong => FrameType::Pong,
        }
    }

    /// Returns a copy that is safe to record in diagnostics: the `Connect`
    /// password is masked.
    pub fn redacted(&self) -> OutboundFrame {
        match self {
            OutboundFrame::Connect {
                client_id,
                user,
                password,
                keep_alive_timeout,
            } => OutboundFrame::Connect {
                client_id: client_id.clone(),
                user: user.clone(),
                password: password.as_ref().map(|_| "******".to_string()),
                keep_alive_timeout: *keep_alive_timeout,
            },
            other => other.clone(),
        }
    }
}

// ── Server → Client ───────────────────────────────────────────────────────────

/// Handshake reply.  A nonzero `RC` means the server refused the connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ConnectedFrame {
    #[serde(rename = "RC", default)]
    pub rc: u32,
    #[serde(rename = "Reason", default)]
    pub reason: Option<String>,
}

/// A message delivered on one of the client's subscriptions.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SendFrame {
    #[serde(rename = "Topic")]
    pub topic: String,
    #[serde(rename = "Body", default)]
    pub body: Value,
    #[serde(rename = "QoS", default)]
    pub qos: Qos,
    /// Subscription that matched, when the server reports it.
    #[serde(rename = "Name", default)]
    pub name: Option<String>,
    #[serde(rename = "Retain", default)]
    pub retain: bool,
}

/// Acknowledgment of a correlated request.  `RC` 0 means success.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AckFrame {
    #[serde(rename = "ID")]
    pub id: u64,
    #[serde(rename = "RC", default)]
    pub rc: u32,
    #[serde(rename = "Reason", default)]
    pub reason: Option<String>,
}

/// Server-initiated close.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CloseFrame {
    #[serde(rename = "RC", default)]
    pub rc: u32,
    #[serde(rename = "Reason", default)]
    pub reason: Option<String>,
}

/// Frames the server sends to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Connected(ConnectedFrame),
    Send(SendFrame),
    Ack(AckFrame),
    Close(CloseFrame),
    Ping,
    Pong,
}

impl InboundFrame {
    pub fn frame_type(&self) -> FrameType {
        match self {
            InboundFrame::Connected(_) => FrameType::Connected,
            InboundFrame::Send(_) => FrameType::Send,
            InboundFrame::Ack(_) => FrameType::Ack,
            InboundFrame::Close(_) => FrameType::Close,
            InboundFrame::Ping => FrameType::Ping,
            InboundFrame::Pong => FrameType::Pong,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_action_recognises_every_tag() {
        for frame_type in [
            FrameType::Connect,
            FrameType::Connected,
            FrameType::Subscribe,
            FrameType::CloseSubscription,
            FrameType::DestroySubscription,
            FrameType::Send,
            FrameType::Ack,
            FrameType::Close,
            FrameType::Ping,
            FrameType::Pong,
        ] {
            assert_eq!(FrameType::from_action(frame_type.as_str()), Some(frame_type));
        }
    }

    #[test]
    fn test_from_action_is_case_sensitive() {
        assert_eq!(FrameType::from_action("ping"), None);
        assert_eq!(FrameType::from_action("Publish"), None);
    }

    #[test]
    fn test_outbound_only_types_are_not_inbound() {
        assert!(!FrameType::Connect.is_inbound());
        assert!(!FrameType::DestroySubscription.is_inbound());
        assert!(FrameType::Ack.is_inbound());
        assert!(FrameType::Send.is_inbound());
    }

    #[test]
    fn test_connect_frame_omits_absent_credentials() {
        // Arrange
        let frame = OutboundFrame::Connect {
            client_id: "c1".to_string(),
            user: None,
            password: None,
            keep_alive_timeout: 60,
        };

        // Act
        let value = serde_json::to_value(&frame).unwrap();

        // Assert
        assert_eq!(
            value,
            json!({"Action": "Connect", "ClientID": "c1", "KeepAliveTimeout": 60})
        );
    }

    #[test]
    fn test_unit_frames_serialize_as_bare_action() {
        assert_eq!(
            serde_json::to_value(&OutboundFrame::Close).unwrap(),
            json!({"Action": "Close"})
        );
        assert_eq!(
            serde_json::to_value(&OutboundFrame::Pong).unwrap(),
            json!({"Action": "Pong"})
        );
    }

    #[test]
    fn test_redacted_masks_password_only() {
        // Arrange
        let frame = OutboundFrame::Connect {
            client_id: "c1".to_string(),
            user: Some("alice".to_string()),
            password: Some("hunter2".to_string()),
            keep_alive_timeout: 0,
        };

        // Act
        let redacted = serde_json::to_string(&frame.redacted()).unwrap();

        // Assert
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains("alice"));
    }

    #[test]
    fn test_redacted_leaves_other_frames_untouched() {
        let frame = OutboundFrame::Subscribe {
            name: "s1".to_string(),
            topic: "/a".to_string(),
            id: 4,
        };
        assert_eq!(frame.redacted(), frame);
    }
}
