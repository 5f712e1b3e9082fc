//! The [`Message`] value object.
//!
//! A message is what an application publishes with `send` and what it receives
//! in `on_message_arrived`.  It is immutable once handed over: the builder-style
//! `with_*` methods consume `self`, so a message cannot change after the engine
//! has it.
//!
//! # Payload representation
//!
//! The json-msg `Body` field is an arbitrary JSON value.  Most producers send a
//! plain string, but objects and numbers are legal too, so the payload is kept
//! as a [`serde_json::Value`].  Binary payloads are not supported.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::frames::SendFrame;

/// Delivery quality-of-service level requested for a message.
///
/// QoS is enforced by the broker.  On the client side the only difference is
/// whether a `Send` frame expects an `Ack`: QoS 0 is fire-and-forget, QoS 1
/// and 2 are correlated by ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Qos {
    /// QoS 0.
    #[default]
    AtMostOnce = 0,
    /// QoS 1.
    AtLeastOnce = 1,
    /// QoS 2.
    ExactlyOnce = 2,
}

impl Qos {
    /// Returns `true` if a `Send` at this level is acknowledged by the server.
    pub fn expects_ack(self) -> bool {
        self != Qos::AtMostOnce
    }
}

impl TryFrom<u8> for Qos {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Qos::AtMostOnce),
            1 => Ok(Qos::AtLeastOnce),
            2 => Ok(Qos::ExactlyOnce),
            other => Err(format!("invalid QoS level: {other}")),
        }
    }
}

impl From<Qos> for u8 {
    fn from(qos: Qos) -> Self {
        qos as u8
    }
}

/// Kind of destination a message is addressed to.
///
/// The json-msg protocol only addresses topics today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum DestinationType {
    #[default]
    Topic,
}

/// An immutable publish/subscribe message.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    payload: Value,
    destination_name: String,
    qos: Qos,
    destination_type: DestinationType,
    subscription_name: Option<String>,
    retained: bool,
}

impl Message {
    /// Creates a QoS 0 message for `destination_name`.
    ///
    /// ```rust
    /// use jsonmsg_core::{Message, Qos};
    ///
    /// let msg = Message::new("/sensors/temp", "21.5").with_qos(Qos::AtLeastOnce);
    /// assert_eq!(msg.destination_name(), "/sensors/temp");
    /// assert_eq!(msg.payload_string(), "21.5");
    /// ```
    pub fn new(destination_name: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            payload: payload.into(),
            destination_name: destination_name.into(),
            qos: Qos::default(),
            destination_type: DestinationType::default(),
            subscription_name: None,
            retained: false,
        }
    }

    pub fn with_qos(mut self, qos: Qos) -> Self {
        self.qos = qos;
        self
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the payload as text.
    ///
    /// A string body is returned verbatim; any other JSON value is returned in
    /// its compact serialized form.
    pub fn payload_string(&self) -> String {
        match &self.payload {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn destination_name(&self) -> &str {
        &self.destination_name
    }

    pub fn qos(&self) -> Qos {
        self.qos
    }

    pub fn destination_type(&self) -> DestinationType {
        self.destination_type
    }

    /// Name of the subscription that delivered this message, if the server
    /// reported one.  Always `None` for outbound messages.
    pub fn subscription_name(&self) -> Option<&str> {
        self.subscription_name.as_deref()
    }

    /// Whether the server delivered this as a retained message.
    pub fn is_retained(&self) -> bool {
        self.retained
    }
}

impl From<SendFrame> for Message {
    fn from(frame: SendFrame) -> Self {
        Self {
            payload: frame.body,
            destination_name: frame.topic,
            qos: frame.qos,
            destination_type: DestinationType::Topic,
            subscription_name: frame.name,
            retained: frame.retain,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_message_defaults_to_qos_zero_topic() {
        // Arrange / Act
        let msg = Message::new("/a/b", "hello");

        // Assert
        assert_eq!(msg.qos(), Qos::AtMostOnce);
        assert_eq!(msg.destination_type(), DestinationType::Topic);
        assert_eq!(msg.subscription_name(), None);
        assert!(!msg.is_retained());
    }

    #[test]
    fn test_payload_string_returns_string_body_verbatim() {
        let msg = Message::new("/a", "plain text");
        assert_eq!(msg.payload_string(), "plain text");
    }

    #[test]
    fn test_payload_string_serializes_object_body() {
        let msg = Message::new("/a", json!({"t": 21}));
        assert_eq!(msg.payload_string(), r#"{"t":21}"#);
    }

    #[test]
    fn test_qos_try_from_rejects_three() {
        assert!(Qos::try_from(3u8).is_err());
        assert_eq!(Qos::try_from(2u8), Ok(Qos::ExactlyOnce));
    }

    #[test]
    fn test_only_qos_zero_is_fire_and_forget() {
        assert!(!Qos::AtMostOnce.expects_ack());
        assert!(Qos::AtLeastOnce.expects_ack());
        assert!(Qos::ExactlyOnce.expects_ack());
    }

    #[test]
    fn test_inbound_send_frame_converts_to_message() {
        // Arrange
        let frame = SendFrame {
            topic: "/x".to_string(),
            body: json!("v"),
            qos: Qos::AtLeastOnce,
            name: Some("s1".to_string()),
            retain: true,
        };

        // Act
        let msg = Message::from(frame);

        // Assert
        assert_eq!(msg.destination_name(), "/x");
        assert_eq!(msg.payload_string(), "v");
        assert_eq!(msg.qos(), Qos::AtLeastOnce);
        assert_eq!(msg.subscription_name(), Some("s1"));
        assert!(msg.is_retained());
    }
}
