//! Integration tests for the jsonmsg-core codec and request correlation.
//!
//! These tests drive the public API the way the connection engine does:
//! outbound frames are encoded and compared against the exact JSON a json-msg
//! server expects, and inbound server text is decoded and fed to the
//! correlator.

use std::sync::{Arc, Mutex};

use jsonmsg_core::protocol::frames::AckFrame;
use jsonmsg_core::{
    decode_frame, encode_frame, FrameType, InboundFrame, Message, OutboundFrame, ProtocolError,
    Qos, RequestCorrelator, RequestFailure, RequestTarget,
};
use serde_json::{json, Value};

fn encode_to_value(frame: &OutboundFrame) -> Value {
    let text = encode_frame(frame).expect("encode must succeed");
    serde_json::from_str(&text).expect("encoded frame must be valid JSON")
}

// ── Outbound wire format ──────────────────────────────────────────────────────

#[test]
fn test_connect_frame_with_credentials() {
    let frame = OutboundFrame::Connect {
        client_id: "client-7".to_string(),
        user: Some("alice".to_string()),
        password: Some("pw".to_string()),
        keep_alive_timeout: 20,
    };

    assert_eq!(
        encode_to_value(&frame),
        json!({
            "Action": "Connect",
            "ClientID": "client-7",
            "User": "alice",
            "Password": "pw",
            "KeepAliveTimeout": 20
        })
    );
}

#[test]
fn test_subscription_frames() {
    let subscribe = OutboundFrame::Subscribe {
        name: "s1".to_string(),
        topic: "/a/#".to_string(),
        id: 1,
    };
    let close = OutboundFrame::CloseSubscription {
        id: 2,
        name: "s1".to_string(),
    };
    let destroy = OutboundFrame::DestroySubscription {
        id: 3,
        name: "s1".to_string(),
    };

    assert_eq!(
        encode_to_value(&subscribe),
        json!({"Action": "Subscribe", "Name": "s1", "Topic": "/a/#", "ID": 1})
    );
    assert_eq!(
        encode_to_value(&close),
        json!({"Action": "CloseSubscription", "ID": 2, "Name": "s1"})
    );
    assert_eq!(
        encode_to_value(&destroy),
        json!({"Action": "DestroySubscription", "ID": 3, "Name": "s1"})
    );
}

#[test]
fn test_qos_one_send_carries_id_and_json_body() {
    let frame = OutboundFrame::Send {
        topic: "/sensors".to_string(),
        qos: Qos::AtLeastOnce,
        id: Some(9),
        body: json!({"temp": 21.5}),
    };

    assert_eq!(
        encode_to_value(&frame),
        json!({"Action": "Send", "Topic": "/sensors", "QoS": 1, "ID": 9, "Body": {"temp": 21.5}})
    );
}

// ── Inbound decoding ──────────────────────────────────────────────────────────

#[test]
fn test_inbound_send_becomes_message() {
    // Arrange
    let text = r#"{"Action":"Send","Topic":"/a/b","QoS":0,"Body":"hello","Retain":true}"#;

    // Act
    let frame = decode_frame(text).expect("decode must succeed");

    // Assert
    let InboundFrame::Send(send) = frame else {
        panic!("expected a Send frame");
    };
    let msg = Message::from(send);
    assert_eq!(msg.destination_name(), "/a/b");
    assert_eq!(msg.payload_string(), "hello");
    assert!(msg.is_retained());
}

#[test]
fn test_inbound_close_with_result_code() {
    let frame = decode_frame(r#"{"Action":"Close","RC":2,"Reason":"shutdown"}"#).unwrap();
    let InboundFrame::Close(close) = frame else {
        panic!("expected a Close frame");
    };
    assert_eq!(close.rc, 2);
    assert_eq!(close.reason.as_deref(), Some("shutdown"));
}

#[test]
fn test_inbound_keepalive_frames() {
    assert_eq!(decode_frame(r#"{"Action":"Ping"}"#), Ok(InboundFrame::Ping));
    assert_eq!(decode_frame(r#"{"Action":"Pong"}"#), Ok(InboundFrame::Pong));
}

#[test]
fn test_inbound_connect_is_unexpected() {
    assert_eq!(
        decode_frame(r#"{"Action":"Connect","ClientID":"x","KeepAliveTimeout":0}"#),
        Err(ProtocolError::UnexpectedInbound(FrameType::Connect))
    );
}

#[test]
fn test_decode_error_text_names_the_action() {
    let err = decode_frame(r#"{"Action":"Warp"}"#).unwrap_err();
    assert!(err.to_string().contains("Warp"));
}

// ── Correlation through decoded acks ──────────────────────────────────────────

#[test]
fn test_decoded_acks_resolve_requests_out_of_order() {
    // Arrange
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    let mut correlator = RequestCorrelator::new();
    let mut ids = Vec::new();
    for name in ["s1", "s2"] {
        let ok = Arc::clone(&outcomes);
        let fail = Arc::clone(&outcomes);
        ids.push(correlator.register(
            RequestTarget::Subscribe {
                name: name.to_string(),
                topic: "/t".to_string(),
            },
            Some(Box::new(move |t: &RequestTarget| {
                ok.lock().unwrap().push(format!("ok {}", t.name().unwrap()))
            })),
            Some(Box::new(move |t: &RequestTarget, f: &RequestFailure| {
                fail.lock()
                    .unwrap()
                    .push(format!("fail {} {:?}", t.name().unwrap(), f.result_code()))
            })),
        ));
    }

    // Act
    for text in [
        format!(r#"{{"Action":"Ack","ID":{},"RC":5}}"#, ids[1]),
        format!(r#"{{"Action":"Ack","ID":{}}}"#, ids[0]),
    ] {
        let InboundFrame::Ack(ack) = decode_frame(&text).unwrap() else {
            panic!("expected an Ack frame");
        };
        correlator.resolve(&ack);
    }

    // Assert
    assert_eq!(
        *outcomes.lock().unwrap(),
        vec!["fail s2 Some(5)".to_string(), "ok s1".to_string()]
    );
    assert!(correlator.is_empty());
}

#[test]
fn test_drained_requests_can_be_failed_as_connection_closed() {
    // Arrange
    let failures = Arc::new(Mutex::new(Vec::new()));
    let mut correlator = RequestCorrelator::new();
    let slot = Arc::clone(&failures);
    correlator.register(
        RequestTarget::Send {
            topic: "/t".to_string(),
        },
        None,
        Some(Box::new(move |_: &RequestTarget, f: &RequestFailure| {
            slot.lock().unwrap().push(f.clone())
        })),
    );

    // Act
    for pending in correlator.drain() {
        pending.fail(&RequestFailure::ConnectionClosed);
    }
    correlator.resolve(&AckFrame {
        id: 1,
        rc: 0,
        reason: None,
    });

    // Assert
    assert_eq!(
        *failures.lock().unwrap(),
        vec![RequestFailure::ConnectionClosed]
    );
}
