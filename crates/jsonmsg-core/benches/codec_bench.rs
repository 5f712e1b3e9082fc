//! Criterion benchmarks for the json-msg frame codec.
//!
//! Every inbound WebSocket message goes through `decode_frame`, and every
//! publish goes through `encode_frame`, so both sit on the hot path of a busy
//! subscriber.
//!
//! Run with:
//! ```bash
//! cargo bench --package jsonmsg-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use jsonmsg_core::{decode_frame, encode_frame, OutboundFrame, Qos};
use serde_json::json;

// ── Frame fixtures ────────────────────────────────────────────────────────────

fn outbound_fixtures() -> Vec<(&'static str, OutboundFrame)> {
    vec![
        ("ping", OutboundFrame::Ping),
        (
            "subscribe",
            OutboundFrame::Subscribe {
                name: "sensors".to_string(),
                topic: "/site/+/temp".to_string(),
                id: 17,
            },
        ),
        (
            "send_small",
            OutboundFrame::Send {
                topic: "/site/a/temp".to_string(),
                qos: Qos::AtLeastOnce,
                id: Some(18),
                body: json!("21.5"),
            },
        ),
        (
            "send_object",
            OutboundFrame::Send {
                topic: "/site/a/status".to_string(),
                qos: Qos::AtMostOnce,
                id: None,
                body: json!({
                    "uptime": 86400,
                    "load": [0.12, 0.34, 0.56],
                    "labels": {"rack": "r7", "zone": "eu-1"}
                }),
            },
        ),
    ]
}

const INBOUND_FIXTURES: &[(&str, &str)] = &[
    ("pong", r#"{"Action":"Pong"}"#),
    ("ack", r#"{"Action":"Ack","ID":18,"RC":0}"#),
    (
        "send",
        r#"{"Action":"Send","Topic":"/site/a/temp","QoS":1,"Name":"sensors","Body":"21.5"}"#,
    ),
    (
        "send_object",
        r#"{"Action":"Send","Topic":"/site/a/status","QoS":0,"Body":{"uptime":86400,"load":[0.12,0.34,0.56]}}"#,
    ),
];

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_frame");
    for (name, frame) in outbound_fixtures() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &frame, |b, frame| {
            b.iter(|| encode_frame(black_box(frame)).expect("encode must succeed"))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    for (name, text) in INBOUND_FIXTURES {
        group.bench_with_input(BenchmarkId::from_parameter(name), text, |b, text| {
            b.iter(|| decode_frame(black_box(text)).expect("decode must succeed"))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
