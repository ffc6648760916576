//! Criterion benchmarks for the inputshare binary codec.
//!
//! The forwarding path serializes one envelope per coalescer flush (every
//! 4 ms) plus every key and button event; encode+decode must stay far below
//! that budget.
//!
//! Run with:
//! ```bash
//! cargo bench --package inputshare-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use inputshare_core::protocol::codec::{
    decode_envelope, decode_input_event, encode_envelope, encode_input_event,
};
use inputshare_core::protocol::framing::{frame, FrameBuffer};
use inputshare_core::protocol::messages::{
    Envelope, InputEvent, MessageKind, MouseButton, PressState, PROTOCOL_VERSION,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn envelope(kind: MessageKind, payload: Vec<u8>) -> Envelope {
    Envelope {
        protocol_version: PROTOCOL_VERSION,
        kind,
        sequence: 77,
        monotonic_ns: 123_456_789_000,
        source_device_id: "bench-peer".to_string(),
        payload,
    }
}

fn make_mouse_move() -> InputEvent {
    InputEvent::MouseMove {
        dx: 11,
        dy: -4,
        normalized: Some((0.37, 0.81)),
        modifier_flags: 0,
    }
}

fn make_key() -> InputEvent {
    InputEvent::Key {
        keycode: 0x001E,
        state: PressState::Down,
        modifier_flags: 1 << 17,
    }
}

fn make_button() -> InputEvent {
    InputEvent::MouseButton {
        button: MouseButton::Left,
        state: PressState::Down,
        modifier_flags: 0,
    }
}

fn make_scroll() -> InputEvent {
    InputEvent::Scroll {
        dx: 0.0,
        dy: -14.25,
        modifier_flags: 0,
    }
}

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Encode+decode of the envelope around an empty control payload.
fn bench_envelope(c: &mut Criterion) {
    let env = envelope(MessageKind::Activated, vec![]);
    let bytes = encode_envelope(&env);

    let mut group = c.benchmark_group("envelope");
    group.bench_function("encode", |b| b.iter(|| encode_envelope(black_box(&env))));
    group.bench_function("decode", |b| {
        b.iter(|| decode_envelope(black_box(&bytes)).expect("decode must succeed"))
    });
    group.finish();
}

/// Per-kind input event payload codec latency.
fn bench_input_events(c: &mut Criterion) {
    let events: &[(&str, InputEvent)] = &[
        ("MouseMove", make_mouse_move()),
        ("MouseButton", make_button()),
        ("Scroll", make_scroll()),
        ("Key", make_key()),
        ("FlagsChanged", InputEvent::FlagsChanged { modifier_flags: 4 }),
    ];

    let mut group = c.benchmark_group("input_event");
    for (name, event) in events {
        group.bench_with_input(BenchmarkId::new("encode", name), event, |b, event| {
            b.iter(|| encode_input_event(black_box(event)))
        });
        let bytes = encode_input_event(event);
        group.bench_with_input(BenchmarkId::new("decode", name), &bytes, |b, bytes| {
            b.iter(|| decode_input_event(black_box(bytes)).expect("decode must succeed"))
        });
    }
    group.finish();
}

/// The hot path as the transport sees it: envelope + frame on the way out,
/// deframe + envelope + payload on the way in.
fn bench_wire_roundtrip(c: &mut Criterion) {
    let env = envelope(
        MessageKind::InputEvent,
        encode_input_event(&make_mouse_move()),
    );

    let mut group = c.benchmark_group("wire_roundtrip");
    group.bench_function("MouseMove", |b| {
        b.iter(|| {
            let wire = frame(&encode_envelope(black_box(&env)));
            let mut buf = FrameBuffer::new();
            buf.extend(&wire);
            let frames = buf.drain_frames().unwrap();
            let decoded = decode_envelope(&frames[0]).unwrap();
            decode_input_event(&decoded.payload).unwrap()
        })
    });
    group.finish();
}

criterion_group!(benches, bench_envelope, bench_input_events, bench_wire_roundtrip);
criterion_main!(benches);
