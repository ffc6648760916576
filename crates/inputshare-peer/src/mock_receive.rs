//! `mock-receive`: a development-only sink.
//!
//! Accepts any peer over plaintext TCP, prints every received input event
//! as a JSON text record on stdout, and answers the handshake messages with
//! the appropriate acks. Useful for driving the sender end-to-end without a
//! second host, HID permissions, or certificates.

use std::time::Instant;

use inputshare_core::protocol::codec::{decode_envelope, decode_input_event};
use inputshare_core::protocol::messages::{Envelope, InputEvent, MessageKind};
use inputshare_core::protocol::sequence::SequenceCounter;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::session::{make_frame, SessionError};
use crate::transport::{FrameSender, Listener, SecurityMode, TransportEvent, TransportState};

/// One printed line per received input event.
#[derive(Debug, Serialize)]
struct EventRecord<'a> {
    seq: u64,
    monotonic_ns: u64,
    device: &'a str,
    event: &'a InputEvent,
}

/// The ack a control message gets, if any.
fn reply_for(kind: MessageKind) -> Option<MessageKind> {
    match kind {
        MessageKind::Activate => Some(MessageKind::Activated),
        MessageKind::Deactivate => Some(MessageKind::Deactivated),
        MessageKind::PairRequest => Some(MessageKind::PairAccept),
        _ => None,
    }
}

fn render_record(envelope: &Envelope, event: &InputEvent) -> Option<String> {
    serde_json::to_string(&EventRecord {
        seq: envelope.sequence,
        monotonic_ns: envelope.monotonic_ns,
        device: &envelope.source_device_id,
        event,
    })
    .ok()
}

/// Runs the sink until the process is interrupted.
pub async fn run(port: u16) -> Result<(), SessionError> {
    let listener = Listener::bind("0.0.0.0", port, &SecurityMode::Plaintext).await?;
    let device_id = format!("mock-receive-{}", Uuid::new_v4());
    info!(port, "mock-receive ready; printing input events as JSON");

    loop {
        let (events_tx, mut events_rx) = mpsc::channel(256);
        let (connection, peer) = listener.accept(events_tx).await?;
        info!(%peer, "session started");

        let frames = connection.sender();
        let sequence = SequenceCounter::new();
        let epoch = Instant::now();

        while let Some(event) = events_rx.recv().await {
            match event {
                TransportEvent::State(TransportState::Ready) => {
                    send(&frames, MessageKind::Hello, &sequence, epoch, &device_id);
                }
                TransportEvent::State(TransportState::Failed)
                | TransportEvent::State(TransportState::Cancelled) => break,
                TransportEvent::State(TransportState::Connecting) => {}
                TransportEvent::Frame(bytes) => {
                    handle_frame(&bytes, &frames, &sequence, epoch, &device_id);
                }
            }
        }
        connection.cancel();
        info!(%peer, "session ended");
    }
}

fn handle_frame(
    bytes: &[u8],
    frames: &FrameSender,
    sequence: &SequenceCounter,
    epoch: Instant,
    device_id: &str,
) {
    let envelope = match decode_envelope(bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("discarding undecodable frame: {e}");
            return;
        }
    };

    match envelope.kind {
        MessageKind::InputEvent => match decode_input_event(&envelope.payload) {
            Ok(event) => {
                if let Some(line) = render_record(&envelope, &event) {
                    println!("{line}");
                }
            }
            Err(e) => warn!("discarding malformed input event: {e}"),
        },
        MessageKind::Hello => {
            info!(peer = %envelope.source_device_id, "peer hello");
        }
        kind => {
            if let Some(ack) = reply_for(kind) {
                info!(?kind, ?ack, "acknowledging");
                send(frames, ack, sequence, epoch, device_id);
            } else {
                debug!(?kind, "ignoring");
            }
        }
    }
}

fn send(
    frames: &FrameSender,
    kind: MessageKind,
    sequence: &SequenceCounter,
    epoch: Instant,
    device_id: &str,
) {
    let frame = make_frame(kind, Vec::new(), sequence, epoch, device_id);
    if frames.send_frame(frame).is_err() {
        warn!(?kind, "failed to queue reply");
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
