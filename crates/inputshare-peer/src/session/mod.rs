//! Session controllers.
//!
//! A session binds the transport, the HID adapters, and the handoff logic
//! into one of two roles. [`SenderSession`] owns the outbound connection
//! and forwards local input while its edge triggers; [`ReceiverSession`]
//! owns an accepted connection and injects what arrives. A peer runs both.
//!
//! Each session is one Tokio task built around a single `select!` loop:
//! the serial scheduler. Capture signals, transport events, and every
//! timer land on that loop, so state transitions are totally ordered and
//! session state needs no locks. Hook callbacks never run session code;
//! they only feed the channel the loop drains.

use std::time::Instant;

use inputshare_core::protocol::codec::encode_envelope;
use inputshare_core::protocol::messages::{Envelope, MessageKind, PROTOCOL_VERSION};
use inputshare_core::protocol::sequence::SequenceCounter;
use thiserror::Error;

use crate::transport::TransportError;

pub mod receiver;
pub mod sender;

pub use receiver::{ReceiverConfig, ReceiverSession};
pub use sender::{SenderConfig, SenderSession};

/// Pixels between a warp target and the screen boundary, so the warped
/// cursor lands inside the edge zone without touching the boundary pixel.
pub const WARP_INSET: f64 = 2.0;

/// Error taxonomy of the session layer.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Malformed arguments or unreadable identity material. Fatal at
    /// startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// HID capture/injection capability not granted (or irrecoverably
    /// revoked). Fatal for the affected role, never for the transport.
    #[error("HID permission denied")]
    PermissionDenied,

    /// TLS failure, pin mismatch, or incompatible protocol version.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// Transient or permanent network failure. Always preceded by
    /// `restore_local_control`.
    #[error("connection lost")]
    ConnectionLost,

    /// The `activate` request went unanswered. Handled locally by forcing
    /// idle; surfaced only in logs.
    #[error("activation timed out")]
    ActivationTimeout,
}

impl From<TransportError> for SessionError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::HandshakeFailed(reason) => SessionError::HandshakeFailed(reason),
            TransportError::InvalidIdentity(reason)
            | TransportError::InvalidFingerprint(reason)
            | TransportError::InvalidHostName(reason) => SessionError::Config(reason),
            TransportError::Io(_) => SessionError::ConnectionLost,
        }
    }
}

/// Builds and serializes one outbound envelope.
pub(crate) fn make_frame(
    kind: MessageKind,
    payload: Vec<u8>,
    sequence: &SequenceCounter,
    epoch: Instant,
    device_id: &str,
) -> Vec<u8> {
    encode_envelope(&Envelope {
        protocol_version: PROTOCOL_VERSION,
        kind,
        sequence: sequence.next(),
        monotonic_ns: epoch.elapsed().as_nanos() as u64,
        source_device_id: device_id.to_owned(),
        payload,
    })
}

/// `true` when `deadline` has matured relative to `now`.
pub(crate) fn matured(deadline: Option<Instant>, now: Instant) -> bool {
    deadline.is_some_and(|d| d <= now)
}

/// The earlier of two optional deadlines.
pub(crate) fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
