//! All inputshare protocol message types.
//!
//! Every message on the wire is an [`Envelope`]: a fixed 24-byte header, the
//! sender's stable device id, and an opaque payload. The envelope is
//! parseable without knowing the payload kind; payload bytes are decoded by
//! the session layer according to [`MessageKind`].

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Size of the fixed portion of the envelope header in bytes.
pub const HEADER_SIZE: usize = 24;

// ── Message kind codes ────────────────────────────────────────────────────────

/// All message kind codes defined by the protocol.
///
/// `0x30` is reserved for the visual-overlay configuration exchanged by the
/// desktop peers. It is carried opaquely and never affects handoff state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    // Session channel (0x00–0x0F)
    Hello = 0x01,
    PairRequest = 0x02,
    PairAccept = 0x03,
    // Input channel (0x10–0x1F)
    InputEvent = 0x10,
    // Handoff channel (0x20–0x2F)
    Activate = 0x20,
    Activated = 0x21,
    Deactivate = 0x22,
    Deactivated = 0x23,
    // Reserved (0x30–0x3F)
    OverlayConfig = 0x30,
}

impl TryFrom<u8> for MessageKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageKind::Hello),
            0x02 => Ok(MessageKind::PairRequest),
            0x03 => Ok(MessageKind::PairAccept),
            0x10 => Ok(MessageKind::InputEvent),
            0x20 => Ok(MessageKind::Activate),
            0x21 => Ok(MessageKind::Activated),
            0x22 => Ok(MessageKind::Deactivate),
            0x23 => Ok(MessageKind::Deactivated),
            0x30 => Ok(MessageKind::OverlayConfig),
            _ => Err(()),
        }
    }
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// One protocol message as it travels on the wire.
///
/// Wire layout (all multi-byte integers big-endian):
///
/// ```text
/// [version:1][kind:1][reserved:2][payload_len:4][seq:8][monotonic_ns:8]
/// [device_id_len:2][device_id:N][payload:M]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Protocol version; always [`PROTOCOL_VERSION`] for frames we emit.
    pub protocol_version: u8,
    /// Identifies how the payload bytes are to be interpreted.
    pub kind: MessageKind,
    /// Monotonically increasing per-sender counter. Gaps imply loss.
    pub sequence: u64,
    /// Sender's monotonic clock reading in nanoseconds.
    pub monotonic_ns: u64,
    /// Stable identifier of the originating host.
    pub source_device_id: String,
    /// Kind-specific serialized value; opaque to the transport.
    pub payload: Vec<u8>,
}

// ── Input events ──────────────────────────────────────────────────────────────

/// Mouse button identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MouseButton {
    Left = 0x01,
    Right = 0x02,
    Other = 0x03,
}

impl TryFrom<u8> for MouseButton {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MouseButton::Left),
            0x02 => Ok(MouseButton::Right),
            0x03 => Ok(MouseButton::Other),
            _ => Err(()),
        }
    }
}

/// Press/release state shared by button and key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PressState {
    Down = 0x01,
    Up = 0x02,
}

impl TryFrom<u8> for PressState {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(PressState::Down),
            0x02 => Ok(PressState::Up),
            _ => Err(()),
        }
    }
}

/// A captured (or injected) HID event.
///
/// `modifier_flags` is a 64-bit opaque bitmask in the originating OS's own
/// layout; it is carried verbatim so the receiver can replay it exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    /// Relative mouse motion in raw device pixels.
    MouseMove {
        dx: i32,
        dy: i32,
        /// Cursor position as a fraction of the sender's virtual screen,
        /// informational only; the receiver reconstructs position from
        /// summed deltas.
        normalized: Option<(f64, f64)>,
        modifier_flags: u64,
    },
    /// Mouse button press or release.
    MouseButton {
        button: MouseButton,
        state: PressState,
        modifier_flags: u64,
    },
    /// Continuous scroll in pixel units.
    Scroll {
        dx: f64,
        dy: f64,
        modifier_flags: u64,
    },
    /// Keyboard press or release, identified by virtual keycode.
    Key {
        keycode: u16,
        state: PressState,
        modifier_flags: u64,
    },
    /// Modifier-only change (no key repeat, no character).
    FlagsChanged { modifier_flags: u64 },
}

impl InputEvent {
    /// The modifier bitmask common to every event kind.
    pub fn modifier_flags(&self) -> u64 {
        match *self {
            InputEvent::MouseMove { modifier_flags, .. }
            | InputEvent::MouseButton { modifier_flags, .. }
            | InputEvent::Scroll { modifier_flags, .. }
            | InputEvent::Key { modifier_flags, .. }
            | InputEvent::FlagsChanged { modifier_flags } => modifier_flags,
        }
    }

    /// True for the kinds the coalescer accumulates rather than forwards
    /// immediately.
    pub fn is_coalescable(&self) -> bool {
        matches!(
            self,
            InputEvent::MouseMove { .. } | InputEvent::Scroll { .. }
        )
    }
}

// ── Handoff payloads ──────────────────────────────────────────────────────────

/// Payload of an `Activate` message: where the cursor crossed the sender's
/// boundary, expressed as a fraction of the sender's virtual-screen height.
/// The X component is always 0.0 (the crossing is purely vertical).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivatePayload {
    pub normalized_x: f64,
    pub normalized_y: f64,
}

impl ActivatePayload {
    /// Builds the payload for a crossing at the given normalized height,
    /// clamped to `[0, 1]`.
    pub fn at_height(normalized_y: f64) -> Self {
        Self {
            normalized_x: 0.0,
            normalized_y: normalized_y.clamp(0.0, 1.0),
        }
    }
}

/// Payload of a `Deactivate` message: the return crossing height as a
/// fraction of the virtual-screen height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeactivatePayload {
    pub normalized_y: f64,
}

impl DeactivatePayload {
    pub fn at_height(normalized_y: f64) -> Self {
        Self {
            normalized_y: normalized_y.clamp(0.0, 1.0),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
