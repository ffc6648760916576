//! Binary codec for inputshare protocol envelopes and payloads.
//!
//! Wire format of an envelope:
//! ```text
//! [version:1][kind:1][reserved:2][payload_len:4][seq:8][monotonic_ns:8]
//! [device_id_len:2][device_id:N][payload:M]
//! ```
//! All multi-byte integers are big-endian. The envelope decodes without any
//! knowledge of the payload kind; payload bytes are handed back opaquely and
//! decoded separately with the kind-specific functions below.

use thiserror::Error;

use crate::protocol::messages::{
    ActivatePayload, DeactivatePayload, Envelope, InputEvent, MessageKind, MouseButton,
    PressState, HEADER_SIZE, PROTOCOL_VERSION,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The kind byte in the header is not a recognized value.
    #[error("unknown message kind: 0x{0:02X}")]
    UnknownMessageKind(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (bad tag, UTF-8 error, short field).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field exceeds the data actually available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// A frame length prefix exceeded the configured limit.
    #[error("frame of {declared} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { declared: usize, limit: usize },
}

// ── Envelope ──────────────────────────────────────────────────────────────────

/// Encodes an [`Envelope`] into its wire representation (header included,
/// frame length prefix not included).
pub fn encode_envelope(env: &Envelope) -> Vec<u8> {
    let device_id = env.source_device_id.as_bytes();
    let device_len = device_id.len().min(u16::MAX as usize);

    let mut buf = Vec::with_capacity(HEADER_SIZE + 2 + device_len + env.payload.len());
    buf.push(env.protocol_version);
    buf.push(env.kind as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&(env.payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&env.sequence.to_be_bytes());
    buf.extend_from_slice(&env.monotonic_ns.to_be_bytes());
    buf.extend_from_slice(&(device_len as u16).to_be_bytes());
    buf.extend_from_slice(&device_id[..device_len]);
    buf.extend_from_slice(&env.payload);
    buf
}

/// Decodes one [`Envelope`] from `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::UnsupportedVersion`] or
/// [`ProtocolError::UnknownMessageKind`] for frames from an incompatible
/// peer; the caller logs and discards these without disconnecting.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let kind = MessageKind::try_from(bytes[1])
        .map_err(|_| ProtocolError::UnknownMessageKind(bytes[1]))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let sequence = read_u64(bytes, 8)?;
    let monotonic_ns = read_u64(bytes, 16)?;
    let (source_device_id, device_end) = read_length_prefixed_string(bytes, HEADER_SIZE)?;

    let available = bytes.len() - device_end;
    if available < payload_len {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available,
        });
    }
    let payload = bytes[device_end..device_end + payload_len].to_vec();

    Ok(Envelope {
        protocol_version: version,
        kind,
        sequence,
        monotonic_ns,
        source_device_id,
        payload,
    })
}

// ── Input event payload ───────────────────────────────────────────────────────

// Input event tags inside an `InputEvent` payload.
const TAG_MOUSE_MOVE: u8 = 0x01;
const TAG_MOUSE_BUTTON: u8 = 0x02;
const TAG_SCROLL: u8 = 0x03;
const TAG_KEY: u8 = 0x04;
const TAG_FLAGS_CHANGED: u8 = 0x05;

/// Encodes the kind-specific payload of an `InputEvent` message.
pub fn encode_input_event(event: &InputEvent) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    match *event {
        InputEvent::MouseMove {
            dx,
            dy,
            normalized,
            modifier_flags,
        } => {
            buf.push(TAG_MOUSE_MOVE);
            buf.extend_from_slice(&modifier_flags.to_be_bytes());
            buf.extend_from_slice(&dx.to_be_bytes());
            buf.extend_from_slice(&dy.to_be_bytes());
            match normalized {
                Some((nx, ny)) => {
                    buf.push(0x01);
                    buf.extend_from_slice(&nx.clamp(0.0, 1.0).to_bits().to_be_bytes());
                    buf.extend_from_slice(&ny.clamp(0.0, 1.0).to_bits().to_be_bytes());
                }
                None => buf.push(0x00),
            }
        }
        InputEvent::MouseButton {
            button,
            state,
            modifier_flags,
        } => {
            buf.push(TAG_MOUSE_BUTTON);
            buf.extend_from_slice(&modifier_flags.to_be_bytes());
            buf.push(button as u8);
            buf.push(state as u8);
        }
        InputEvent::Scroll {
            dx,
            dy,
            modifier_flags,
        } => {
            buf.push(TAG_SCROLL);
            buf.extend_from_slice(&modifier_flags.to_be_bytes());
            buf.extend_from_slice(&dx.to_bits().to_be_bytes());
            buf.extend_from_slice(&dy.to_bits().to_be_bytes());
        }
        InputEvent::Key {
            keycode,
            state,
            modifier_flags,
        } => {
            buf.push(TAG_KEY);
            buf.extend_from_slice(&modifier_flags.to_be_bytes());
            buf.extend_from_slice(&keycode.to_be_bytes());
            buf.push(state as u8);
        }
        InputEvent::FlagsChanged { modifier_flags } => {
            buf.push(TAG_FLAGS_CHANGED);
            buf.extend_from_slice(&modifier_flags.to_be_bytes());
        }
    }
    buf
}

/// Decodes the payload of an `InputEvent` message.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] on unknown tags or truncated
/// fields.
pub fn decode_input_event(p: &[u8]) -> Result<InputEvent, ProtocolError> {
    require_len(p, 9, "InputEvent")?;
    let tag = p[0];
    let modifier_flags = read_u64(p, 1)?;
    match tag {
        TAG_MOUSE_MOVE => {
            require_len(p, 18, "MouseMove")?;
            let dx = i32::from_be_bytes([p[9], p[10], p[11], p[12]]);
            let dy = i32::from_be_bytes([p[13], p[14], p[15], p[16]]);
            let normalized = match p[17] {
                0x00 => None,
                0x01 => {
                    require_len(p, 34, "MouseMove.normalized")?;
                    let nx = f64::from_bits(read_u64(p, 18)?);
                    let ny = f64::from_bits(read_u64(p, 26)?);
                    Some((nx, ny))
                }
                other => {
                    return Err(ProtocolError::MalformedPayload(format!(
                        "bad normalized-position marker: {other}"
                    )))
                }
            };
            Ok(InputEvent::MouseMove {
                dx,
                dy,
                normalized,
                modifier_flags,
            })
        }
        TAG_MOUSE_BUTTON => {
            require_len(p, 11, "MouseButton")?;
            let button = MouseButton::try_from(p[9]).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown mouse button: {}", p[9]))
            })?;
            let state = PressState::try_from(p[10]).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown press state: {}", p[10]))
            })?;
            Ok(InputEvent::MouseButton {
                button,
                state,
                modifier_flags,
            })
        }
        TAG_SCROLL => {
            require_len(p, 25, "Scroll")?;
            let dx = f64::from_bits(read_u64(p, 9)?);
            let dy = f64::from_bits(read_u64(p, 17)?);
            Ok(InputEvent::Scroll {
                dx,
                dy,
                modifier_flags,
            })
        }
        TAG_KEY => {
            require_len(p, 12, "Key")?;
            let keycode = u16::from_be_bytes([p[9], p[10]]);
            let state = PressState::try_from(p[11]).map_err(|_| {
                ProtocolError::MalformedPayload(format!("unknown press state: {}", p[11]))
            })?;
            Ok(InputEvent::Key {
                keycode,
                state,
                modifier_flags,
            })
        }
        TAG_FLAGS_CHANGED => Ok(InputEvent::FlagsChanged { modifier_flags }),
        other => Err(ProtocolError::MalformedPayload(format!(
            "unknown input event tag: {other}"
        ))),
    }
}

// ── Handoff payloads ──────────────────────────────────────────────────────────

/// Encodes an [`ActivatePayload`]: two big-endian f64 bit patterns.
pub fn encode_activate(p: &ActivatePayload) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&p.normalized_x.to_bits().to_be_bytes());
    buf.extend_from_slice(&p.normalized_y.clamp(0.0, 1.0).to_bits().to_be_bytes());
    buf
}

/// Decodes an [`ActivatePayload`]; the Y component is clamped to `[0, 1]`.
pub fn decode_activate(p: &[u8]) -> Result<ActivatePayload, ProtocolError> {
    require_len(p, 16, "Activate")?;
    Ok(ActivatePayload {
        normalized_x: f64::from_bits(read_u64(p, 0)?),
        normalized_y: f64::from_bits(read_u64(p, 8)?).clamp(0.0, 1.0),
    })
}

/// Encodes a [`DeactivatePayload`]: one big-endian f64 bit pattern.
pub fn encode_deactivate(p: &DeactivatePayload) -> Vec<u8> {
    p.normalized_y
        .clamp(0.0, 1.0)
        .to_bits()
        .to_be_bytes()
        .to_vec()
}

/// Decodes a [`DeactivatePayload`]; the value is clamped to `[0, 1]`.
pub fn decode_deactivate(p: &[u8]) -> Result<DeactivatePayload, ProtocolError> {
    require_len(p, 8, "Deactivate")?;
    Ok(DeactivatePayload {
        normalized_y: f64::from_bits(read_u64(p, 0)?).clamp(0.0, 1.0),
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, ProtocolError> {
    if buf.len() < offset + 8 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        });
    }
    Ok(u64::from_be_bytes(
        buf[offset..offset + 8].try_into().unwrap(),
    ))
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(
    buf: &[u8],
    offset: usize,
) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(kind: MessageKind, payload: Vec<u8>) -> Envelope {
        Envelope {
            protocol_version: PROTOCOL_VERSION,
            kind,
            sequence: 42,
            monotonic_ns: 1_234_567_890,
            source_device_id: "peer-a".to_string(),
            payload,
        }
    }

    fn round_trip(env: &Envelope) -> Envelope {
        decode_envelope(&encode_envelope(env)).expect("decode failed")
    }

    // ── Envelope ─────────────────────────────────────────────────────────────

    #[test]
    fn test_envelope_round_trip_with_empty_payload() {
        let env = envelope(MessageKind::Activated, vec![]);
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_envelope_round_trip_with_payload_bytes() {
        let env = envelope(MessageKind::InputEvent, vec![1, 2, 3, 4, 5]);
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_envelope_round_trip_with_empty_device_id() {
        let mut env = envelope(MessageKind::Hello, vec![]);
        env.source_device_id = String::new();
        assert_eq!(round_trip(&env), env);
    }

    #[test]
    fn test_envelope_preserves_sequence_and_clock() {
        let mut env = envelope(MessageKind::Hello, vec![]);
        env.sequence = u64::MAX;
        env.monotonic_ns = u64::MAX - 1;
        let decoded = round_trip(&env);
        assert_eq!(decoded.sequence, u64::MAX);
        assert_eq!(decoded.monotonic_ns, u64::MAX - 1);
    }

    #[test]
    fn test_envelope_payload_is_opaque_to_the_header() {
        // An InputEvent envelope must decode even when the payload bytes are
        // garbage; payload interpretation is a separate step.
        let env = envelope(MessageKind::InputEvent, vec![0xFF; 64]);
        assert_eq!(round_trip(&env).payload, vec![0xFF; 64]);
    }

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        assert!(matches!(
            decode_envelope(&[]),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_truncated_header_returns_insufficient_data() {
        assert!(matches!(
            decode_envelope(&[PROTOCOL_VERSION, 0x01]),
            Err(ProtocolError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_decode_wrong_version_returns_error() {
        let mut bytes = encode_envelope(&envelope(MessageKind::Hello, vec![]));
        bytes[0] = 0x63;
        assert_eq!(
            decode_envelope(&bytes),
            Err(ProtocolError::UnsupportedVersion(0x63))
        );
    }

    #[test]
    fn test_decode_unknown_kind_returns_error() {
        let mut bytes = encode_envelope(&envelope(MessageKind::Hello, vec![]));
        bytes[1] = 0xEE;
        assert_eq!(
            decode_envelope(&bytes),
            Err(ProtocolError::UnknownMessageKind(0xEE))
        );
    }

    #[test]
    fn test_decode_declared_payload_longer_than_data_returns_error() {
        let mut bytes = encode_envelope(&envelope(MessageKind::Hello, vec![]));
        bytes[4..8].copy_from_slice(&100u32.to_be_bytes());
        assert!(matches!(
            decode_envelope(&bytes),
            Err(ProtocolError::PayloadLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_reserved_overlay_kind_decodes_with_opaque_payload() {
        let env = envelope(MessageKind::OverlayConfig, b"spring=0.4".to_vec());
        let decoded = round_trip(&env);
        assert_eq!(decoded.kind, MessageKind::OverlayConfig);
        assert_eq!(decoded.payload, b"spring=0.4".to_vec());
    }

    // ── Input events ─────────────────────────────────────────────────────────

    fn event_round_trip(event: &InputEvent) -> InputEvent {
        decode_input_event(&encode_input_event(event)).expect("decode failed")
    }

    #[test]
    fn test_mouse_move_round_trip_without_normalized_position() {
        let event = InputEvent::MouseMove {
            dx: -5,
            dy: 12,
            normalized: None,
            modifier_flags: 0x0010_0000,
        };
        assert_eq!(event_round_trip(&event), event);
    }

    #[test]
    fn test_mouse_move_round_trip_with_normalized_position() {
        let event = InputEvent::MouseMove {
            dx: 3,
            dy: -7,
            normalized: Some((0.25, 0.75)),
            modifier_flags: 0,
        };
        assert_eq!(event_round_trip(&event), event);
    }

    #[test]
    fn test_mouse_button_round_trip_all_buttons() {
        for button in [MouseButton::Left, MouseButton::Right, MouseButton::Other] {
            for state in [PressState::Down, PressState::Up] {
                let event = InputEvent::MouseButton {
                    button,
                    state,
                    modifier_flags: 0xFFFF,
                };
                assert_eq!(event_round_trip(&event), event);
            }
        }
    }

    #[test]
    fn test_scroll_round_trip_preserves_fractional_deltas() {
        let event = InputEvent::Scroll {
            dx: -0.125,
            dy: 33.7109375,
            modifier_flags: 2,
        };
        assert_eq!(event_round_trip(&event), event);
    }

    #[test]
    fn test_key_round_trip() {
        let event = InputEvent::Key {
            keycode: 0x0024,
            state: PressState::Down,
            modifier_flags: 1 << 17,
        };
        assert_eq!(event_round_trip(&event), event);
    }

    #[test]
    fn test_flags_changed_round_trip() {
        let event = InputEvent::FlagsChanged {
            modifier_flags: 0x0008_0000_0010_0000,
        };
        assert_eq!(event_round_trip(&event), event);
    }

    #[test]
    fn test_decode_input_event_rejects_unknown_tag() {
        let mut bytes = encode_input_event(&InputEvent::FlagsChanged { modifier_flags: 0 });
        bytes[0] = 0x7F;
        assert!(matches!(
            decode_input_event(&bytes),
            Err(ProtocolError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_decode_input_event_rejects_truncated_payload() {
        let bytes = encode_input_event(&InputEvent::Key {
            keycode: 4,
            state: PressState::Down,
            modifier_flags: 0,
        });
        assert!(decode_input_event(&bytes[..bytes.len() - 1]).is_err());
    }

    // ── Handoff payloads ─────────────────────────────────────────────────────

    #[test]
    fn test_activate_payload_round_trip() {
        let payload = ActivatePayload::at_height(0.5);
        let decoded = decode_activate(&encode_activate(&payload)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_activate_decode_clamps_out_of_range_height() {
        let mut bytes = encode_activate(&ActivatePayload::at_height(0.5));
        bytes[8..16].copy_from_slice(&3.5f64.to_bits().to_be_bytes());
        assert_eq!(decode_activate(&bytes).unwrap().normalized_y, 1.0);
    }

    #[test]
    fn test_deactivate_payload_round_trip() {
        let payload = DeactivatePayload::at_height(0.4);
        let decoded = decode_deactivate(&encode_deactivate(&payload)).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_deactivate_decode_rejects_short_payload() {
        assert!(decode_deactivate(&[0u8; 4]).is_err());
    }

    // ── Whole-message composition ────────────────────────────────────────────

    #[test]
    fn test_input_event_inside_envelope_round_trips() {
        let event = InputEvent::MouseMove {
            dx: 9,
            dy: -9,
            normalized: Some((0.0, 1.0)),
            modifier_flags: 0,
        };
        let env = envelope(MessageKind::InputEvent, encode_input_event(&event));
        let decoded_env = round_trip(&env);
        let decoded_event = decode_input_event(&decoded_env.payload).unwrap();
        assert_eq!(decoded_event, event);
    }
}
