//! Network protocol: message types, binary codec, framing, and sequence
//! numbering.

pub mod codec;
pub mod framing;
pub mod messages;
pub mod sequence;

pub use codec::{decode_envelope, encode_envelope, ProtocolError};
pub use framing::{frame, FrameBuffer, MAX_FRAME_LEN};
pub use messages::{Envelope, InputEvent, MessageKind};
pub use sequence::{SequenceCounter, SequenceGap, SequenceTracker};
