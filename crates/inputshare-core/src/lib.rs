//! # inputshare-core
//!
//! Shared library for inputshare containing the wire protocol codec, screen
//! geometry, and the handoff logic that decides when input ownership moves
//! between the two hosts.
//!
//! This crate is used by both the sender and receiver roles of the peer
//! application. It has zero dependencies on OS APIs, UI frameworks, or
//! network sockets.
//!
//! # Architecture overview
//!
//! inputshare shares one physical mouse and keyboard across two hosts on a
//! LAN. When the cursor dwells at a configured screen edge of one host (the
//! "sender"), ownership of input transfers to the other host (the
//! "receiver"): the sender suppresses its local HID and forwards captured
//! events over an encrypted TCP stream; the receiver injects them as if
//! they had originated locally.
//!
//! This crate defines the pieces of that pipeline that are pure logic:
//!
//! - **`protocol`** – How bytes travel over the network. Envelopes are
//!   encoded into a compact binary format (24-byte header + source device
//!   id + payload) and decoded back into typed Rust structs on the other
//!   end. Frame boundaries are a separate 4-byte length prefix so the
//!   transport can reassemble messages from an arbitrary byte stream.
//!
//! - **`domain`** – The handoff decision logic: the multi-display screen
//!   geometry, the dwell-based edge detector, the forwarding state machine,
//!   and the mouse-move coalescer.

pub mod domain;
pub mod protocol;

pub use domain::coalesce::Coalescer;
pub use domain::edge::{EdgeConfig, EdgeDetector, EdgeEvent, EdgeZone};
pub use domain::geometry::{Point, Rect, ScreenGeometry};
pub use domain::handoff::{HandoffEffect, HandoffInput, HandoffMachine, HandoffState};
pub use protocol::codec::{decode_envelope, encode_envelope, ProtocolError};
pub use protocol::messages::{Envelope, InputEvent, MessageKind, PROTOCOL_VERSION};
