//! # inputshare-peer
//!
//! The peer application of inputshare. A peer is symmetric: each host runs
//! both roles and becomes the *sender* when its own edge triggers and the
//! *receiver* when the remote peer's does.
//!
//! Layering follows the shape of the protocol crate's consumers:
//!
//! - **`hid`** – capture and injection adapters over thin OS backend traits.
//!   The backends are the only platform-specific surface; everything above
//!   them (suppression bookkeeping, provenance filtering, virtual cursor
//!   tracking, drag reconstruction) is portable and tested against mocks.
//! - **`transport`** – mutually authenticated TLS with SHA-256 leaf pinning,
//!   and the framed, bounded, non-blocking connection layer on top.
//! - **`discovery`** – mDNS advertisement and browsing of
//!   `_inputshare._tcp` peers.
//! - **`session`** – the sender and receiver session controllers binding it
//!   all together on one serial scheduler per session.
//! - **`config`** / **`status`** – TOML configuration and the observer feed
//!   for connection status.

pub mod config;
pub mod discovery;
pub mod hid;
pub mod mock_receive;
pub mod session;
pub mod status;
pub mod transport;

pub use session::{ReceiverSession, SenderSession, SessionError};
pub use status::{SessionStatus, StatusFeed};
