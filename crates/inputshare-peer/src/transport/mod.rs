//! Secure transport: an authenticated, encrypted, framed duplex stream.
//!
//! Two layers. [`tls`] builds the rustls configurations for mutual
//! authentication with SHA-256 leaf-certificate pinning. [`framed`] wraps
//! any ordered byte stream with the wire framing, a bounded non-blocking
//! send queue, and a typed event channel toward the session scheduler.
//!
//! `SecurityMode::Plaintext` skips TLS entirely; it exists for development
//! against `mock-receive` and is selected by omitting the TLS flags.

use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::info;

pub mod framed;
pub mod tls;

pub use framed::{FrameSender, FramedConnection, SendError, SEND_QUEUE_CAPACITY};
pub use tls::{Fingerprint, TlsIdentity};

/// Error type for transport setup and handshakes.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS handshake failed: {0}")]
    HandshakeFailed(String),
    #[error("invalid identity material: {0}")]
    InvalidIdentity(String),
    #[error("invalid pinned fingerprint: {0}")]
    InvalidFingerprint(String),
    #[error("invalid peer host name: {0}")]
    InvalidHostName(String),
}

/// Connection lifecycle states surfaced to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Connecting,
    Ready,
    Failed,
    Cancelled,
}

/// What the transport pushes into the session channel.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    State(TransportState),
    Frame(Vec<u8>),
}

/// Whether and how a connection is authenticated.
pub enum SecurityMode {
    /// Unauthenticated TCP. Development only.
    Plaintext,
    /// Mutual TLS; the remote leaf certificate must hash to `pin`.
    Pinned {
        identity: TlsIdentity,
        pin: Fingerprint,
    },
}

impl SecurityMode {
    pub fn is_plaintext(&self) -> bool {
        matches!(self, SecurityMode::Plaintext)
    }
}

/// Opens an outbound connection and starts the framed layer on it.
///
/// # Errors
///
/// Returns [`TransportError::HandshakeFailed`] when TLS (including the pin
/// check) rejects the peer, and I/O errors for everything below it.
pub async fn connect(
    host: &str,
    port: u16,
    mode: &SecurityMode,
    events: mpsc::Sender<TransportEvent>,
) -> Result<FramedConnection, TransportError> {
    let tcp = TcpStream::connect((host, port)).await?;
    tcp.set_nodelay(true)?;

    match mode {
        SecurityMode::Plaintext => {
            info!(host, port, "connected (plaintext)");
            Ok(FramedConnection::start(tcp, events))
        }
        SecurityMode::Pinned { identity, pin } => {
            let config = tls::client_config(identity, *pin)?;
            let connector = TlsConnector::from(Arc::new(config));
            let server_name = tls::server_name_for(host)?;
            let stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
            info!(host, port, "connected (mutual TLS, pinned)");
            Ok(FramedConnection::start(stream, events))
        }
    }
}

/// A listening endpoint for the receiver role.
pub struct Listener {
    inner: TcpListener,
    acceptor: Option<TlsAcceptor>,
}

impl Listener {
    /// Binds the port and prepares the TLS acceptor when pinning is on.
    pub async fn bind(
        bind_address: &str,
        port: u16,
        mode: &SecurityMode,
    ) -> Result<Self, TransportError> {
        let inner = TcpListener::bind((bind_address, port)).await?;
        let acceptor = match mode {
            SecurityMode::Plaintext => None,
            SecurityMode::Pinned { identity, pin } => {
                let config = tls::server_config(identity, *pin)?;
                Some(TlsAcceptor::from(Arc::new(config)))
            }
        };
        info!(
            addr = %inner.local_addr()?,
            tls = acceptor.is_some(),
            "listening"
        );
        Ok(Self { inner, acceptor })
    }

    pub fn local_addr(&self) -> Result<std::net::SocketAddr, TransportError> {
        Ok(self.inner.local_addr()?)
    }

    /// Accepts one connection, runs the handshake, and starts the framed
    /// layer on it.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::HandshakeFailed`] when the client presents
    /// no certificate or one that does not match the pin.
    pub async fn accept(
        &self,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(FramedConnection, std::net::SocketAddr), TransportError> {
        let (tcp, peer_addr) = self.inner.accept().await?;
        tcp.set_nodelay(true)?;

        let connection = match &self.acceptor {
            None => FramedConnection::start(tcp, events),
            Some(acceptor) => {
                let stream = acceptor
                    .accept(tcp)
                    .await
                    .map_err(|e| TransportError::HandshakeFailed(e.to_string()))?;
                FramedConnection::start(stream, events)
            }
        };
        info!(peer = %peer_addr, "accepted connection");
        Ok((connection, peer_addr))
    }
}
