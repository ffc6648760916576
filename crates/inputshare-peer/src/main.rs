//! inputshare CLI entry point.
//!
//! Three subcommands:
//!
//! ```text
//! inputshare send --host <ip> --port <n> [TLS flags]
//! inputshare receive --port <n> [TLS flags]
//! inputshare mock-receive --port <n>
//! ```
//!
//! TLS flags: `--identity-cert <pem> --identity-key <pem> --pin-sha256 <hex>`,
//! all three or none. Without them the connection is plaintext, which is
//! meant for development against `mock-receive` only.
//!
//! Exit codes: 0 on clean termination, 2 on argument errors (including
//! unreadable identity material), non-zero otherwise.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use inputshare_peer::config::{self, PeerConfig};
use inputshare_peer::discovery::{self, Advertiser};
use inputshare_peer::hid;
use inputshare_peer::mock_receive;
use inputshare_peer::session::{
    ReceiverConfig, ReceiverSession, SenderConfig, SenderSession, SessionError,
};
use inputshare_peer::status::StatusFeed;
use inputshare_peer::transport::{self, Fingerprint, Listener, SecurityMode, TlsIdentity};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Share one mouse and keyboard across two hosts on the local network.
#[derive(Debug, Parser)]
#[command(name = "inputshare", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Forward local input to a peer when the cursor dwells at the right
    /// screen edge.
    Send {
        /// Peer address. When omitted, the first peer discovered over mDNS
        /// is used.
        #[arg(long)]
        host: Option<String>,
        /// Peer session port.
        #[arg(long, default_value_t = 4242, env = "INPUTSHARE_PORT")]
        port: u16,
        #[command(flatten)]
        tls: TlsArgs,
    },
    /// Accept a peer connection and inject the input it forwards.
    Receive {
        /// Port to listen on.
        #[arg(long, default_value_t = 4242, env = "INPUTSHARE_PORT")]
        port: u16,
        /// Friendly name advertised over mDNS. Defaults to the hostname.
        #[arg(long)]
        name: Option<String>,
        #[command(flatten)]
        tls: TlsArgs,
    },
    /// Development sink: accept any peer, print every input event as JSON,
    /// and acknowledge the handshake messages.
    MockReceive {
        /// Port to listen on.
        #[arg(long, default_value_t = 4242, env = "INPUTSHARE_PORT")]
        port: u16,
    },
}

/// Mutual-TLS flags. All three together, or none.
#[derive(Debug, Args, Default)]
struct TlsArgs {
    /// PEM certificate chain identifying this peer.
    #[arg(long, value_name = "PEM")]
    identity_cert: Option<PathBuf>,
    /// PEM private key for the identity certificate.
    #[arg(long, value_name = "PEM")]
    identity_key: Option<PathBuf>,
    /// Expected SHA-256 fingerprint of the remote peer's leaf certificate.
    #[arg(long, value_name = "HEX")]
    pin_sha256: Option<String>,
}

impl TlsArgs {
    fn security_mode(&self) -> Result<SecurityMode, SessionError> {
        match (&self.identity_cert, &self.identity_key, &self.pin_sha256) {
            (None, None, None) => Ok(SecurityMode::Plaintext),
            (Some(cert), Some(key), Some(pin)) => {
                let identity = TlsIdentity::load(cert, key).map_err(SessionError::from)?;
                let pin = Fingerprint::from_hex(pin).map_err(SessionError::from)?;
                info!(own_leaf = %identity.leaf_fingerprint(), "identity loaded");
                Ok(SecurityMode::Pinned { identity, pin })
            }
            _ => Err(SessionError::Config(
                "--identity-cert, --identity-key and --pin-sha256 must be given together"
                    .to_string(),
            )),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut peer_config = config::load_config().unwrap_or_else(|e| {
        warn!("config unreadable, using defaults: {e}");
        PeerConfig::default()
    });
    let device_id = peer_config.ensure_device_id();
    if let Err(e) = config::save_config(&peer_config) {
        warn!("could not persist config: {e}");
    }

    let result = match cli.command {
        Command::Send { host, port, tls } => run_send(host, port, &tls, &peer_config, device_id).await,
        Command::Receive { port, name, tls } => {
            run_receive(port, name, &tls, &peer_config, device_id).await
        }
        Command::MockReceive { port } => mock_receive::run(port).await.map_err(Into::into),
    };

    if let Err(e) = result {
        if matches!(e.downcast_ref::<SessionError>(), Some(SessionError::Config(_))) {
            eprintln!("argument error: {e:#}");
            std::process::exit(2);
        }
        return Err(e);
    }
    Ok(())
}

// ── Role wiring ───────────────────────────────────────────────────────────────

async fn run_send(
    host: Option<String>,
    port: u16,
    tls: &TlsArgs,
    peer_config: &PeerConfig,
    device_id: String,
) -> anyhow::Result<()> {
    let mode = tls.security_mode()?;
    if mode.is_plaintext() {
        warn!("no TLS flags given; connecting in plaintext (development only)");
    }

    let (host, port) = match host {
        Some(host) => (host, port),
        None => {
            info!("no --host given; browsing for a peer over mDNS");
            let mut peers = discovery::browse().context("starting discovery")?;
            let record = tokio::time::timeout(Duration::from_secs(10), peers.recv())
                .await
                .context("no peer discovered within 10 s")?
                .context("discovery ended without a peer")?;
            info!(name = %record.name, endpoint = %record.endpoint, "using discovered peer");
            (record.endpoint.ip().to_string(), record.endpoint.port())
        }
    };

    let status = Arc::new(StatusFeed::new());
    spawn_status_logger(&status);
    status.publish(inputshare_peer::SessionStatus::Connecting);

    let (events_tx, events_rx) = mpsc::channel(256);
    let connection = transport::connect(&host, port, &mode, events_tx)
        .await
        .map_err(SessionError::from)?;

    let (capture_backend, _injection) = hid::platform_backends();
    let session = SenderSession::new(
        sender_config(peer_config, device_id)?,
        capture_backend,
        Arc::clone(&status),
    )?;

    let shutdown = shutdown_on_ctrl_c();
    session.run(connection, events_rx, shutdown).await?;
    info!("sender session finished");
    Ok(())
}

async fn run_receive(
    port: u16,
    name: Option<String>,
    tls: &TlsArgs,
    peer_config: &PeerConfig,
    device_id: String,
) -> anyhow::Result<()> {
    let mode = tls.security_mode()?;
    if mode.is_plaintext() {
        warn!("no TLS flags given; accepting plaintext peers (development only)");
    }

    let listener = Listener::bind(&peer_config.network.bind_address, port, &mode)
        .await
        .map_err(SessionError::from)?;

    let advertised_name = name.unwrap_or_else(|| peer_config.display_name());
    let advertiser = match Advertiser::register(&advertised_name, port, &device_id) {
        Ok(advertiser) => Some(advertiser),
        Err(e) => {
            warn!("mDNS advertisement unavailable: {e}");
            None
        }
    };

    let status = Arc::new(StatusFeed::new());
    spawn_status_logger(&status);

    // One session at a time: a session spans exactly two peers.
    loop {
        let (events_tx, events_rx) = mpsc::channel(256);
        let accepted = tokio::select! {
            accepted = listener.accept(events_tx) => accepted,
            _ = tokio::signal::ctrl_c() => break,
        };
        let (connection, peer_addr) = match accepted {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("handshake rejected: {e}");
                continue;
            }
        };
        info!(peer = %peer_addr, "receiver session starting");

        let (capture_backend, injection_backend) = hid::platform_backends();
        let session = ReceiverSession::new(
            receiver_config(peer_config, device_id.clone())?,
            capture_backend,
            injection_backend,
            Arc::clone(&status),
        )?;

        let shutdown = shutdown_on_ctrl_c();
        match session.run(connection, events_rx, shutdown).await {
            Ok(()) => info!(peer = %peer_addr, "receiver session ended"),
            Err(e) => warn!(peer = %peer_addr, "receiver session failed: {e}"),
        }
    }

    if let Some(advertiser) = advertiser {
        advertiser.unregister();
    }
    Ok(())
}

fn sender_config(config: &PeerConfig, device_id: String) -> Result<SenderConfig, SessionError> {
    Ok(SenderConfig {
        geometry: config
            .geometry()
            .map_err(|e| SessionError::Config(e.to_string()))?,
        device_id,
        enter_threshold: config.handoff.enter_threshold_px,
        exit_threshold: config.handoff.exit_threshold_px,
        dwell: config.handoff.dwell(),
        activation_timeout: config.handoff.activation_timeout(),
        coalesce_interval: config.handoff.coalesce_interval(),
    })
}

fn receiver_config(config: &PeerConfig, device_id: String) -> Result<ReceiverConfig, SessionError> {
    Ok(ReceiverConfig {
        geometry: config
            .geometry()
            .map_err(|e| SessionError::Config(e.to_string()))?,
        device_id,
        enter_threshold: config.handoff.enter_threshold_px,
        exit_threshold: config.handoff.exit_threshold_px,
        dwell: config.handoff.dwell(),
    })
}

fn spawn_status_logger(status: &Arc<StatusFeed>) {
    let mut rx = status.subscribe();
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let current = rx.borrow().clone();
            info!(status = ?current, "session status");
        }
    });
}

fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, shutting down");
            let _ = tx.send(true);
        }
    });
    rx
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_defaults_to_port_4242() {
        let cli = Cli::parse_from(["inputshare", "send", "--host", "192.168.1.9"]);
        match cli.command {
            Command::Send { host, port, .. } => {
                assert_eq!(host.as_deref(), Some("192.168.1.9"));
                assert_eq!(port, 4242);
            }
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn test_send_host_is_optional_for_discovery() {
        let cli = Cli::parse_from(["inputshare", "send"]);
        match cli.command {
            Command::Send { host, .. } => assert!(host.is_none()),
            other => panic!("expected send, got {other:?}"),
        }
    }

    #[test]
    fn test_receive_port_override() {
        let cli = Cli::parse_from(["inputshare", "receive", "--port", "5050"]);
        match cli.command {
            Command::Receive { port, .. } => assert_eq!(port, 5050),
            other => panic!("expected receive, got {other:?}"),
        }
    }

    #[test]
    fn test_mock_receive_parses() {
        let cli = Cli::parse_from(["inputshare", "mock-receive", "--port", "4243"]);
        match cli.command {
            Command::MockReceive { port } => assert_eq!(port, 4243),
            other => panic!("expected mock-receive, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_subcommand_is_a_parse_error() {
        assert!(Cli::try_parse_from(["inputshare", "broadcast"]).is_err());
    }

    #[test]
    fn test_no_tls_flags_means_plaintext() {
        let mode = TlsArgs::default().security_mode().unwrap();
        assert!(mode.is_plaintext());
    }

    #[test]
    fn test_partial_tls_flags_are_an_argument_error() {
        let args = TlsArgs {
            identity_cert: Some(PathBuf::from("/tmp/cert.pem")),
            identity_key: None,
            pin_sha256: None,
        };
        assert!(matches!(
            args.security_mode(),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn test_full_tls_flags_with_missing_files_fail_as_config_error() {
        let args = TlsArgs {
            identity_cert: Some(PathBuf::from("/nonexistent/cert.pem")),
            identity_key: Some(PathBuf::from("/nonexistent/key.pem")),
            pin_sha256: Some("00".repeat(32)),
        };
        assert!(matches!(
            args.security_mode(),
            Err(SessionError::Config(_))
        ));
    }
}
