//! mDNS service discovery.
//!
//! The receiver advertises `_inputshare._tcp` on the local link with its
//! friendly name; a sender without an explicit `--host` browses for the
//! first advertised peer. The session controller only ever sees the
//! resulting `{endpoint, name}` records.
//!
//! # TXT record keys
//!
//! | Key       | Value                                  |
//! |-----------|----------------------------------------|
//! | `version` | Protocol version (`"1"`)               |
//! | `port`    | TCP session port                       |
//! | `device`  | Stable device id of the advertising peer |

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use inputshare_core::protocol::messages::PROTOCOL_VERSION;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub const SERVICE_TYPE: &str = "_inputshare._tcp.local.";

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("mDNS daemon failed to start: {0}")]
    DaemonFailed(String),
    #[error("failed to register service: {0}")]
    RegisterFailed(String),
    #[error("failed to browse service: {0}")]
    BrowseFailed(String),
}

/// A discovered peer, as the session controller consumes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Friendly display name the peer advertised.
    pub name: String,
    /// Resolved session endpoint.
    pub endpoint: SocketAddr,
}

/// Active service advertisement. Call [`unregister`](Advertiser::unregister)
/// on shutdown.
pub struct Advertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl Advertiser {
    /// Advertises this peer on the local link.
    pub fn register(
        instance_name: &str,
        port: u16,
        device_id: &str,
    ) -> Result<Self, DiscoveryError> {
        let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::DaemonFailed(e.to_string()))?;

        let raw_host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "inputshare-peer".to_owned());
        let host = format!("{raw_host}.local.");
        let ip = detect_local_ip();

        let mut properties = HashMap::new();
        properties.insert("version".to_owned(), PROTOCOL_VERSION.to_string());
        properties.insert("port".to_owned(), port.to_string());
        properties.insert("device".to_owned(), device_id.to_owned());

        let service = ServiceInfo::new(SERVICE_TYPE, instance_name, &host, ip, port, Some(properties))
            .map_err(|e| DiscoveryError::RegisterFailed(e.to_string()))?;
        let fullname = service.get_fullname().to_owned();
        daemon
            .register(service)
            .map_err(|e| DiscoveryError::RegisterFailed(e.to_string()))?;

        info!(name = instance_name, %ip, port, "advertising on mDNS");
        Ok(Self { daemon, fullname })
    }

    /// Removes the advertisement.
    pub fn unregister(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!("failed to unregister '{}': {e}", self.fullname);
        }
        let _ = self.daemon.shutdown();
    }
}

/// Starts browsing for peers. Records arrive on the returned channel as
/// services resolve.
pub fn browse() -> Result<mpsc::Receiver<PeerRecord>, DiscoveryError> {
    let daemon = ServiceDaemon::new().map_err(|e| DiscoveryError::DaemonFailed(e.to_string()))?;
    let receiver = daemon
        .browse(SERVICE_TYPE)
        .map_err(|e| DiscoveryError::BrowseFailed(e.to_string()))?;

    let (tx, rx) = mpsc::channel(16);

    tokio::spawn(async move {
        while let Ok(event) = receiver.recv_async().await {
            match event {
                ServiceEvent::ServiceResolved(info) => {
                    let Some(addr) = info.get_addresses().iter().next().copied() else {
                        debug!("resolved service without addresses: {}", info.get_fullname());
                        continue;
                    };
                    let record = PeerRecord {
                        name: info
                            .get_fullname()
                            .split('.')
                            .next()
                            .unwrap_or(info.get_fullname())
                            .to_owned(),
                        endpoint: SocketAddr::new(addr, info.get_port()),
                    };
                    info!(name = %record.name, endpoint = %record.endpoint, "discovered peer");
                    if tx.send(record).await.is_err() {
                        break;
                    }
                }
                ServiceEvent::ServiceRemoved(_, fullname) => {
                    debug!("peer gone: {fullname}");
                }
                _ => {}
            }
        }
        let _ = daemon.shutdown();
    });

    Ok(rx)
}

/// Detects the primary LAN IPv4 address by querying the OS routing table.
/// No packets are sent.
fn detect_local_ip() -> IpAddr {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .map(|a| a.ip())
        .unwrap_or_else(|_| IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_type_matches_the_advertised_protocol() {
        assert_eq!(SERVICE_TYPE, "_inputshare._tcp.local.");
    }

    #[test]
    fn test_detect_local_ip_returns_a_usable_address() {
        let ip = detect_local_ip();
        assert!(!ip.is_unspecified());
    }

    #[test]
    fn test_peer_record_fields() {
        let record = PeerRecord {
            name: "desk".to_string(),
            endpoint: "192.168.1.7:4242".parse().unwrap(),
        };
        assert_eq!(record.endpoint.port(), 4242);
        assert_eq!(record.name, "desk");
    }
}
