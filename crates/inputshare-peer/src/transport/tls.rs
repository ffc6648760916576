//! Mutual TLS with SHA-256 leaf-certificate pinning.
//!
//! Peers authenticate each other with long-term self-signed certificates.
//! Chain building and name checks buy nothing against a self-signed leaf,
//! so both verifiers replace the default path validation with a single
//! rule: the presented leaf certificate's SHA-256 digest must equal the
//! pin configured for the remote peer. Signature verification during the
//! handshake still runs through the `ring` provider, which is what proves
//! the peer actually holds the pinned certificate's private key.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ring::digest;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{DigitallySignedStruct, DistinguishedName, SignatureScheme};

use super::TransportError;

/// SHA-256 digest of a DER-encoded leaf certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Parses a hex fingerprint, with or without colon separators.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidFingerprint`] unless the input is
    /// exactly 32 hex-encoded bytes.
    pub fn from_hex(input: &str) -> Result<Self, TransportError> {
        let hex: String = input
            .chars()
            .filter(|c| *c != ':' && !c.is_whitespace())
            .collect();
        if hex.len() != 64 {
            return Err(TransportError::InvalidFingerprint(format!(
                "expected 64 hex characters, got {}",
                hex.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|_| {
                TransportError::InvalidFingerprint(format!(
                    "non-hex characters at position {}",
                    2 * i
                ))
            })?;
        }
        Ok(Self(bytes))
    }

    /// Digests a DER certificate.
    pub fn of_der(cert: &CertificateDer<'_>) -> Self {
        let d = digest::digest(&digest::SHA256, cert.as_ref());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(d.as_ref());
        Self(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// A peer's long-term identity: certificate chain and private key.
pub struct TlsIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl TlsIdentity {
    /// Loads a PEM certificate chain and PEM private key from disk.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidIdentity`] for unreadable files,
    /// empty chains, or unparseable keys.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, TransportError> {
        let cert_pem = std::fs::read(cert_path).map_err(|e| {
            TransportError::InvalidIdentity(format!("reading {}: {e}", cert_path.display()))
        })?;
        let chain: Vec<CertificateDer<'static>> =
            rustls_pemfile::certs(&mut cert_pem.as_slice())
                .collect::<Result<_, _>>()
                .map_err(|e| {
                    TransportError::InvalidIdentity(format!(
                        "parsing {}: {e}",
                        cert_path.display()
                    ))
                })?;
        if chain.is_empty() {
            return Err(TransportError::InvalidIdentity(format!(
                "{} contains no certificates",
                cert_path.display()
            )));
        }

        let key_pem = std::fs::read(key_path).map_err(|e| {
            TransportError::InvalidIdentity(format!("reading {}: {e}", key_path.display()))
        })?;
        let key = rustls_pemfile::private_key(&mut key_pem.as_slice())
            .map_err(|e| {
                TransportError::InvalidIdentity(format!("parsing {}: {e}", key_path.display()))
            })?
            .ok_or_else(|| {
                TransportError::InvalidIdentity(format!(
                    "{} contains no private key",
                    key_path.display()
                ))
            })?;

        Ok(Self { chain, key })
    }

    /// The fingerprint of this identity's own leaf, for display so the
    /// operator can configure the pin on the other host.
    pub fn leaf_fingerprint(&self) -> Fingerprint {
        Fingerprint::of_der(&self.chain[0])
    }
}

/// Builds the client-side config: present our identity, accept only the
/// pinned server leaf.
pub fn client_config(
    identity: &TlsIdentity,
    pin: Fingerprint,
) -> Result<rustls::ClientConfig, TransportError> {
    // Ignored when a process-wide provider is already installed.
    let _ = rustls::crypto::ring::default_provider().install_default();

    rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(PinnedServerVerifier { pin }))
        .with_client_auth_cert(identity.chain.clone(), identity.key.clone_key())
        .map_err(|e| TransportError::InvalidIdentity(e.to_string()))
}

/// Builds the server-side config: present our identity, require a client
/// certificate matching the pin.
pub fn server_config(
    identity: &TlsIdentity,
    pin: Fingerprint,
) -> Result<rustls::ServerConfig, TransportError> {
    let _ = rustls::crypto::ring::default_provider().install_default();

    rustls::ServerConfig::builder()
        .with_client_cert_verifier(Arc::new(PinnedClientVerifier { pin }))
        .with_single_cert(identity.chain.clone(), identity.key.clone_key())
        .map_err(|e| TransportError::InvalidIdentity(e.to_string()))
}

/// Builds the SNI name for an outbound handshake. IP addresses and DNS
/// names are both accepted; the pin decides trust either way.
pub fn server_name_for(host: &str) -> Result<ServerName<'static>, TransportError> {
    if let Ok(ip) = host.parse::<std::net::IpAddr>() {
        return Ok(ServerName::IpAddress(ip.into()));
    }
    ServerName::try_from(host.to_owned())
        .map_err(|_| TransportError::InvalidHostName(host.to_owned()))
}

// ── Pinned verifiers ──────────────────────────────────────────────────────────

fn pin_error() -> rustls::Error {
    rustls::Error::InvalidCertificate(rustls::CertificateError::ApplicationVerificationFailure)
}

#[derive(Debug)]
struct PinnedServerVerifier {
    pin: Fingerprint,
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if Fingerprint::of_der(end_entity) == self.pin {
            Ok(ServerCertVerified::assertion())
        } else {
            Err(pin_error())
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

#[derive(Debug)]
struct PinnedClientVerifier {
    pin: Fingerprint,
}

impl ClientCertVerifier for PinnedClientVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        if Fingerprint::of_der(end_entity) == self.pin {
            Ok(ClientCertVerified::assertion())
        } else {
            Err(pin_error())
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &rustls::crypto::ring::default_provider().signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HEX: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";

    #[test]
    fn test_fingerprint_parses_plain_hex() {
        let fp = Fingerprint::from_hex(SAMPLE_HEX).unwrap();
        assert_eq!(fp.to_string(), SAMPLE_HEX);
    }

    #[test]
    fn test_fingerprint_parses_colon_separated_hex() {
        let with_colons: String = SAMPLE_HEX
            .as_bytes()
            .chunks(2)
            .map(|c| std::str::from_utf8(c).unwrap())
            .collect::<Vec<_>>()
            .join(":");
        let fp = Fingerprint::from_hex(&with_colons).unwrap();
        assert_eq!(fp.to_string(), SAMPLE_HEX);
    }

    #[test]
    fn test_fingerprint_rejects_wrong_length() {
        assert!(matches!(
            Fingerprint::from_hex("abcd"),
            Err(TransportError::InvalidFingerprint(_))
        ));
    }

    #[test]
    fn test_fingerprint_rejects_non_hex_characters() {
        let bad = "zz".to_owned() + &SAMPLE_HEX[2..];
        assert!(matches!(
            Fingerprint::from_hex(&bad),
            Err(TransportError::InvalidFingerprint(_))
        ));
    }

    #[test]
    fn test_fingerprint_of_der_is_sha256_of_the_bytes() {
        // SHA-256 of "test" is the well-known digest in SAMPLE_HEX.
        let cert = CertificateDer::from(b"test".to_vec());
        let fp = Fingerprint::of_der(&cert);
        assert_eq!(fp.to_string(), SAMPLE_HEX);
    }

    #[test]
    fn test_server_verifier_accepts_matching_pin() {
        let cert = CertificateDer::from(b"leaf-cert-bytes".to_vec());
        let verifier = PinnedServerVerifier {
            pin: Fingerprint::of_der(&cert),
        };
        let result = verifier.verify_server_cert(
            &cert,
            &[],
            &server_name_for("127.0.0.1").unwrap(),
            &[],
            UnixTime::now(),
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_server_verifier_rejects_mismatched_pin() {
        let pinned = CertificateDer::from(b"the-cert-we-expect".to_vec());
        let presented = CertificateDer::from(b"a-different-cert".to_vec());
        let verifier = PinnedServerVerifier {
            pin: Fingerprint::of_der(&pinned),
        };
        let result = verifier.verify_server_cert(
            &presented,
            &[],
            &server_name_for("127.0.0.1").unwrap(),
            &[],
            UnixTime::now(),
        );
        assert!(result.is_err(), "handshake must fail on pin mismatch");
    }

    #[test]
    fn test_client_verifier_rejects_mismatched_pin() {
        let pinned = CertificateDer::from(b"expected-client".to_vec());
        let presented = CertificateDer::from(b"unexpected-client".to_vec());
        let verifier = PinnedClientVerifier {
            pin: Fingerprint::of_der(&pinned),
        };
        assert!(verifier
            .verify_client_cert(&presented, &[], UnixTime::now())
            .is_err());
    }

    #[test]
    fn test_client_verifier_requires_a_client_certificate() {
        let verifier = PinnedClientVerifier {
            pin: Fingerprint::from_hex(SAMPLE_HEX).unwrap(),
        };
        assert!(verifier.client_auth_mandatory());
    }

    #[test]
    fn test_server_name_accepts_ips_and_hostnames() {
        assert!(server_name_for("192.168.1.20").is_ok());
        assert!(server_name_for("peer.local").is_ok());
        assert!(server_name_for("not a hostname").is_err());
    }

    #[test]
    fn test_identity_load_fails_on_missing_files() {
        let result = TlsIdentity::load(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        );
        assert!(matches!(result, Err(TransportError::InvalidIdentity(_))));
    }
}
