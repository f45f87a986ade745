//! Remote certificate expiry probe
//!
//! Connects to `host:443`, completes a verified TLS handshake presenting the
//! domain as SNI, and reads `notAfter` from the leaf certificate.

use crate::config::ProbeConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::RootCertStore;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

const SECONDS_PER_DAY: i64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Invalid server name '{0}'")]
    InvalidName(String),

    #[error("Failed to connect to {address}: {source}")]
    Connect { address: String, source: io::Error },

    #[error("Timed out after {elapsed:?} waiting for {stage} with {address}")]
    Timeout {
        stage: &'static str,
        address: String,
        elapsed: Duration,
    },

    #[error("TLS handshake with {address} failed: {source}")]
    Handshake { address: String, source: io::Error },

    #[error("{0} presented no certificate")]
    NoPeerCertificate(String),

    #[error("Failed to parse certificate: {0}")]
    Parse(String),

    #[error("TLS trust store unavailable: {0}")]
    TrustStore(String),
}

/// Validity of the certificate currently served for a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateExpiry {
    pub domain: String,
    /// Host actually contacted
    pub host: String,
    pub not_after: DateTime<Utc>,
    /// Whole days left, floored; negative once expired
    pub expires_in_days: i64,
}

impl CertificateExpiry {
    pub fn new(domain: &str, host: &str, not_after: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            domain: domain.to_string(),
            host: host.to_string(),
            not_after,
            expires_in_days: days_until(not_after, now),
        }
    }
}

/// `floor((not_after - now) / 1 day)`
pub fn days_until(not_after: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (not_after - now).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// Extract `notAfter` from a DER certificate
pub fn parse_not_after(der: &[u8]) -> Result<DateTime<Utc>, ProbeError> {
    let (_, cert) = x509_parser::parse_x509_certificate(der)
        .map_err(|e| ProbeError::Parse(e.to_string()))?;

    let timestamp = cert.validity().not_after.timestamp();
    DateTime::from_timestamp(timestamp, 0)
        .ok_or_else(|| ProbeError::Parse(format!("notAfter out of range: {}", timestamp)))
}

/// Anything that can report the expiry of the certificate a domain serves
#[async_trait]
pub trait ExpiryProbe: Send + Sync {
    async fn probe(&self, domain: &str, server: Option<&str>)
        -> Result<CertificateExpiry, ProbeError>;
}

#[derive(Debug, Clone)]
pub struct ProbeSettings {
    pub port: u16,
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            port: 443,
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(10),
        }
    }
}

impl From<&ProbeConfig> for ProbeSettings {
    fn from(config: &ProbeConfig) -> Self {
        Self {
            port: config.port,
            connect_timeout: config.connect_timeout.as_std(),
            handshake_timeout: config.handshake_timeout.as_std(),
        }
    }
}

pub struct ExpirationProber {
    settings: ProbeSettings,
    connector: TlsConnector,
}

impl ExpirationProber {
    /// Prober that verifies against the system trust store
    pub fn new(settings: ProbeSettings) -> Result<Self, ProbeError> {
        Self::with_roots(settings, super::native_root_store()?)
    }

    pub fn with_roots(settings: ProbeSettings, roots: RootCertStore) -> Result<Self, ProbeError> {
        let config = super::client_config(roots)?;
        Ok(Self {
            settings,
            connector: TlsConnector::from(config),
        })
    }

    /// Connect, handshake and return the leaf certificate.
    /// The TCP/TLS stream is dropped on every return path.
    async fn fetch_leaf(
        &self,
        domain: &str,
        host: &str,
    ) -> Result<CertificateDer<'static>, ProbeError> {
        let server_name = ServerName::try_from(domain.to_string())
            .map_err(|_| ProbeError::InvalidName(domain.to_string()))?;

        let port = self.settings.port;
        let address = format!("{}:{}", host, port);

        info!(address = %address, "Connecting");
        let tcp = match timeout(self.settings.connect_timeout, TcpStream::connect((host, port)))
            .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ProbeError::Connect { address, source }),
            Err(_) => {
                return Err(ProbeError::Timeout {
                    stage: "connect",
                    address,
                    elapsed: self.settings.connect_timeout,
                });
            }
        };

        info!(domain = %domain, "Getting certificate");
        let mut tls = match timeout(
            self.settings.handshake_timeout,
            self.connector.connect(server_name, tcp),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(ProbeError::Handshake { address, source }),
            Err(_) => {
                return Err(ProbeError::Timeout {
                    stage: "handshake",
                    address,
                    elapsed: self.settings.handshake_timeout,
                });
            }
        };

        let leaf = tls
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|certs| certs.first())
            .cloned();

        if timeout(self.settings.handshake_timeout, tls.shutdown())
            .await
            .is_err()
        {
            debug!(address = %address, "TLS shutdown timed out");
        }

        leaf.ok_or(ProbeError::NoPeerCertificate(address))
    }
}

#[async_trait]
impl ExpiryProbe for ExpirationProber {
    async fn probe(
        &self,
        domain: &str,
        server: Option<&str>,
    ) -> Result<CertificateExpiry, ProbeError> {
        let host = server.filter(|s| !s.is_empty()).unwrap_or(domain);

        let leaf = self.fetch_leaf(domain, host).await?;
        let not_after = parse_not_after(leaf.as_ref())?;
        let expiry = CertificateExpiry::new(domain, host, not_after, Utc::now());

        info!(
            domain = %domain,
            expires = %expiry.not_after,
            days = expiry.expires_in_days,
            "Certificate expires on {}, {} days away",
            expiry.not_after,
            expiry.expires_in_days
        );

        Ok(expiry)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{closed_port, self_signed, spawn_tls_server};
    use super::*;
    use chrono::TimeZone;
    use time::OffsetDateTime;

    fn settings(port: u16) -> ProbeSettings {
        ProbeSettings {
            port,
            connect_timeout: Duration::from_secs(2),
            handshake_timeout: Duration::from_secs(2),
        }
    }

    #[test]
    fn test_days_until_floors() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();

        let later = Utc.with_ymd_and_hms(2026, 1, 31, 11, 59, 59).unwrap();
        assert_eq!(days_until(later, now), 29);

        let exact = Utc.with_ymd_and_hms(2026, 1, 31, 12, 0, 0).unwrap();
        assert_eq!(days_until(exact, now), 30);

        // Half a day in the past is already day -1
        let expired = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(days_until(expired, now), -1);
    }

    #[test]
    fn test_parse_not_after() {
        let not_after = OffsetDateTime::from_unix_timestamp(4_102_444_800).unwrap(); // 2100-01-01
        let (cert, _) = self_signed(not_after);

        let parsed = parse_not_after(cert.as_ref()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_not_after_rejects_garbage() {
        assert!(matches!(
            parse_not_after(b"not a certificate"),
            Err(ProbeError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_probe_reads_remote_expiry() {
        let not_after = OffsetDateTime::now_utc() + time::Duration::days(30) + time::Duration::hours(1);
        let (port, roots) = spawn_tls_server(not_after).await;
        let prober = ExpirationProber::with_roots(settings(port), roots).unwrap();

        let expiry = prober.probe("localhost", Some("127.0.0.1")).await.unwrap();
        assert_eq!(expiry.domain, "localhost");
        assert_eq!(expiry.host, "127.0.0.1");
        assert_eq!(expiry.expires_in_days, 30);
    }

    #[tokio::test]
    async fn test_probe_expired_certificate_fails_handshake() {
        // Verification rejects expired certificates, so the handshake fails
        let not_after = OffsetDateTime::now_utc() - time::Duration::hours(2);
        let (port, roots) = spawn_tls_server(not_after).await;
        let prober = ExpirationProber::with_roots(settings(port), roots).unwrap();

        let result = prober.probe("localhost", Some("127.0.0.1")).await;
        assert!(matches!(result, Err(ProbeError::Handshake { .. })));
    }

    #[tokio::test]
    async fn test_probe_hostname_mismatch_fails() {
        let not_after = OffsetDateTime::now_utc() + time::Duration::days(30);
        let (port, roots) = spawn_tls_server(not_after).await;
        let prober = ExpirationProber::with_roots(settings(port), roots).unwrap();

        let result = prober.probe("example.com", Some("127.0.0.1")).await;
        assert!(matches!(result, Err(ProbeError::Handshake { .. })));
    }

    #[tokio::test]
    async fn test_probe_unreachable_host() {
        let (_reserved, port) = closed_port();
        let prober = ExpirationProber::with_roots(settings(port), RootCertStore::empty()).unwrap();

        let result = prober.probe("localhost", Some("127.0.0.1")).await;
        assert!(matches!(result, Err(ProbeError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_probe_rejects_invalid_name() {
        let prober = ExpirationProber::with_roots(settings(443), RootCertStore::empty()).unwrap();
        let result = prober.probe("not a hostname!", None).await;
        assert!(matches!(result, Err(ProbeError::InvalidName(_))));
    }
}
