//! Command-level runs: issue or renew a batch of domains, and report expiry

use crate::acme::AcmeConnector;
use crate::config::DnsCredentials;
use crate::issue::{IssuanceRequest, IssueError, Issuer};
use crate::output::{self, Destination};
use crate::renewal;
use crate::store::KeyAlgorithm;
use crate::tls::{CertificateExpiry, ExpiryProbe, ProbeError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Expiry check applied to each domain before renewing it
pub struct RenewCheck<P> {
    pub probe: P,
    pub threshold_days: u32,
    /// Host to connect to instead of the domain
    pub server: Option<String>,
}

impl<P: ExpiryProbe> RenewCheck<P> {
    /// `None` means every domain is issued. That is the case for a zero
    /// threshold (the prober is never built) and when the prober cannot be
    /// set up, since an unverifiable certificate is treated as due.
    pub fn setup<F>(threshold_days: u32, server: Option<String>, build: F) -> Option<Self>
    where
        F: FnOnce() -> Result<P, ProbeError>,
    {
        if threshold_days == 0 {
            return None;
        }

        match build() {
            Ok(probe) => Some(Self {
                probe,
                threshold_days,
                server,
            }),
            Err(e) => {
                warn!(error = %e, "Cannot check certificate expiration, renewing every domain");
                None
            }
        }
    }
}

/// Settings shared by every domain in a batch
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub key_file: PathBuf,
    pub key_algorithm: KeyAlgorithm,
    pub contact_email: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub issued: Vec<String>,
    /// Still valid, left alone
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl BatchReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Issue (or renew) every planned domain in order. One failure does not stop
/// the rest of the batch but is recorded in the report.
///
/// Missing DNS credentials fail the whole batch before any endpoint is
/// contacted.
pub async fn run_batch<C, P>(
    issuer: &Issuer<C>,
    plan: Vec<(String, Destination)>,
    settings: &BatchSettings,
    dns_credentials: Option<DnsCredentials>,
    renew_check: Option<&RenewCheck<P>>,
) -> Result<BatchReport, IssueError>
where
    C: AcmeConnector,
    P: ExpiryProbe,
{
    if dns_credentials.is_none() {
        return Err(IssueError::MissingDnsCredentials);
    }

    let mut report = BatchReport::default();

    for (domain, destination) in plan {
        if let Some(check) = renew_check {
            let due = renewal::should_issue(
                &check.probe,
                &domain,
                check.threshold_days,
                check.server.as_deref(),
            )
            .await;
            if !due {
                report.skipped.push(domain);
                continue;
            }
        }

        let request = IssuanceRequest {
            domain: domain.clone(),
            contact_email: settings.contact_email.clone(),
            key_file: settings.key_file.clone(),
            key_algorithm: settings.key_algorithm,
            dns_credentials: dns_credentials.clone(),
        };

        let issued = match issuer.issue(&request).await {
            Ok(issued) => issued,
            Err(e) => {
                error!(domain = %domain, "Certificate issue failed: {}", e);
                report.failed.push(domain);
                continue;
            }
        };

        match output::deliver(&issued.pem, &issued.naked_domain, &destination) {
            Ok(()) => {
                info!(domain = %issued.domain, "Certificate issued");
                report.issued.push(domain);
            }
            Err(e) => {
                error!(domain = %issued.domain, "Failed to save certificate: {}", e);
                report.failed.push(domain);
            }
        }
    }

    if !report.succeeded() {
        warn!("{} domain(s) failed", report.failed.len());
    }

    Ok(report)
}

/// What the `expiration` command prints, and whether it succeeded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationReport {
    pub output: String,
    pub success: bool,
}

impl ExpirationReport {
    /// Remaining days on success. Any failure prints `0` and fails.
    pub fn from_probe(domain: &str, result: &Result<CertificateExpiry, ProbeError>) -> Self {
        match result {
            Ok(expiry) => Self {
                output: expiry.expires_in_days.to_string(),
                success: true,
            },
            Err(e) => {
                error!(domain = %domain, "Failed to get certificate expiration: {}", e);
                Self {
                    output: "0".to_string(),
                    success: false,
                }
            }
        }
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.success {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    }
}

/// Probe `domain` once and build the report
pub async fn check_expiration<P>(
    probe: Result<P, ProbeError>,
    domain: &str,
    server: Option<&str>,
) -> ExpirationReport
where
    P: ExpiryProbe,
{
    let result = match probe {
        Ok(probe) => probe.probe(domain, server).await,
        Err(e) => Err(e),
    };

    ExpirationReport::from_probe(domain, &result)
}
