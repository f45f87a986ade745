//! Decide whether a domain needs a new certificate

use crate::tls::{ExpiryProbe, ProbeError};
use tracing::{info, warn};

/// Why issuance should or should not go ahead
#[derive(Debug)]
pub enum RenewalDecision {
    /// No threshold configured; the endpoint was not contacted
    Unconditional,
    /// The probe failed, so the certificate is assumed to need replacing
    ProbeFailed(ProbeError),
    DueForRenewal { expires_in_days: i64 },
    StillValid { expires_in_days: i64 },
}

impl RenewalDecision {
    pub fn should_issue(&self) -> bool {
        !matches!(self, RenewalDecision::StillValid { .. })
    }
}

/// Probe `domain` at most once and classify the result against `threshold_days`.
/// A threshold of zero skips the probe entirely.
pub async fn decide<P>(
    probe: &P,
    domain: &str,
    threshold_days: u32,
    server: Option<&str>,
) -> RenewalDecision
where
    P: ExpiryProbe + ?Sized,
{
    if threshold_days == 0 {
        return RenewalDecision::Unconditional;
    }

    match probe.probe(domain, server).await {
        Ok(expiry) if expiry.expires_in_days > i64::from(threshold_days) => {
            info!(
                domain = %domain,
                days = expiry.expires_in_days,
                threshold = threshold_days,
                "Certificate still valid, skipping renewal"
            );
            RenewalDecision::StillValid {
                expires_in_days: expiry.expires_in_days,
            }
        }
        Ok(expiry) => {
            info!(
                domain = %domain,
                days = expiry.expires_in_days,
                threshold = threshold_days,
                "Certificate due for renewal"
            );
            RenewalDecision::DueForRenewal {
                expires_in_days: expiry.expires_in_days,
            }
        }
        Err(e) => {
            warn!(domain = %domain, error = %e, "Expiration check failed, renewing anyway");
            RenewalDecision::ProbeFailed(e)
        }
    }
}

pub async fn should_issue<P>(
    probe: &P,
    domain: &str,
    threshold_days: u32,
    server: Option<&str>,
) -> bool
where
    P: ExpiryProbe + ?Sized,
{
    decide(probe, domain, threshold_days, server)
        .await
        .should_issue()
}
