//! ACME issuance over DNS-01
//!
//! The issuance flow only sees the [`AcmeClient`] and [`DnsProvider`] traits,
//! created through an [`AcmeConnector`]. [`LetsEncryptConnector`] wires the
//! concrete Let's Encrypt client and the Route53 provider.

mod client;
mod error;
mod route53;

pub use client::{AcmeSettings, LetsEncryptClient};
pub use error::{AcmeError, DnsProviderError, DnsResult};
pub use route53::{Route53Provider, Route53Settings};

use crate::config::{Config, DnsCredentials};
use crate::store::KeyMaterial;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Label prepended to a domain for its DNS-01 validation record
pub const ACME_CHALLENGE_LABEL: &str = "_acme-challenge";

/// `_acme-challenge.<domain>`; a leading `*.` is dropped so a wildcard and its
/// base name share one record
pub fn challenge_record_name(domain: &str) -> String {
    let base = domain.strip_prefix("*.").unwrap_or(domain);
    format!("{}.{}", ACME_CHALLENGE_LABEL, base)
}

/// Everything an ACME client needs for one certificate order
#[derive(Debug, Clone)]
pub struct AcmeOrderRequest {
    /// Primary name, e.g. `*.example.com`
    pub domain_name: String,
    pub alt_names: Vec<String>,
    pub contact_email: String,
    pub account_key: KeyMaterial,
    pub certificate_key: KeyMaterial,
    /// Register the account instead of looking up an existing one
    pub new_account: bool,
}

impl AcmeOrderRequest {
    /// Primary name followed by the alternate names
    pub fn identifiers(&self) -> Vec<String> {
        std::iter::once(self.domain_name.clone())
            .chain(self.alt_names.iter().cloned())
            .collect()
    }
}

/// Drives a whole order and returns the PEM certificate chain
#[async_trait]
pub trait AcmeClient: Send + Sync {
    async fn request_certificate(&self) -> Result<String, AcmeError>;
}

/// Publishes and removes DNS-01 validation TXT records
#[async_trait]
pub trait DnsProvider: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Replace the TXT record set at `record_name` with `values` and return
    /// once the change has been applied
    async fn publish_validation_record(&self, record_name: &str, values: &[String])
        -> DnsResult<()>;

    /// Remove a record set previously published with the same values
    async fn remove_validation_record(&self, record_name: &str, values: &[String])
        -> DnsResult<()>;
}

/// Factory for the two collaborators of an issuance attempt
pub trait AcmeConnector: Send + Sync {
    fn dns_provider(
        &self,
        credentials: &DnsCredentials,
    ) -> Result<Arc<dyn DnsProvider>, DnsProviderError>;

    fn client(
        &self,
        request: AcmeOrderRequest,
        dns: Arc<dyn DnsProvider>,
    ) -> Result<Box<dyn AcmeClient>, AcmeError>;
}

/// Let's Encrypt (or any RFC 8555 directory) with Route53 DNS
#[derive(Debug, Clone)]
pub struct LetsEncryptConnector {
    acme: AcmeSettings,
    route53: Route53Settings,
}

impl LetsEncryptConnector {
    pub fn new(acme: AcmeSettings, route53: Route53Settings) -> Self {
        Self { acme, route53 }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(AcmeSettings::from(config), Route53Settings::from(&config.dns))
    }
}

impl AcmeConnector for LetsEncryptConnector {
    fn dns_provider(
        &self,
        credentials: &DnsCredentials,
    ) -> Result<Arc<dyn DnsProvider>, DnsProviderError> {
        let provider = Route53Provider::new(credentials.clone(), self.route53.clone())?;
        Ok(Arc::new(provider))
    }

    fn client(
        &self,
        request: AcmeOrderRequest,
        dns: Arc<dyn DnsProvider>,
    ) -> Result<Box<dyn AcmeClient>, AcmeError> {
        let client = LetsEncryptClient::new(self.acme.clone(), request, dns)?;
        Ok(Box::new(client))
    }
}
