use super::Duration;
use crate::store::KeyAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const LETS_ENCRYPT_PRODUCTION: &str = "https://acme-v02.api.letsencrypt.org/directory";
pub const LETS_ENCRYPT_STAGING: &str = "https://acme-staging-v02.api.letsencrypt.org/directory";

/// Key file used when neither the config nor `--account` names one
pub const DEFAULT_ACCOUNT_FILE: &str = ".lets_encrypt.pem";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Sentinel path; the two key files are derived from it
    #[serde(default = "default_account_file")]
    pub account_file: PathBuf,

    #[serde(default)]
    pub key_algorithm: KeyAlgorithm,

    #[serde(default)]
    pub acme: AcmeConfig,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub renewal: RenewalConfig,

    #[serde(default)]
    pub dns: DnsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            account_file: default_account_file(),
            key_algorithm: KeyAlgorithm::default(),
            acme: AcmeConfig::default(),
            probe: ProbeConfig::default(),
            renewal: RenewalConfig::default(),
            dns: DnsConfig::default(),
        }
    }
}

fn default_account_file() -> PathBuf {
    PathBuf::from(DEFAULT_ACCOUNT_FILE)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcmeConfig {
    /// "production", "staging" or a full directory URL
    #[serde(default = "default_directory")]
    pub directory: String,

    /// Timeout for each HTTP request to the CA
    #[serde(default = "default_acme_timeout")]
    pub timeout: Duration,

    /// Delay between order/challenge status polls
    #[serde(default = "default_poll_interval")]
    pub poll_interval: Duration,

    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            timeout: default_acme_timeout(),
            poll_interval: default_poll_interval(),
            poll_attempts: default_poll_attempts(),
        }
    }
}

impl AcmeConfig {
    /// Resolve the "production"/"staging" aliases to a directory URL
    pub fn directory_url(&self) -> &str {
        match self.directory.as_str() {
            "production" => LETS_ENCRYPT_PRODUCTION,
            "staging" => LETS_ENCRYPT_STAGING,
            url => url,
        }
    }
}

fn default_directory() -> String {
    "production".to_string()
}

fn default_acme_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_poll_attempts() -> u32 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_port")]
    pub port: u16,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: Duration,

    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: default_probe_port(),
            connect_timeout: default_connect_timeout(),
            handshake_timeout: default_handshake_timeout(),
        }
    }
}

fn default_probe_port() -> u16 {
    443
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_handshake_timeout() -> Duration {
    Duration::from_secs(10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewalConfig {
    /// `renew` skips issuance while the live certificate has more days left than this.
    /// Zero disables the check.
    #[serde(default = "default_check_days")]
    pub check_days: u32,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            check_days: default_check_days(),
        }
    }
}

fn default_check_days() -> u32 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DnsConfig {
    /// TTL of the `_acme-challenge` TXT records, in seconds
    #[serde(default = "default_dns_ttl")]
    pub ttl: u32,

    /// How long to wait for the provider to report the change as applied
    #[serde(default = "default_propagation_timeout")]
    pub propagation_timeout: Duration,

    /// Extra settle time after the provider reports the change, before
    /// the CA is asked to validate
    #[serde(default = "default_propagation_delay")]
    pub propagation_delay: Duration,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            ttl: default_dns_ttl(),
            propagation_timeout: default_propagation_timeout(),
            propagation_delay: default_propagation_delay(),
        }
    }
}

fn default_dns_ttl() -> u32 {
    60
}

fn default_propagation_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_propagation_delay() -> Duration {
    Duration::from_secs(10)
}
