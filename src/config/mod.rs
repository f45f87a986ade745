pub mod duration;
mod types;

pub use duration::Duration;
pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

pub const ENV_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            serde_yml::from_str(&content).with_context(|| "Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Load the file when one is given, otherwise fall back to built-in defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.account_file.as_os_str().is_empty() {
            anyhow::bail!("account_file must not be empty");
        }

        url::Url::parse(self.acme.directory_url()).with_context(|| {
            format!("Invalid ACME directory URL: {}", self.acme.directory_url())
        })?;

        if self.acme.poll_attempts == 0 {
            anyhow::bail!("acme.poll_attempts must be at least 1");
        }

        if self.acme.timeout.is_zero() {
            anyhow::bail!("acme.timeout must be greater than zero");
        }

        if self.probe.port == 0 {
            anyhow::bail!("probe.port must not be 0");
        }

        if self.probe.connect_timeout.is_zero() || self.probe.handshake_timeout.is_zero() {
            anyhow::bail!("probe timeouts must be greater than zero");
        }

        if self.dns.ttl == 0 {
            anyhow::bail!("dns.ttl must be greater than zero");
        }

        Ok(())
    }
}

/// Credentials for the DNS provider used during DNS-01 validation
#[derive(Clone, PartialEq, Eq)]
pub struct DnsCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl DnsCredentials {
    /// Read the credentials from the process environment.
    /// Returns `None` when either required variable is unset or empty.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.is_empty());

        Some(Self {
            access_key_id: non_empty(ENV_ACCESS_KEY_ID)?,
            secret_access_key: non_empty(ENV_SECRET_ACCESS_KEY)?,
            session_token: non_empty(ENV_SESSION_TOKEN),
        })
    }
}

impl std::fmt::Debug for DnsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
