use crate::store::KeyError;
use std::time::Duration;

/// Result type for DNS provider operations
pub type DnsResult<T> = Result<T, DnsProviderError>;

#[derive(Debug, thiserror::Error)]
pub enum DnsProviderError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("No hosted zone found for '{domain}'")]
    ZoneNotFound { domain: String },

    #[error("API request failed: {0}")]
    ApiRequest(String),

    #[error("Change {change_id} not in sync after {elapsed:?}")]
    Timeout { change_id: String, elapsed: Duration },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AcmeError {
    #[error("Invalid contact email '{0}'")]
    InvalidContact(String),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to fetch ACME directory: {0}")]
    Directory(String),

    #[error("Account lookup failed: {0}")]
    Account(String),

    #[error("Order failed: {0}")]
    Order(String),

    #[error("Challenge for {identifier} failed: {detail}")]
    Challenge { identifier: String, detail: String },

    #[error("Finalization failed: {0}")]
    Finalization(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Server returned {status}: {detail}")]
    Protocol {
        status: u16,
        problem_type: Option<String>,
        detail: String,
    },

    #[error("Failed to build CSR: {0}")]
    Csr(#[from] rcgen::Error),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Dns(#[from] DnsProviderError),
}

impl AcmeError {
    /// True for the `badNonce` problem, which is answered by retrying with a fresh nonce
    pub fn is_bad_nonce(&self) -> bool {
        matches!(
            self,
            AcmeError::Protocol { problem_type: Some(t), .. }
                if t == "urn:ietf:params:acme:error:badNonce"
        )
    }
}
