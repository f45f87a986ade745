//! Issuance orchestration: keys, DNS provider, ACME client, persistence

use crate::acme::{AcmeConnector, AcmeError, AcmeOrderRequest, DnsProviderError};
use crate::config::DnsCredentials;
use crate::store::{KeyAlgorithm, KeyStore, StoreError};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("AWS_ACCESS_KEY_ID and/or AWS_SECRET_ACCESS_KEY not set; Route53 credentials are required")]
    MissingDnsCredentials,

    #[error("Failed to load account keys: {0}")]
    Store(#[source] StoreError),

    #[error("Failed to set up DNS provider: {0}")]
    DnsProvider(#[from] DnsProviderError),

    #[error("Failed to set up certificate request: {0}")]
    AcmeSetup(#[source] AcmeError),

    #[error("Failed to request certificate from Let's Encrypt: {0}")]
    Acme(#[source] AcmeError),

    #[error("Certificate issued but saving keys failed: {0}")]
    Persist(#[source] StoreError),
}

#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    /// Requested name, possibly with a leading "www."
    pub domain: String,
    /// Defaults to `info@<naked domain>`
    pub contact_email: Option<String>,
    /// Sentinel path the key file names are derived from
    pub key_file: PathBuf,
    pub key_algorithm: KeyAlgorithm,
    pub dns_credentials: Option<DnsCredentials>,
}

#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub domain: String,
    pub naked_domain: String,
    /// Certificate chain followed by the certificate private key
    pub pem: String,
    pub new_account: bool,
}

/// `domain` without one leading "www."
pub fn naked_domain(domain: &str) -> &str {
    domain.strip_prefix("www.").unwrap_or(domain)
}

pub fn default_contact_email(naked_domain: &str) -> String {
    format!("info@{}", naked_domain)
}

pub struct Issuer<C> {
    connector: C,
}

impl<C: AcmeConnector> Issuer<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }

    /// Obtain a wildcard certificate for the naked domain plus the naked domain
    /// itself. Keys are written only after the CA has returned a certificate.
    pub async fn issue(&self, request: &IssuanceRequest) -> Result<IssuedCertificate, IssueError> {
        let credentials = request.dns_credentials.as_ref().ok_or_else(|| {
            warn!(domain = %request.domain, "DNS provider credentials not set");
            IssueError::MissingDnsCredentials
        })?;

        let store =
            KeyStore::new(&request.key_file, request.key_algorithm).map_err(IssueError::Store)?;
        let keys = store.load().map_err(IssueError::Store)?;

        let dns = self.connector.dns_provider(credentials)?;

        let naked = naked_domain(&request.domain).to_string();
        let contact_email = request
            .contact_email
            .clone()
            .filter(|email| !email.is_empty())
            .unwrap_or_else(|| default_contact_email(&naked));

        info!(domain = %naked, "Making a certificate request for {}", naked);

        let order = AcmeOrderRequest {
            domain_name: format!("*.{}", naked),
            alt_names: vec![naked.clone()],
            contact_email,
            account_key: keys.account_key.clone(),
            certificate_key: keys.certificate_key.clone(),
            new_account: keys.new_account,
        };

        let client = self
            .connector
            .client(order, dns)
            .map_err(IssueError::AcmeSetup)?;

        info!(domain = %naked, "Requesting certificate for {}", naked);
        let chain = client
            .request_certificate()
            .await
            .map_err(IssueError::Acme)?;

        let mut pem = chain;
        if !pem.ends_with('\n') {
            pem.push('\n');
        }
        pem.push_str(&keys.certificate_key.to_pem());

        store.persist(&keys).map_err(IssueError::Persist)?;
        if keys.new_account {
            info!(
                account_key = %store.paths().account_key.display(),
                "New account keys saved; create {} to reuse them",
                store.paths().sentinel.display()
            );
        }

        Ok(IssuedCertificate {
            domain: request.domain.clone(),
            naked_domain: naked,
            pem,
            new_account: keys.new_account,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{credentials, FakeConnector, CHAIN};
    use super::*;
    use crate::output::{deliver, Destination};
    use crate::store::KeyMaterial;
    use std::fs;
    use std::sync::atomic::Ordering;

    fn request(domain: &str, key_file: PathBuf) -> IssuanceRequest {
        IssuanceRequest {
            domain: domain.to_string(),
            contact_email: None,
            key_file,
            key_algorithm: KeyAlgorithm::EcdsaP256,
            dns_credentials: credentials(),
        }
    }

    #[test]
    fn test_naked_domain() {
        assert_eq!(naked_domain("www.example.com"), "example.com");
        assert_eq!(naked_domain("example.com"), "example.com");
        assert_eq!(naked_domain("www.www.example.com"), "www.example.com");
        assert_eq!(naked_domain("WWW.example.com"), "WWW.example.com");
        assert_eq!(naked_domain("wwwexample.com"), "wwwexample.com");

        for domain in ["www.example.com", "example.com", "shop.www.example.com", "www"] {
            let expected = if domain.starts_with("www.") { &domain[4..] } else { domain };
            assert_eq!(naked_domain(domain), expected);
        }
    }

    #[test]
    fn test_default_contact_email() {
        assert_eq!(default_contact_email("example.com"), "info@example.com");
        assert_eq!(
            default_contact_email(naked_domain("www.example.org")),
            "info@example.org"
        );
    }

    #[tokio::test]
    async fn test_issue_persists_keys_and_delivers_pem() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir(&out).unwrap();

        let connector = FakeConnector::new(Ok(CHAIN));
        let issuer = Issuer::new(connector.clone());
        let issued = issuer
            .issue(&request("www.example.com", dir.path().join(".lets_encrypt.pem")))
            .await
            .unwrap();

        assert_eq!(issued.domain, "www.example.com");
        assert_eq!(issued.naked_domain, "example.com");
        assert!(issued.new_account);

        let order = connector.orders.lock().unwrap()[0].clone();
        assert_eq!(order.domain_name, "*.example.com");
        assert_eq!(order.alt_names, vec!["example.com"]);
        assert_eq!(order.contact_email, "info@example.com");
        assert!(order.new_account);

        let account_path = dir.path().join(".lets_encrypt_account.pem");
        let certificate_path = dir.path().join(".lets_encrypt_certificate.pem");
        let account = KeyMaterial::from_pem(&fs::read_to_string(&account_path).unwrap()).unwrap();
        let certificate =
            KeyMaterial::from_pem(&fs::read_to_string(&certificate_path).unwrap()).unwrap();
        assert_eq!(account, order.account_key);
        assert_eq!(certificate, order.certificate_key);
        assert!(!dir.path().join(".lets_encrypt.pem").exists());

        assert!(issued.pem.starts_with(CHAIN));
        assert!(issued.pem.ends_with(&certificate.to_pem()));

        deliver(
            &issued.pem,
            &issued.naked_domain,
            &Destination::Directory(out.clone()),
        )
        .unwrap();
        assert_eq!(
            fs::read_to_string(out.join("example.com.pem")).unwrap(),
            issued.pem
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_touch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(Ok(CHAIN));
        let issuer = Issuer::new(connector.clone());

        let mut request = request("www.example.com", dir.path().join("le.pem"));
        request.dns_credentials = None;

        assert!(matches!(
            issuer.issue(&request).await,
            Err(IssueError::MissingDnsCredentials)
        ));
        assert_eq!(connector.collaborator_calls(), 0);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_request_discards_new_keys() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FakeConnector::new(Err("rate limited"));
        let issuer = Issuer::new(connector.clone());

        let result = issuer
            .issue(&request("example.com", dir.path().join("le.pem")))
            .await;

        assert!(matches!(result, Err(IssueError::Acme(_))));
        assert_eq!(connector.requests.load(Ordering::SeqCst), 1);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_existing_keys_are_reused() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("le.pem");

        let store = KeyStore::new(&key_file, KeyAlgorithm::EcdsaP256).unwrap();
        let existing = store.load().unwrap();
        store.persist(&existing).unwrap();
        fs::write(&key_file, b"").unwrap();

        let connector = FakeConnector::new(Ok(CHAIN));
        let issuer = Issuer::new(connector.clone());
        let mut request = request("example.com", key_file);
        request.contact_email = Some("ops@example.net".to_string());

        let issued = issuer.issue(&request).await.unwrap();
        assert!(!issued.new_account);

        let order = connector.orders.lock().unwrap()[0].clone();
        assert!(!order.new_account);
        assert_eq!(order.contact_email, "ops@example.net");
        assert_eq!(order.account_key, existing.account_key);
        assert_eq!(order.certificate_key, existing.certificate_key);
    }

    #[tokio::test]
    async fn test_corrupt_keys_abort_before_network() {
        let dir = tempfile::tempdir().unwrap();
        let key_file = dir.path().join("le.pem");
        fs::write(&key_file, b"").unwrap();
        fs::write(dir.path().join("le_account.pem"), "garbage").unwrap();
        fs::write(dir.path().join("le_certificate.pem"), "garbage").unwrap();

        let connector = FakeConnector::new(Ok(CHAIN));
        let issuer = Issuer::new(connector.clone());

        assert!(matches!(
            issuer.issue(&request("example.com", key_file)).await,
            Err(IssueError::Store(_))
        ));
        assert_eq!(connector.collaborator_calls(), 0);
    }
}
