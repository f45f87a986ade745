use super::{challenge_record_name, AcmeClient, AcmeError, AcmeOrderRequest, DnsProvider};
use crate::config::Config;
use crate::store::{KeyError, KeyMaterial};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct AcmeSettings {
    pub directory_url: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    pub poll_interval: Duration,
    pub poll_attempts: u32,
    /// Settle time between publishing TXT records and asking the CA to validate
    pub propagation_delay: Duration,
}

impl From<&Config> for AcmeSettings {
    fn from(config: &Config) -> Self {
        Self {
            directory_url: config.acme.directory_url().to_string(),
            request_timeout: config.acme.timeout.as_std(),
            poll_interval: config.acme.poll_interval.as_std(),
            poll_attempts: config.acme.poll_attempts,
            propagation_delay: config.dns.propagation_delay.as_std(),
        }
    }
}

/// ACME Directory endpoints
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Directory {
    new_nonce: String,
    new_account: String,
    new_order: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Order {
    status: String,
    #[serde(default)]
    authorizations: Vec<String>,
    finalize: String,
    certificate: Option<String>,
    error: Option<Problem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Identifier {
    #[serde(rename = "type")]
    id_type: String,
    value: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Authorization {
    identifier: Identifier,
    status: String,
    #[serde(default)]
    challenges: Vec<Challenge>,
    #[serde(default)]
    wildcard: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct Challenge {
    #[serde(rename = "type")]
    challenge_type: String,
    url: String,
    #[serde(default)]
    token: String,
    status: String,
    error: Option<Problem>,
}

/// RFC 7807 problem document
#[derive(Debug, Clone, Default, Deserialize)]
struct Problem {
    #[serde(rename = "type")]
    problem_type: Option<String>,
    detail: Option<String>,
}

impl Problem {
    fn describe(&self) -> String {
        match (&self.problem_type, &self.detail) {
            (Some(t), Some(d)) => format!("{} ({})", d, t),
            (None, Some(d)) => d.clone(),
            (Some(t), None) => t.clone(),
            (None, None) => "no details".to_string(),
        }
    }
}

/// A DNS-01 challenge awaiting validation
#[derive(Debug, Clone)]
struct PendingChallenge {
    identifier: String,
    record_name: String,
    value: String,
    url: String,
}

/// Directory plus the account URL used as JWS `kid`
struct Account {
    directory: Directory,
    kid: String,
}

/// RFC 8555 client that validates every identifier with DNS-01.
///
/// The account and certificate keys come from the caller; nothing is written
/// to disk here.
pub struct LetsEncryptClient {
    settings: AcmeSettings,
    http: reqwest::Client,
    request: AcmeOrderRequest,
    dns: Arc<dyn DnsProvider>,
}

impl LetsEncryptClient {
    pub fn new(
        settings: AcmeSettings,
        request: AcmeOrderRequest,
        dns: Arc<dyn DnsProvider>,
    ) -> Result<Self, AcmeError> {
        if !is_valid_email(&request.contact_email) {
            return Err(AcmeError::InvalidContact(request.contact_email));
        }

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(AcmeError::HttpClient)?;

        Ok(Self {
            settings,
            http,
            request,
            dns,
        })
    }

    async fn fetch_directory(&self) -> Result<Directory, AcmeError> {
        let url = &self.settings.directory_url;
        info!("Fetching ACME directory from {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AcmeError::Directory(e.to_string()))?;

        check_response(response)
            .await?
            .json()
            .await
            .map_err(|e| AcmeError::Directory(e.to_string()))
    }

    async fn fetch_nonce(&self, directory: &Directory) -> Result<String, AcmeError> {
        let response = self
            .http
            .head(&directory.new_nonce)
            .send()
            .await
            .map_err(|source| AcmeError::Http {
                url: directory.new_nonce.clone(),
                source,
            })?;

        header(&response, "replay-nonce").ok_or_else(|| AcmeError::Protocol {
            status: response.status().as_u16(),
            problem_type: None,
            detail: "no Replay-Nonce header in response".to_string(),
        })
    }

    /// Signed POST with a fresh nonce. A `badNonce` rejection is retried once.
    async fn post(
        &self,
        directory: &Directory,
        url: &str,
        payload: Option<&Value>,
        kid: Option<&str>,
    ) -> Result<reqwest::Response, AcmeError> {
        let mut retried = false;

        loop {
            let nonce = self.fetch_nonce(directory).await?;
            let body = sign_jws(&self.request.account_key, url, &nonce, payload, kid)?;

            let response = self
                .http
                .post(url)
                .header(reqwest::header::CONTENT_TYPE, "application/jose+json")
                .json(&body)
                .send()
                .await
                .map_err(|source| AcmeError::Http {
                    url: url.to_string(),
                    source,
                })?;

            match check_response(response).await {
                Err(e) if e.is_bad_nonce() && !retried => {
                    debug!(url = %url, "Nonce rejected, retrying");
                    retried = true;
                }
                result => return result,
            }
        }
    }

    /// POST-as-GET for a resource owned by the account
    async fn fetch<T: DeserializeOwned>(&self, account: &Account, url: &str) -> Result<T, AcmeError> {
        self.post(&account.directory, url, None, Some(&account.kid))
            .await?
            .json()
            .await
            .map_err(|source| AcmeError::Http {
                url: url.to_string(),
                source,
            })
    }

    async fn open_account(&self, directory: Directory) -> Result<Account, AcmeError> {
        let payload = if self.request.new_account {
            info!(contact = %self.request.contact_email, "Registering ACME account");
            json!({
                "termsOfServiceAgreed": true,
                "contact": [format!("mailto:{}", self.request.contact_email)],
            })
        } else {
            info!("Using existing ACME account");
            json!({ "onlyReturnExisting": true })
        };

        let response = self
            .post(&directory, &directory.new_account, Some(&payload), None)
            .await
            .map_err(|e| match e {
                AcmeError::Protocol { detail, .. } => AcmeError::Account(detail),
                other => other,
            })?;

        let kid = header(&response, "location")
            .ok_or_else(|| AcmeError::Account("no account URL in response".to_string()))?;

        debug!(account = %kid, "ACME account ready");
        Ok(Account { directory, kid })
    }

    async fn create_order(&self, account: &Account) -> Result<(String, Order), AcmeError> {
        let domains = self.request.identifiers();
        info!("Ordering certificate for domains: {:?}", domains);

        let identifiers: Vec<Identifier> = domains
            .into_iter()
            .map(|value| Identifier {
                id_type: "dns".to_string(),
                value,
            })
            .collect();

        let response = self
            .post(
                &account.directory,
                &account.directory.new_order,
                Some(&json!({ "identifiers": identifiers })),
                Some(&account.kid),
            )
            .await?;

        let order_url = header(&response, "location")
            .ok_or_else(|| AcmeError::Order("no order URL in response".to_string()))?;

        let order: Order = response.json().await.map_err(|source| AcmeError::Http {
            url: order_url.clone(),
            source,
        })?;

        debug!("Order created: {:?}", order);
        Ok((order_url, order))
    }

    /// Fetch every authorization and compute the TXT value for each pending one
    async fn collect_challenges(
        &self,
        account: &Account,
        order: &Order,
    ) -> Result<Vec<PendingChallenge>, AcmeError> {
        let mut pending = Vec::new();

        for authz_url in &order.authorizations {
            let authz: Authorization = self.fetch(account, authz_url).await?;
            let identifier = if authz.wildcard {
                format!("*.{}", authz.identifier.value)
            } else {
                authz.identifier.value.clone()
            };

            match authz.status.as_str() {
                "valid" => {
                    debug!("Authorization already valid for {}", identifier);
                    continue;
                }
                "pending" => {}
                status => {
                    return Err(AcmeError::Challenge {
                        identifier,
                        detail: format!("authorization is {}", status),
                    });
                }
            }

            let challenge = authz
                .challenges
                .iter()
                .find(|c| c.challenge_type == "dns-01")
                .ok_or_else(|| AcmeError::Challenge {
                    identifier: identifier.clone(),
                    detail: "no dns-01 challenge offered".to_string(),
                })?;

            let key_auth = key_authorization(&challenge.token, &self.request.account_key)?;

            pending.push(PendingChallenge {
                record_name: challenge_record_name(&authz.identifier.value),
                value: dns01_value(&key_auth),
                url: challenge.url.clone(),
                identifier,
            });
        }

        Ok(pending)
    }

    async fn validate(
        &self,
        account: &Account,
        challenges: &[PendingChallenge],
        records: &BTreeMap<String, Vec<String>>,
    ) -> Result<(), AcmeError> {
        if challenges.is_empty() {
            return Ok(());
        }

        for (record_name, values) in records {
            info!(
                provider = self.dns.name(),
                record = %record_name,
                values = values.len(),
                "Publishing DNS-01 validation record"
            );
            self.dns.publish_validation_record(record_name, values).await?;
        }

        let delay = self.settings.propagation_delay;
        if !delay.is_zero() {
            debug!("Waiting {:?} for DNS propagation", delay);
            tokio::time::sleep(delay).await;
        }

        for challenge in challenges {
            debug!("Requesting validation of {}", challenge.identifier);
            self.post(
                &account.directory,
                &challenge.url,
                Some(&json!({})),
                Some(&account.kid),
            )
            .await?;
        }

        for challenge in challenges {
            self.wait_for_challenge_valid(account, challenge).await?;
        }

        Ok(())
    }

    /// Best effort; failures are logged and do not affect the order
    async fn cleanup(&self, records: &BTreeMap<String, Vec<String>>) {
        for (record_name, values) in records {
            if let Err(e) = self.dns.remove_validation_record(record_name, values).await {
                warn!(record = %record_name, error = %e, "Failed to remove validation record");
            }
        }
    }

    async fn wait_for_challenge_valid(
        &self,
        account: &Account,
        pending: &PendingChallenge,
    ) -> Result<(), AcmeError> {
        let attempts = self.settings.poll_attempts;

        for i in 0..attempts {
            tokio::time::sleep(self.settings.poll_interval).await;

            let challenge: Challenge = self.fetch(account, &pending.url).await?;

            match challenge.status.as_str() {
                "valid" => {
                    info!("Validated {}", pending.identifier);
                    return Ok(());
                }
                "invalid" => {
                    return Err(AcmeError::Challenge {
                        identifier: pending.identifier.clone(),
                        detail: challenge
                            .error
                            .map(|p| p.describe())
                            .unwrap_or_else(|| "challenge marked invalid".to_string()),
                    });
                }
                status => {
                    debug!("Challenge status: {}, attempt {}/{}", status, i + 1, attempts);
                }
            }
        }

        Err(AcmeError::Timeout(format!(
            "validation of {}",
            pending.identifier
        )))
    }

    /// Poll the order until it reaches `target`. A `valid` order must also
    /// carry a certificate URL.
    async fn wait_for_order(
        &self,
        account: &Account,
        url: &str,
        mut order: Order,
        target: &str,
    ) -> Result<Order, AcmeError> {
        let attempts = self.settings.poll_attempts;
        let mut attempt = 0;

        loop {
            let status = order.status.clone();
            match status.as_str() {
                "valid" if target == "valid" && order.certificate.is_some() => return Ok(order),
                s if s == target && target != "valid" => return Ok(order),
                "invalid" => {
                    return Err(AcmeError::Order(
                        order
                            .error
                            .map(|p| p.describe())
                            .unwrap_or_else(|| "order became invalid".to_string()),
                    ));
                }
                status => {
                    debug!("Order status: {}, attempt {}/{}", status, attempt, attempts);
                }
            }

            attempt += 1;
            if attempt > attempts {
                return Err(AcmeError::Timeout(format!("order to become {}", target)));
            }

            tokio::time::sleep(self.settings.poll_interval).await;
            order = self.fetch(account, url).await?;
        }
    }

    async fn finalize(&self, account: &Account, order: &Order) -> Result<Order, AcmeError> {
        let csr = build_csr(&self.request)?;
        let payload = json!({ "csr": URL_SAFE_NO_PAD.encode(csr) });

        let response = self
            .post(&account.directory, &order.finalize, Some(&payload), Some(&account.kid))
            .await
            .map_err(|e| match e {
                AcmeError::Protocol { detail, .. } => AcmeError::Finalization(detail),
                other => other,
            })?;

        response.json().await.map_err(|source| AcmeError::Http {
            url: order.finalize.clone(),
            source,
        })
    }
}

#[async_trait]
impl AcmeClient for LetsEncryptClient {
    async fn request_certificate(&self) -> Result<String, AcmeError> {
        let directory = self.fetch_directory().await?;
        let account = self.open_account(directory).await?;
        let (order_url, order) = self.create_order(&account).await?;

        let challenges = self.collect_challenges(&account, &order).await?;
        let records = group_records(&challenges);

        let validated = self.validate(&account, &challenges, &records).await;
        self.cleanup(&records).await;
        validated?;

        let order = self.wait_for_order(&account, &order_url, order, "ready").await?;
        let order = self.finalize(&account, &order).await?;
        let order = self.wait_for_order(&account, &order_url, order, "valid").await?;

        let cert_url = order
            .certificate
            .ok_or_else(|| AcmeError::Finalization("no certificate URL in order".to_string()))?;

        let chain = self
            .post(&account.directory, &cert_url, None, Some(&account.kid))
            .await?
            .text()
            .await
            .map_err(|source| AcmeError::Http {
                url: cert_url.clone(),
                source,
            })?;

        info!("Certificate issued for {}", self.request.domain_name);
        Ok(chain)
    }
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AcmeError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let problem: Problem = serde_json::from_str(&body).unwrap_or_default();

    Err(AcmeError::Protocol {
        status: status.as_u16(),
        problem_type: problem.problem_type,
        detail: problem.detail.unwrap_or(body),
    })
}

fn header(response: &reqwest::Response, name: &str) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

/// TXT values grouped by record name; a wildcard and its base name share one record
fn group_records(challenges: &[PendingChallenge]) -> BTreeMap<String, Vec<String>> {
    let mut records: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for challenge in challenges {
        let values = records.entry(challenge.record_name.clone()).or_default();
        if !values.contains(&challenge.value) {
            values.push(challenge.value.clone());
        }
    }
    records
}

/// base64url x and y of the account public key
fn coordinates(key: &KeyMaterial) -> Result<(String, String), AcmeError> {
    let public = key.public_key()?;
    let n = key.algorithm().coordinate_len();

    if public.len() != 1 + 2 * n || public[0] != 0x04 {
        return Err(KeyError::Rejected("unexpected public key encoding".to_string()).into());
    }

    Ok((
        URL_SAFE_NO_PAD.encode(&public[1..=n]),
        URL_SAFE_NO_PAD.encode(&public[1 + n..]),
    ))
}

fn jwk(key: &KeyMaterial) -> Result<Value, AcmeError> {
    let (x, y) = coordinates(key)?;
    Ok(json!({
        "crv": key.algorithm().curve(),
        "kty": "EC",
        "x": x,
        "y": y,
    }))
}

/// RFC 7638 thumbprint: members in lexicographic order, no whitespace
fn thumbprint(key: &KeyMaterial) -> Result<String, AcmeError> {
    let (x, y) = coordinates(key)?;
    let canonical = format!(
        r#"{{"crv":"{}","kty":"EC","x":"{}","y":"{}"}}"#,
        key.algorithm().curve(),
        x,
        y
    );
    let digest = ring::digest::digest(&ring::digest::SHA256, canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest.as_ref()))
}

fn key_authorization(token: &str, key: &KeyMaterial) -> Result<String, AcmeError> {
    Ok(format!("{}.{}", token, thumbprint(key)?))
}

/// TXT record content: base64url(SHA-256(key authorization))
fn dns01_value(key_authorization: &str) -> String {
    let digest = ring::digest::digest(&ring::digest::SHA256, key_authorization.as_bytes());
    URL_SAFE_NO_PAD.encode(digest.as_ref())
}

/// Flattened JWS. Uses `kid` when an account URL is known, otherwise embeds the JWK.
fn sign_jws(
    key: &KeyMaterial,
    url: &str,
    nonce: &str,
    payload: Option<&Value>,
    kid: Option<&str>,
) -> Result<Value, AcmeError> {
    let mut protected = json!({
        "alg": key.algorithm().jws_algorithm(),
        "nonce": nonce,
        "url": url,
    });

    match kid {
        Some(kid) => protected["kid"] = Value::String(kid.to_string()),
        None => protected["jwk"] = jwk(key)?,
    }

    let protected_b64 = URL_SAFE_NO_PAD.encode(protected.to_string());
    let payload_b64 = payload
        .map(|p| URL_SAFE_NO_PAD.encode(p.to_string()))
        .unwrap_or_default();

    let signing_input = format!("{}.{}", protected_b64, payload_b64);
    let signature = key.sign(signing_input.as_bytes())?;

    Ok(json!({
        "protected": protected_b64,
        "payload": payload_b64,
        "signature": URL_SAFE_NO_PAD.encode(signature),
    }))
}

/// DER CSR for every identifier, signed with the certificate key
fn build_csr(request: &AcmeOrderRequest) -> Result<Vec<u8>, AcmeError> {
    let key_pair = rcgen::KeyPair::from_pem(&request.certificate_key.to_pem())?;

    let mut params = rcgen::CertificateParams::new(request.identifiers())?;
    let mut subject = rcgen::DistinguishedName::new();
    subject.push(rcgen::DnType::CommonName, request.domain_name.as_str());
    params.distinguished_name = subject;

    let csr = params.serialize_request(&key_pair)?;
    Ok(csr.der().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyAlgorithm;
    use ring::signature::{UnparsedPublicKey, ECDSA_P256_SHA256_FIXED, ECDSA_P384_SHA384_FIXED};

    fn decode(b64: &str) -> Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(b64).unwrap()).unwrap()
    }

    fn request(email: &str) -> AcmeOrderRequest {
        AcmeOrderRequest {
            domain_name: "*.example.com".to_string(),
            alt_names: vec!["example.com".to_string()],
            contact_email: email.to_string(),
            account_key: KeyMaterial::generate(KeyAlgorithm::EcdsaP256).unwrap(),
            certificate_key: KeyMaterial::generate(KeyAlgorithm::EcdsaP256).unwrap(),
            new_account: true,
        }
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("info@example.com"));
        assert!(is_valid_email("ops+certs@sub.example.co.uk"));
        assert!(!is_valid_email("example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("info@localhost"));
        assert!(!is_valid_email("info@@example.com"));
        assert!(!is_valid_email("info @example.com"));
        assert!(!is_valid_email("info@example.com."));
    }

    #[test]
    fn test_jws_with_embedded_jwk_verifies() {
        for (algorithm, verify_alg) in [
            (KeyAlgorithm::EcdsaP256, &ECDSA_P256_SHA256_FIXED),
            (KeyAlgorithm::EcdsaP384, &ECDSA_P384_SHA384_FIXED),
        ] {
            let key = KeyMaterial::generate(algorithm).unwrap();
            let payload = json!({ "termsOfServiceAgreed": true });
            let jws = sign_jws(&key, "https://ca/new-acct", "nonce-1", Some(&payload), None)
                .unwrap();

            let protected = decode(jws["protected"].as_str().unwrap());
            assert_eq!(protected["alg"], algorithm.jws_algorithm());
            assert_eq!(protected["nonce"], "nonce-1");
            assert_eq!(protected["url"], "https://ca/new-acct");
            assert_eq!(protected["jwk"]["crv"], algorithm.curve());
            assert!(protected.get("kid").is_none());
            assert_eq!(decode(jws["payload"].as_str().unwrap()), payload);

            let signing_input = format!(
                "{}.{}",
                jws["protected"].as_str().unwrap(),
                jws["payload"].as_str().unwrap()
            );
            let signature = URL_SAFE_NO_PAD
                .decode(jws["signature"].as_str().unwrap())
                .unwrap();
            UnparsedPublicKey::new(verify_alg, key.public_key().unwrap())
                .verify(signing_input.as_bytes(), &signature)
                .unwrap();
        }
    }

    #[test]
    fn test_post_as_get_uses_kid_and_empty_payload() {
        let key = KeyMaterial::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let jws = sign_jws(&key, "https://ca/order/1", "n", None, Some("https://ca/acct/7")).unwrap();

        assert_eq!(jws["payload"], "");
        let protected = decode(jws["protected"].as_str().unwrap());
        assert_eq!(protected["kid"], "https://ca/acct/7");
        assert!(protected.get("jwk").is_none());
    }

    #[test]
    fn test_thumbprint_matches_serialized_jwk() {
        let key = KeyMaterial::generate(KeyAlgorithm::EcdsaP256).unwrap();
        let jwk_json = serde_json::to_string(&jwk(&key).unwrap()).unwrap();
        let expected = URL_SAFE_NO_PAD.encode(
            ring::digest::digest(&ring::digest::SHA256, jwk_json.as_bytes()).as_ref(),
        );

        let thumb = thumbprint(&key).unwrap();
        assert_eq!(thumb, expected);
        assert_eq!(thumb.len(), 43);

        let auth = key_authorization("token-abc", &key).unwrap();
        assert_eq!(auth, format!("token-abc.{}", thumb));
    }

    #[test]
    fn test_dns01_value() {
        assert_eq!(dns01_value("abc"), "ungWv48Bz-pBQUDeXa4iI7ADYaOWF3qctBD_YfIAFa0");
    }

    #[test]
    fn test_group_records_shares_wildcard_record() {
        let pending = |identifier: &str, value: &str| PendingChallenge {
            identifier: identifier.to_string(),
            record_name: challenge_record_name(identifier),
            value: value.to_string(),
            url: format!("https://ca/chall/{}", value),
        };

        let records = group_records(&[
            pending("*.example.com", "aaa"),
            pending("example.com", "bbb"),
            pending("www.other.org", "ccc"),
        ]);

        assert_eq!(records.len(), 2);
        assert_eq!(records["_acme-challenge.example.com"], vec!["aaa", "bbb"]);
        assert_eq!(records["_acme-challenge.www.other.org"], vec!["ccc"]);
    }

    #[test]
    fn test_build_csr_covers_all_identifiers() {
        use x509_parser::prelude::*;

        let request = request("info@example.com");
        let der = build_csr(&request).unwrap();

        let (_, csr) = X509CertificationRequest::from_der(&der).unwrap();
        let cn = csr
            .certification_request_info
            .subject
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap();
        assert_eq!(cn, "*.example.com");

        let mut names = Vec::new();
        for ext in csr.requested_extensions().into_iter().flatten() {
            if let ParsedExtension::SubjectAlternativeName(san) = ext {
                for name in &san.general_names {
                    if let GeneralName::DNSName(dns) = name {
                        names.push(dns.to_string());
                    }
                }
            }
        }
        assert_eq!(names, vec!["*.example.com", "example.com"]);
    }

    #[test]
    fn test_problem_describe() {
        let problem: Problem = serde_json::from_str(
            r#"{"type":"urn:ietf:params:acme:error:dns","detail":"NXDOMAIN looking up TXT"}"#,
        )
        .unwrap();
        assert_eq!(
            problem.describe(),
            "NXDOMAIN looking up TXT (urn:ietf:params:acme:error:dns)"
        );
    }
}
