//! Amazon Route53 DNS provider
//!
//! Talks to the Route53 REST API (2013-04-01) directly, signing each request
//! with AWS Signature Version 4.

use super::error::{DnsProviderError, DnsResult};
use super::{DnsProvider, ACME_CHALLENGE_LABEL};
use crate::config::{DnsConfig, DnsCredentials};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::{Client, Method};
use ring::{digest, hmac};
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, trace};

const ROUTE53_ENDPOINT: &str = "https://route53.amazonaws.com";
const API_VERSION: &str = "2013-04-01";
const XML_NAMESPACE: &str = "https://route53.amazonaws.com/doc/2013-04-01/";

/// Route53 is a global service signed in us-east-1
const SIGNING_REGION: &str = "us-east-1";
const SIGNING_SERVICE: &str = "route53";

const CHANGE_POLL_INTERVAL: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct Route53Settings {
    pub endpoint: String,
    pub ttl: u32,
    /// Upper bound on waiting for a change to reach INSYNC
    pub propagation_timeout: Duration,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl Default for Route53Settings {
    fn default() -> Self {
        Self::from(&DnsConfig::default())
    }
}

impl From<&DnsConfig> for Route53Settings {
    fn from(config: &DnsConfig) -> Self {
        Self {
            endpoint: ROUTE53_ENDPOINT.to_string(),
            ttl: config.ttl,
            propagation_timeout: config.propagation_timeout.as_std(),
            poll_interval: CHANGE_POLL_INTERVAL,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeAction {
    Upsert,
    Delete,
}

impl ChangeAction {
    fn as_str(self) -> &'static str {
        match self {
            ChangeAction::Upsert => "UPSERT",
            ChangeAction::Delete => "DELETE",
        }
    }
}

#[derive(Debug)]
pub struct Route53Provider {
    client: Client,
    credentials: DnsCredentials,
    settings: Route53Settings,
    host: String,
    /// domain -> hosted zone id
    zone_cache: RwLock<HashMap<String, String>>,
}

impl Route53Provider {
    pub fn new(credentials: DnsCredentials, settings: Route53Settings) -> DnsResult<Self> {
        if credentials.access_key_id.is_empty() || credentials.secret_access_key.is_empty() {
            return Err(DnsProviderError::Configuration(
                "AWS access key id and secret access key are required".to_string(),
            ));
        }

        let endpoint = url::Url::parse(&settings.endpoint).map_err(|e| {
            DnsProviderError::Configuration(format!(
                "Invalid Route53 endpoint '{}': {}",
                settings.endpoint, e
            ))
        })?;
        let host = match (endpoint.host_str(), endpoint.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => {
                return Err(DnsProviderError::Configuration(format!(
                    "Route53 endpoint has no host: {}",
                    settings.endpoint
                )));
            }
        };

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| {
                DnsProviderError::Configuration(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            credentials,
            settings,
            host,
            zone_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Signed request against the API; returns the response body on 2xx
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
    ) -> DnsResult<String> {
        let canonical_query = canonical_query_string(query);
        let payload = body.as_deref().unwrap_or("");

        let signed = sign_request(
            &self.credentials,
            &SigningScope::route53(),
            method.as_str(),
            &self.host,
            path,
            &canonical_query,
            payload.as_bytes(),
            Utc::now(),
        );

        let mut url = format!("{}{}", self.settings.endpoint.trim_end_matches('/'), path);
        if !canonical_query.is_empty() {
            url.push('?');
            url.push_str(&canonical_query);
        }

        trace!(method = %method, url = %url, "Route53 request");

        let mut request = self
            .client
            .request(method, &url)
            .header("x-amz-date", &signed.amz_date)
            .header(reqwest::header::AUTHORIZATION, &signed.authorization);
        if let Some(token) = &self.credentials.session_token {
            request = request.header("x-amz-security-token", token);
        }
        if let Some(body) = body {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "text/xml")
                .body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DnsProviderError::ApiRequest(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            DnsProviderError::ApiRequest(format!("Failed to read Route53 response: {}", e))
        })?;

        if status.is_success() {
            return Ok(text);
        }

        let code = xml_value(&text, "Code").unwrap_or_default();
        let message = xml_value(&text, "Message").unwrap_or_else(|| text.clone());

        if status == reqwest::StatusCode::FORBIDDEN
            || matches!(
                code.as_str(),
                "SignatureDoesNotMatch" | "InvalidClientTokenId" | "AccessDenied"
            )
        {
            return Err(DnsProviderError::Authentication(format!("{}: {}", code, message)));
        }

        Err(DnsProviderError::ApiRequest(format!(
            "HTTP {} {}: {}",
            status.as_u16(),
            code,
            message
        )))
    }

    /// Hosted zone for `domain`, found by trying it and then each parent
    async fn zone_id(&self, domain: &str) -> DnsResult<String> {
        let domain = domain.trim_end_matches('.');

        if let Some(zone_id) = self.zone_cache.read().await.get(domain) {
            trace!(domain = %domain, zone_id = %zone_id, "Zone ID found in cache");
            return Ok(zone_id.clone());
        }

        let mut candidate = domain;
        loop {
            if let Some(zone_id) = self.lookup_zone(candidate).await? {
                debug!(domain = %domain, zone = %candidate, zone_id = %zone_id, "Found hosted zone");
                self.zone_cache
                    .write()
                    .await
                    .insert(domain.to_string(), zone_id.clone());
                return Ok(zone_id);
            }

            match candidate.split_once('.') {
                Some((_, parent)) if parent.contains('.') => candidate = parent,
                _ => break,
            }
        }

        Err(DnsProviderError::ZoneNotFound {
            domain: domain.to_string(),
        })
    }

    async fn lookup_zone(&self, name: &str) -> DnsResult<Option<String>> {
        let dns_name = format!("{}.", name);
        let path = format!("/{}/hostedzonesbyname", API_VERSION);
        let body = self
            .send(
                Method::GET,
                &path,
                &[("dnsname", dns_name.as_str()), ("maxitems", "1")],
                None,
            )
            .await?;

        Ok(find_public_zone(&body, &dns_name))
    }

    async fn change_record(
        &self,
        action: ChangeAction,
        record_name: &str,
        values: &[String],
    ) -> DnsResult<Option<String>> {
        let domain = record_name
            .strip_prefix(ACME_CHALLENGE_LABEL)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(record_name);
        let zone_id = self.zone_id(domain).await?;
        let body = change_batch_xml(action, record_name, self.settings.ttl, values);
        let path = format!("/{}/hostedzone/{}/rrset", API_VERSION, zone_id);

        let response = self.send(Method::POST, &path, &[], Some(body)).await?;
        Ok(xml_value(&response, "Id").map(|id| strip_resource_prefix(&id).to_string()))
    }

    async fn wait_for_sync(&self, change_id: &str) -> DnsResult<()> {
        let path = format!("/{}/change/{}", API_VERSION, change_id);
        let started = Instant::now();

        loop {
            let body = self.send(Method::GET, &path, &[], None).await?;
            let status = xml_value(&body, "Status").unwrap_or_default();

            if status == "INSYNC" {
                debug!(change_id = %change_id, elapsed = ?started.elapsed(), "Change in sync");
                return Ok(());
            }

            if started.elapsed() >= self.settings.propagation_timeout {
                return Err(DnsProviderError::Timeout {
                    change_id: change_id.to_string(),
                    elapsed: started.elapsed(),
                });
            }

            trace!(change_id = %change_id, status = %status, "Waiting for change");
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait]
impl DnsProvider for Route53Provider {
    fn name(&self) -> &'static str {
        "route53"
    }

    async fn publish_validation_record(&self, record_name: &str, values: &[String]) -> DnsResult<()> {
        let change_id = self
            .change_record(ChangeAction::Upsert, record_name, values)
            .await?
            .ok_or_else(|| {
                DnsProviderError::ApiRequest("No change id in Route53 response".to_string())
            })?;

        info!(record = %record_name, change_id = %change_id, "Waiting for Route53 change");
        self.wait_for_sync(&change_id).await
    }

    async fn remove_validation_record(&self, record_name: &str, values: &[String]) -> DnsResult<()> {
        match self
            .change_record(ChangeAction::Delete, record_name, values)
            .await
        {
            Ok(_) => {
                debug!(record = %record_name, "Removed validation record");
                Ok(())
            }
            Err(DnsProviderError::ApiRequest(message))
                if message.contains("InvalidChangeBatch") && message.contains("not found") =>
            {
                debug!(record = %record_name, "Validation record already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Region and service a SigV4 signature is scoped to
#[derive(Debug, Clone)]
struct SigningScope {
    region: String,
    service: String,
}

impl SigningScope {
    fn route53() -> Self {
        Self {
            region: SIGNING_REGION.to_string(),
            service: SIGNING_SERVICE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SignedHeaders {
    amz_date: String,
    authorization: String,
}

#[allow(clippy::too_many_arguments)]
fn sign_request(
    credentials: &DnsCredentials,
    scope: &SigningScope,
    method: &str,
    host: &str,
    path: &str,
    canonical_query: &str,
    payload: &[u8],
    now: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut headers = vec![("host", host.to_string()), ("x-amz-date", amz_date.clone())];
    if let Some(token) = &credentials.session_token {
        headers.push(("x-amz-security-token", token.clone()));
    }

    let canonical_headers: String = headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method,
        path,
        canonical_query,
        canonical_headers,
        signed_headers,
        sha256_hex(payload)
    );

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        date, scope.region, scope.service
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        credential_scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_access_key, &date, &scope.region, &scope.service);
    let signature = hex::encode(hmac::sign(&key, string_to_sign.as_bytes()).as_ref());

    SignedHeaders {
        authorization: format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            credentials.access_key_id, credential_scope, signed_headers, signature
        ),
        amz_date,
    }
}

fn signing_key(secret: &str, date: &str, region: &str, service: &str) -> hmac::Key {
    let derive = |key: &[u8], data: &str| {
        let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key), data.as_bytes());
        tag.as_ref().to_vec()
    };

    let k_date = derive(format!("AWS4{}", secret).as_bytes(), date);
    let k_region = derive(&k_date, region);
    let k_service = derive(&k_region, service);
    let k_signing = derive(&k_service, "aws4_request");

    hmac::Key::new(hmac::HMAC_SHA256, &k_signing)
}

fn sha256_hex(data: &[u8]) -> String {
    hex::encode(digest::digest(&digest::SHA256, data).as_ref())
}

/// RFC 3986 encoding, leaving only unreserved characters as-is
fn uri_encode(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Parameters sorted by name then value, each part URI-encoded
fn canonical_query_string(query: &[(&str, &str)]) -> String {
    let mut pairs: Vec<(String, String)> = query
        .iter()
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    pairs.sort();

    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn change_batch_xml(action: ChangeAction, record_name: &str, ttl: u32, values: &[String]) -> String {
    let records: String = values
        .iter()
        .map(|v| {
            format!(
                "<ResourceRecord><Value>\"{}\"</Value></ResourceRecord>",
                xml_escape(v)
            )
        })
        .collect();

    format!(
        concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<ChangeResourceRecordSetsRequest xmlns="{ns}">"#,
            "<ChangeBatch><Comment>ACME DNS-01 validation</Comment><Changes><Change>",
            "<Action>{action}</Action>",
            "<ResourceRecordSet><Name>{name}.</Name><Type>TXT</Type><TTL>{ttl}</TTL>",
            "<ResourceRecords>{records}</ResourceRecords>",
            "</ResourceRecordSet></Change></Changes></ChangeBatch>",
            "</ChangeResourceRecordSetsRequest>"
        ),
        ns = XML_NAMESPACE,
        action = action.as_str(),
        name = xml_escape(record_name.trim_end_matches('.')),
        ttl = ttl,
        records = records,
    )
}

/// Leaf elements; the opening and closing names are compared by the caller
static LEAF_ELEMENT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"<(\w+)>([^<]*)</(\w+)>").ok());

static HOSTED_ZONE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)<HostedZone>(.*?)</HostedZone>").ok());

/// Text of the first `<tag>` element
fn xml_value(xml: &str, tag: &str) -> Option<String> {
    LEAF_ELEMENT
        .as_ref()?
        .captures_iter(xml)
        .find(|c| &c[1] == tag && &c[3] == tag)
        .map(|c| c[2].to_string())
}

/// Id of the public hosted zone named exactly `dns_name` in a
/// ListHostedZonesByName response
fn find_public_zone(xml: &str, dns_name: &str) -> Option<String> {
    HOSTED_ZONE
        .as_ref()?
        .captures_iter(xml)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .filter(|zone| {
            xml_value(zone, "Name").is_some_and(|name| name.eq_ignore_ascii_case(dns_name))
        })
        .find(|zone| xml_value(zone, "PrivateZone").as_deref() != Some("true"))
        .and_then(|zone| xml_value(zone, "Id"))
        .map(|id| strip_resource_prefix(&id).to_string())
}

/// `/hostedzone/Z123` -> `Z123`, `/change/C456` -> `C456`
fn strip_resource_prefix(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn example_credentials() -> DnsCredentials {
        DnsCredentials {
            access_key_id: "AKIDEXAMPLE".to_string(),
            secret_access_key: "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY".to_string(),
            session_token: None,
        }
    }

    #[test]
    fn test_signing_key_derivation() {
        let key = signing_key(
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "20120215",
            "us-east-1",
            "iam",
        );
        // Signing with the derived key must match signing with the raw published bytes
        let expected = hmac::Key::new(
            hmac::HMAC_SHA256,
            &hex::decode("f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d")
                .unwrap(),
        );
        assert_eq!(
            hmac::sign(&key, b"probe").as_ref(),
            hmac::sign(&expected, b"probe").as_ref()
        );
    }

    #[test]
    fn test_sign_get_vanilla() {
        let now = Utc.with_ymd_and_hms(2015, 8, 30, 12, 36, 0).unwrap();
        let scope = SigningScope {
            region: "us-east-1".to_string(),
            service: "service".to_string(),
        };

        let signed = sign_request(
            &example_credentials(),
            &scope,
            "GET",
            "example.amazonaws.com",
            "/",
            "",
            b"",
            now,
        );

        assert_eq!(signed.amz_date, "20150830T123600Z");
        assert_eq!(
            signed.authorization,
            "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20150830/us-east-1/service/aws4_request, \
             SignedHeaders=host;x-amz-date, \
             Signature=5fa00fa31553b73ebf1942676e86291e8372ff2a2260956d9b8aae1d763fbf31"
        );
    }

    #[test]
    fn test_session_token_is_signed() {
        let mut credentials = example_credentials();
        credentials.session_token = Some("session".to_string());
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

        let signed = sign_request(
            &credentials,
            &SigningScope::route53(),
            "GET",
            "route53.amazonaws.com",
            "/2013-04-01/change/C1",
            "",
            b"",
            now,
        );
        assert!(signed
            .authorization
            .contains("SignedHeaders=host;x-amz-date;x-amz-security-token,"));
        assert!(signed
            .authorization
            .contains("Credential=AKIDEXAMPLE/20260301/us-east-1/route53/aws4_request"));
    }

    #[test]
    fn test_canonical_query_sorted_and_encoded() {
        assert_eq!(
            canonical_query_string(&[("maxitems", "1"), ("dnsname", "example.com.")]),
            "dnsname=example.com.&maxitems=1"
        );
        assert_eq!(canonical_query_string(&[("q", "a b/c*")]), "q=a%20b%2Fc%2A");
        assert_eq!(canonical_query_string(&[]), "");
    }

    #[test]
    fn test_change_batch_xml() {
        let xml = change_batch_xml(
            ChangeAction::Upsert,
            "_acme-challenge.example.com",
            60,
            &["aaa".to_string(), "bbb".to_string()],
        );

        assert!(xml.contains("<Action>UPSERT</Action>"));
        assert!(xml.contains("<Name>_acme-challenge.example.com.</Name>"));
        assert!(xml.contains("<TTL>60</TTL>"));
        assert!(xml.contains(
            "<ResourceRecords><ResourceRecord><Value>\"aaa\"</Value></ResourceRecord>\
             <ResourceRecord><Value>\"bbb\"</Value></ResourceRecord></ResourceRecords>"
        ));

        let xml = change_batch_xml(ChangeAction::Delete, "_acme-challenge.example.com.", 60, &[]);
        assert!(xml.contains("<Action>DELETE</Action>"));
        assert!(xml.contains("<Name>_acme-challenge.example.com.</Name>"));
    }

    #[test]
    fn test_find_public_zone() {
        let body = r#"<?xml version="1.0"?>
<ListHostedZonesByNameResponse xmlns="https://route53.amazonaws.com/doc/2013-04-01/">
  <HostedZones>
    <HostedZone>
      <Id>/hostedzone/ZPRIVATE</Id>
      <Name>example.com.</Name>
      <Config><PrivateZone>true</PrivateZone></Config>
    </HostedZone>
    <HostedZone>
      <Id>/hostedzone/Z1D633PJN98FT9</Id>
      <Name>example.com.</Name>
      <Config><PrivateZone>false</PrivateZone></Config>
    </HostedZone>
  </HostedZones>
  <DNSName>example.com.</DNSName>
  <MaxItems>2</MaxItems>
</ListHostedZonesByNameResponse>"#;

        assert_eq!(
            find_public_zone(body, "example.com."),
            Some("Z1D633PJN98FT9".to_string())
        );
        // Route53 returns the next zone in order when there is no exact match
        assert_eq!(find_public_zone(body, "sub.example.com."), None);
    }

    #[test]
    fn test_xml_value_and_ids() {
        let body = "<ChangeResourceRecordSetsResponse><ChangeInfo><Id>/change/C2682N5HXP0BZ4</Id>\
                    <Status>PENDING</Status></ChangeInfo></ChangeResourceRecordSetsResponse>";
        let id = xml_value(body, "Id").unwrap();
        assert_eq!(strip_resource_prefix(&id), "C2682N5HXP0BZ4");
        assert_eq!(xml_value(body, "Status").as_deref(), Some("PENDING"));
        assert_eq!(xml_value(body, "Missing"), None);
    }

    #[test]
    fn test_xml_value_skips_nested_and_mismatched_elements() {
        let body = "<ErrorResponse><Error><Type>Sender</Type><Code>NoSuchHostedZone</Code>\
                    <Message>No hosted zone found with ID: Z1</Message></Error></ErrorResponse>";
        assert_eq!(xml_value(body, "Code").as_deref(), Some("NoSuchHostedZone"));
        assert_eq!(
            xml_value(body, "Message").as_deref(),
            Some("No hosted zone found with ID: Z1")
        );
        assert_eq!(xml_value(body, "Error"), None);
        assert_eq!(xml_value("<Id>Z1</Name>", "Id"), None);
    }

    #[test]
    fn test_new_requires_credentials() {
        let credentials = DnsCredentials {
            access_key_id: String::new(),
            secret_access_key: "secret".to_string(),
            session_token: None,
        };
        assert!(matches!(
            Route53Provider::new(credentials, Route53Settings::default()),
            Err(DnsProviderError::Configuration(_))
        ));

        let provider = Route53Provider::new(example_credentials(), Route53Settings::default()).unwrap();
        assert_eq!(provider.host, "route53.amazonaws.com");
    }
}
