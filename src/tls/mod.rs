pub mod probe;

pub use probe::{
    days_until, parse_not_after, CertificateExpiry, ExpirationProber, ExpiryProbe, ProbeError,
    ProbeSettings,
};

use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Load the operating system's trust anchors
pub fn native_root_store() -> Result<RootCertStore, ProbeError> {
    let loaded = rustls_native_certs::load_native_certs();
    for error in &loaded.errors {
        warn!("Problem loading native root certificates: {}", error);
    }

    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(loaded.certs);
    debug!(added, ignored, "Loaded native root certificates");

    if roots.is_empty() {
        return Err(ProbeError::TrustStore(
            "no usable root certificates found".to_string(),
        ));
    }

    Ok(roots)
}

/// Client config pinned to the ring provider so the result does not depend on
/// which crypto provider another crate installed as process default
pub fn client_config(roots: RootCertStore) -> Result<Arc<ClientConfig>, ProbeError> {
    let config = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| ProbeError::TrustStore(format!("Failed to build TLS config: {}", e)))?
    .with_root_certificates(roots)
    .with_no_client_auth();

    Ok(Arc::new(config))
}
