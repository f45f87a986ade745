use base64::Engine;
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, EcdsaSigningAlgorithm, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING,
    ECDSA_P384_SHA384_FIXED_SIGNING,
};
use rustls::pki_types::PrivateKeyDer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Unsupported key algorithm '{0}' (supported: ecdsa-p256, ecdsa-p384)")]
    UnsupportedAlgorithm(String),

    #[error("Failed to generate {0} key")]
    Generation(KeyAlgorithm),

    #[error("No private key found in PEM data")]
    MissingKey,

    #[error("Private key is not PKCS#8 encoded")]
    UnsupportedFormat,

    #[error("Failed to parse private key PEM: {0}")]
    Pem(#[from] std::io::Error),

    #[error("Private key is not a supported ECDSA key: {0}")]
    Rejected(String),

    #[error("Signing failed")]
    Signing,
}

/// Asymmetric key types available for account and certificate keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyAlgorithm {
    #[default]
    EcdsaP256,
    EcdsaP384,
}

impl KeyAlgorithm {
    const ALL: [KeyAlgorithm; 2] = [KeyAlgorithm::EcdsaP256, KeyAlgorithm::EcdsaP384];

    fn signing_algorithm(self) -> &'static EcdsaSigningAlgorithm {
        match self {
            KeyAlgorithm::EcdsaP256 => &ECDSA_P256_SHA256_FIXED_SIGNING,
            KeyAlgorithm::EcdsaP384 => &ECDSA_P384_SHA384_FIXED_SIGNING,
        }
    }

    /// JWS `alg` header value
    pub fn jws_algorithm(self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaP256 => "ES256",
            KeyAlgorithm::EcdsaP384 => "ES384",
        }
    }

    /// JWK `crv` value
    pub fn curve(self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaP256 => "P-256",
            KeyAlgorithm::EcdsaP384 => "P-384",
        }
    }

    /// Byte length of one affine coordinate
    pub fn coordinate_len(self) -> usize {
        match self {
            KeyAlgorithm::EcdsaP256 => 32,
            KeyAlgorithm::EcdsaP384 => 48,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeyAlgorithm::EcdsaP256 => "ecdsa-p256",
            KeyAlgorithm::EcdsaP384 => "ecdsa-p384",
        }
    }
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyAlgorithm {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ecdsa-p256" | "p256" | "p-256" | "es256" => Ok(KeyAlgorithm::EcdsaP256),
            "ecdsa-p384" | "p384" | "p-384" | "es384" => Ok(KeyAlgorithm::EcdsaP384),
            _ => Err(KeyError::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// A private key held as PKCS#8 DER.
///
/// The DER bytes are the source of truth: PEM output is derived from them, so
/// writing and re-reading a key yields the same bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    algorithm: KeyAlgorithm,
    pkcs8: Vec<u8>,
}

impl KeyMaterial {
    pub fn generate(algorithm: KeyAlgorithm) -> Result<Self, KeyError> {
        let rng = SystemRandom::new();
        let document = EcdsaKeyPair::generate_pkcs8(algorithm.signing_algorithm(), &rng)
            .map_err(|_| KeyError::Generation(algorithm))?;

        Ok(Self {
            algorithm,
            pkcs8: document.as_ref().to_vec(),
        })
    }

    /// Parse a PKCS#8 `PRIVATE KEY` PEM block, detecting the curve
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let mut reader = std::io::BufReader::new(pem.as_bytes());
        let key = rustls_pemfile::private_key(&mut reader)?.ok_or(KeyError::MissingKey)?;

        let der = match key {
            PrivateKeyDer::Pkcs8(der) => der.secret_pkcs8_der().to_vec(),
            _ => return Err(KeyError::UnsupportedFormat),
        };

        Self::from_pkcs8_der(der)
    }

    pub fn from_pkcs8_der(der: Vec<u8>) -> Result<Self, KeyError> {
        let rng = SystemRandom::new();
        let mut last_error = None;

        for algorithm in KeyAlgorithm::ALL {
            match EcdsaKeyPair::from_pkcs8(algorithm.signing_algorithm(), &der, &rng) {
                Ok(_) => {
                    return Ok(Self {
                        algorithm,
                        pkcs8: der,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(KeyError::Rejected(
            last_error.map(|e| e.to_string()).unwrap_or_default(),
        ))
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn pkcs8_der(&self) -> &[u8] {
        &self.pkcs8
    }

    pub fn to_pem(&self) -> String {
        pem_encode("PRIVATE KEY", &self.pkcs8)
    }

    pub fn key_pair(&self) -> Result<EcdsaKeyPair, KeyError> {
        EcdsaKeyPair::from_pkcs8(
            self.algorithm.signing_algorithm(),
            &self.pkcs8,
            &SystemRandom::new(),
        )
        .map_err(|e| KeyError::Rejected(e.to_string()))
    }

    /// Uncompressed public point: 0x04 || x || y
    pub fn public_key(&self) -> Result<Vec<u8>, KeyError> {
        Ok(self.key_pair()?.public_key().as_ref().to_vec())
    }

    /// Fixed-width (r || s) signature, the form JWS expects
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>, KeyError> {
        let rng = SystemRandom::new();
        let signature = self
            .key_pair()?
            .sign(&rng, message)
            .map_err(|_| KeyError::Signing)?;
        Ok(signature.as_ref().to_vec())
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

pub(crate) fn pem_encode(label: &str, data: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(data);
    let mut pem = format!("-----BEGIN {}-----\n", label);

    for chunk in b64.as_bytes().chunks(64) {
        pem.extend(chunk.iter().map(|&b| b as char));
        pem.push('\n');
    }

    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}
