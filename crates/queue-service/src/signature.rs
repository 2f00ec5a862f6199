//! Verification of SNS notification signatures.
//!
//! SNS signs every message it delivers with the private key of a certificate
//! published under `SigningCertURL`. Verification rebuilds the string SNS
//! signed from the notification fields, fetches the certificate (only from an
//! `sns.<region>.amazonaws.com` HTTPS host) and checks the RSA PKCS#1 v1.5
//! signature with SHA1 (`SignatureVersion` 1) or SHA256 (`SignatureVersion` 2).
//!
//! Certificates are cached by URL, so each one is downloaded once per
//! verifier.

use crate::error::PreprocessError;
use async_trait::async_trait;
use base64::Engine;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use serde_json::{Map, Value};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;
use x509_cert::der::{DecodePem, Encode};
use x509_cert::Certificate;

#[cfg(test)]
#[path = "signature_tests.rs"]
mod tests;

/// Fields covered by the signature of a `Notification`, in signing order
const NOTIFICATION_FIELDS: &[&str] = &["Message", "MessageId", "Subject", "Timestamp", "TopicArn", "Type"];

/// Fields covered by the signature of subscription confirmations
const CONFIRMATION_FIELDS: &[&str] = &[
    "Message",
    "MessageId",
    "SubscribeURL",
    "Timestamp",
    "Token",
    "TopicArn",
    "Type",
];

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Certificate Fetching
// ============================================================================

/// Source of PEM-encoded signing certificates
#[async_trait]
pub trait CertificateFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<String, PreprocessError>;
}

/// Downloads signing certificates over HTTPS
#[derive(Debug, Clone)]
pub struct HttpCertificateFetcher {
    http_client: reqwest::Client,
}

impl HttpCertificateFetcher {
    pub fn new() -> Result<Self, PreprocessError> {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_FETCH_TIMEOUT)
            .build()
            .map_err(|e| PreprocessError::CertificateUnavailable {
                url: String::new(),
                message: format!("failed to create HTTP client: {}", e),
            })?;
        Ok(Self { http_client })
    }

    pub fn with_client(http_client: reqwest::Client) -> Self {
        Self { http_client }
    }
}

#[async_trait]
impl CertificateFetcher for HttpCertificateFetcher {
    async fn fetch(&self, url: &Url) -> Result<String, PreprocessError> {
        let unavailable = |message: String| PreprocessError::CertificateUnavailable {
            url: url.to_string(),
            message,
        };

        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unavailable(format!("HTTP {}", status.as_u16())));
        }

        response.text().await.map_err(|e| unavailable(e.to_string()))
    }
}

// ============================================================================
// Verifier
// ============================================================================

/// Checks notification signatures against the SNS signing certificate
pub struct SignatureVerifier {
    fetcher: Arc<dyn CertificateFetcher>,
    keys: RwLock<HashMap<String, RsaPublicKey>>,
}

impl SignatureVerifier {
    /// Verifier downloading certificates over HTTPS
    pub fn new() -> Result<Self, PreprocessError> {
        Ok(Self::with_fetcher(HttpCertificateFetcher::new()?))
    }

    pub fn with_fetcher(fetcher: impl CertificateFetcher + 'static) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Verify the signature of a raw notification body
    pub async fn verify(&self, body: &str) -> Result<(), PreprocessError> {
        let fields: Map<String, Value> =
            serde_json::from_str(body).map_err(|e| PreprocessError::MalformedNotification {
                message: e.to_string(),
            })?;

        let signature = base64::engine::general_purpose::STANDARD
            .decode(required_field(&fields, "Signature")?)
            .map_err(|e| invalid(format!("signature is not base64: {}", e)))?;
        let cert_url = signing_cert_url(required_field(&fields, "SigningCertURL")?)?;
        let string_to_sign = string_to_sign(&fields)?;

        let key = self.public_key(&cert_url).await?;
        let result = match required_field(&fields, "SignatureVersion")? {
            "1" => key.verify(
                Pkcs1v15Sign::new::<Sha1>(),
                &Sha1::digest(string_to_sign.as_bytes()),
                &signature,
            ),
            "2" => key.verify(
                Pkcs1v15Sign::new::<Sha256>(),
                &Sha256::digest(string_to_sign.as_bytes()),
                &signature,
            ),
            other => return Err(invalid(format!("unsupported signature version '{}'", other))),
        };

        result.map_err(|_| invalid("signature does not match the signing certificate".to_string()))?;

        debug!(cert_url = %cert_url, "Notification signature verified");
        Ok(())
    }

    async fn public_key(&self, url: &Url) -> Result<RsaPublicKey, PreprocessError> {
        if let Some(key) = self.keys.read().await.get(url.as_str()) {
            return Ok(key.clone());
        }

        let pem = self.fetcher.fetch(url).await?;
        let key = public_key_from_pem(&pem).map_err(|message| {
            PreprocessError::CertificateUnavailable {
                url: url.to_string(),
                message,
            }
        })?;

        debug!(cert_url = %url, "Cached SNS signing certificate");
        self.keys
            .write()
            .await
            .insert(url.to_string(), key.clone());
        Ok(key)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn invalid(message: String) -> PreprocessError {
    PreprocessError::InvalidSignature { message }
}

fn required_field<'a>(fields: &'a Map<String, Value>, name: &str) -> Result<&'a str, PreprocessError> {
    fields
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| invalid(format!("missing field '{}'", name)))
}

/// Canonical `name\nvalue\n` sequence SNS signs for the message type
pub fn string_to_sign(fields: &Map<String, Value>) -> Result<String, PreprocessError> {
    let names = match required_field(fields, "Type")? {
        "Notification" => NOTIFICATION_FIELDS,
        "SubscriptionConfirmation" | "UnsubscribeConfirmation" => CONFIRMATION_FIELDS,
        other => return Err(invalid(format!("unsigned message type '{}'", other))),
    };

    let mut canonical = String::new();
    for name in names {
        match fields.get(*name).and_then(Value::as_str) {
            Some(value) => {
                canonical.push_str(name);
                canonical.push('\n');
                canonical.push_str(value);
                canonical.push('\n');
            }
            // Subject is the only optional signed field
            None if *name == "Subject" => {}
            None => return Err(invalid(format!("missing field '{}'", name))),
        }
    }
    Ok(canonical)
}

/// Accept only HTTPS certificate URLs served by SNS itself
pub fn signing_cert_url(raw: &str) -> Result<Url, PreprocessError> {
    let untrusted = || invalid(format!("untrusted signing certificate URL '{}'", raw));
    let url = Url::parse(raw).map_err(|_| untrusted())?;

    if url.scheme() != "https" || !url.path().ends_with(".pem") {
        return Err(untrusted());
    }

    let host = url.host_str().ok_or_else(untrusted)?;
    let region = host
        .strip_prefix("sns.")
        .and_then(|rest| {
            rest.strip_suffix(".amazonaws.com")
                .or_else(|| rest.strip_suffix(".amazonaws.com.cn"))
        })
        .ok_or_else(untrusted)?;

    let valid_region = !region.is_empty()
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid_region {
        return Err(untrusted());
    }

    Ok(url)
}

fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, String> {
    let certificate =
        Certificate::from_pem(pem.as_bytes()).map_err(|e| format!("invalid certificate: {}", e))?;
    let spki = certificate
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| format!("invalid public key: {}", e))?;
    RsaPublicKey::from_public_key_der(&spki).map_err(|e| format!("certificate key is not RSA: {}", e))
}
