use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{SignedDocument, Signer, SigningError};

/// Timeout for a signing request.
pub const SIGN_TIMEOUT_SECS: u64 = 15;
/// Timeout for a health probe.
pub const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Request body of `POST /sign-xades`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    xml: &'a str,
    key_alias: &'a str,
}

/// Response body of `POST /sign-xades`: either `signedXml` or `error`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignResponse {
    signed_xml: Option<String>,
    error: Option<String>,
}

/// Result of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerHealth {
    Healthy,
    /// Reachable but answered with a non-success status.
    Unhealthy { status: u16 },
    /// Not reachable at all.
    Unreachable { reason: String },
}

impl SignerHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// HTTP client for the XAdES signing service.
#[derive(Debug, Clone)]
pub struct XadesSigner {
    client: reqwest::Client,
    base_url: String,
    key_alias: String,
}

impl XadesSigner {
    /// # Errors
    ///
    /// `SigningError::Unavailable` if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, key_alias: impl Into<String>) -> Result<Self, SigningError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(SIGN_TIMEOUT_SECS))
            .build()
            .map_err(|e| SigningError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            key_alias: key_alias.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn sign_url(&self) -> String {
        format!("{}/sign-xades", self.base_url)
    }

    /// Probe `GET /health`.
    pub async fn health(&self) -> SignerHealth {
        let url = format!("{}/health", self.base_url);
        let result = self
            .client
            .get(&url)
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => SignerHealth::Healthy,
            Ok(resp) => SignerHealth::Unhealthy {
                status: resp.status().as_u16(),
            },
            Err(e) => SignerHealth::Unreachable {
                reason: e.to_string(),
            },
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> SigningError {
        if e.is_timeout() {
            SigningError::Timeout(SIGN_TIMEOUT_SECS)
        } else if e.is_connect() {
            SigningError::Unavailable(format!(
                "connection refused by {}; is the signer running?",
                self.base_url
            ))
        } else {
            SigningError::Unavailable(e.to_string())
        }
    }
}

#[async_trait]
impl Signer for XadesSigner {
    fn is_enabled(&self) -> bool {
        !self.base_url.is_empty()
    }

    async fn sign(&self, xml: &str) -> Result<SignedDocument, SigningError> {
        if !self.is_enabled() {
            return Err(SigningError::Disabled);
        }

        let req = SignRequest {
            xml,
            key_alias: &self.key_alias,
        };
        debug!(bytes = xml.len(), url = %self.sign_url(), "sending document to signer");

        let resp = self
            .client
            .post(self.sign_url())
            .json(&req)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.transport_error(e))?;

        parse_sign_response(status.as_u16(), &body).inspect_err(|e| {
            warn!(status = status.as_u16(), error = %e, "signer did not return a signed document");
        })
    }
}

/// Interpret a signer response body.
fn parse_sign_response(status: u16, body: &str) -> Result<SignedDocument, SigningError> {
    let parsed: Result<SignResponse, _> = serde_json::from_str(body);

    if !(200..300).contains(&status) {
        let detail = parsed
            .ok()
            .and_then(|r| r.error)
            .unwrap_or_else(|| body.chars().take(200).collect());
        return Err(SigningError::Rejected(format!("HTTP {status}: {detail}")));
    }

    let resp = parsed.map_err(|e| SigningError::InvalidResponse(e.to_string()))?;
    if let Some(error) = resp.error {
        return Err(SigningError::Rejected(error));
    }
    match resp.signed_xml {
        Some(xml) if !xml.trim().is_empty() => Ok(SignedDocument::new(xml)),
        _ => Err(SigningError::InvalidResponse(
            "response carries neither signedXml nor error".into(),
        )),
    }
}
