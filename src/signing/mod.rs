//! XAdES signing through an external HTTP signer.
//!
//! The signer is a separate service holding the issuer's certificate. This
//! module only talks to it; the digest stored with each document is always
//! computed locally over the signed bytes that will be transmitted.

mod xades;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub use xades::{SignerHealth, XadesSigner};

/// Signed XML plus the local digest of exactly those bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDocument {
    pub signed_xml: String,
    /// Base64 SHA-256 of `signed_xml`.
    pub digest: String,
}

impl SignedDocument {
    pub fn new(signed_xml: String) -> Self {
        let digest = digest_of(signed_xml.as_bytes());
        Self { signed_xml, digest }
    }
}

/// Errors raised by a [`Signer`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SigningError {
    /// No signer is configured.
    #[error("signing disabled: no signer configured")]
    Disabled,

    /// The signer could not be reached (connection refused, DNS, TLS).
    #[error("signing service unavailable: {0}")]
    Unavailable(String),

    /// The signer was reached and refused the payload.
    #[error("signer rejected the document: {0}")]
    Rejected(String),

    /// The signer did not answer in time.
    #[error("signing timed out after {0}s")]
    Timeout(u64),

    /// The signer answered with something that is not a signed document.
    #[error("invalid signer response: {0}")]
    InvalidResponse(String),
}

impl SigningError {
    /// Whether the failure means the signer is not usable at all, as opposed
    /// to a refusal of this particular document.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Disabled | Self::Unavailable(_) | Self::Timeout(_))
    }
}

/// Produces XAdES-signed XML.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Whether signing can be attempted at all.
    fn is_enabled(&self) -> bool;

    /// Sign `xml`, returning the signed document and its local digest.
    async fn sign(&self, xml: &str) -> Result<SignedDocument, SigningError>;
}

/// Signer used when no signing service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSigner;

#[async_trait]
impl Signer for DisabledSigner {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn sign(&self, _xml: &str) -> Result<SignedDocument, SigningError> {
        Err(SigningError::Disabled)
    }
}

/// Base64 SHA-256 of `bytes`.
pub fn digest_of(bytes: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(bytes))
}
