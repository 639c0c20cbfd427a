//! SUNAT `sendBill` transmission.
//!
//! The signed XML is zipped, wrapped in a SOAP envelope carrying SOL
//! credentials and posted to the billing endpoint. The answer is either a
//! SOAP fault or a base64 CDR archive whose XML holds the verdict.

mod client;
mod envelope;
mod package;
mod response;

use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::SunatEnvironment;

pub use client::{SEND_TIMEOUT_SECS, SoapClient};
pub use envelope::send_bill_envelope;
pub use package::{build_package, read_xml_entry};
pub use response::{CdrError, CdrResponse, parse_cdr, parse_response};

/// Transport-level failures. Authority verdicts, faults and unparsable
/// answers are not errors; they are [`TransmissionOutcome`]s.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransmissionError {
    #[error("transmission timed out after {0}s")]
    Timeout(u64),

    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    /// Non-success HTTP status without a SOAP fault in the body.
    #[error("HTTP {status} from authority: {body}")]
    Http { status: u16, body: String },

    #[error("packaging failed: {0}")]
    Packaging(String),
}

/// Verdict class of a transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeStatus {
    /// CDR response code `0`.
    Accepted,
    /// Any other CDR response code.
    Rejected,
    /// SOAP fault or unusable response.
    Error,
}

/// Parsed answer to a `sendBill` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionOutcome {
    pub status: OutcomeStatus,
    /// CDR response code, SOAP fault code, or a local marker such as
    /// `NO_RESPONSE`.
    pub code: String,
    pub description: String,
    /// Observations (`cbc:Note`) attached to the CDR.
    pub notes: Vec<String>,
    /// Decoded CDR archive, when one was received.
    pub archive: Option<Vec<u8>>,
    /// Raw response body, always kept.
    pub raw_response: Vec<u8>,
}

impl TransmissionOutcome {
    pub(crate) fn error(
        code: impl Into<String>,
        description: impl Into<String>,
        archive: Option<Vec<u8>>,
        raw_response: &[u8],
    ) -> Self {
        Self {
            status: OutcomeStatus::Error,
            code: code.into(),
            description: description.into(),
            notes: Vec::new(),
            archive,
            raw_response: raw_response.to_vec(),
        }
    }
}

/// SOL credentials for the `wsse:UsernameToken` header.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Beta accepts the bare RUC; production expects RUC followed by the SOL user.
    ///
    /// ```
    /// use sunat_cpe::core::SunatEnvironment;
    /// use sunat_cpe::transmission::Credentials;
    ///
    /// let c = Credentials::for_environment(SunatEnvironment::Production, "20123456789", "MODDATOS", "pw");
    /// assert_eq!(c.username, "20123456789MODDATOS");
    /// ```
    pub fn for_environment(
        environment: SunatEnvironment,
        ruc: &str,
        sol_user: &str,
        password: impl Into<String>,
    ) -> Self {
        let username = match environment {
            SunatEnvironment::Beta => ruc.to_string(),
            SunatEnvironment::Production => format!("{ruc}{sol_user}"),
        };
        Self::new(username, password)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Submits a zipped document to the authority.
#[async_trait]
pub trait Transmitter: Send + Sync {
    /// Send `package` (a zip named `package_name`) to `endpoint`.
    ///
    /// Faults, rejections and unparsable answers come back as outcomes;
    /// only transport failures are errors.
    async fn submit(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        package_name: &str,
        package: &[u8],
    ) -> Result<TransmissionOutcome, TransmissionError>;
}
