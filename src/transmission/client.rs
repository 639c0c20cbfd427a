use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use super::envelope::send_bill_envelope;
use super::response::{is_fault, parse_response};
use super::{Credentials, TransmissionError, TransmissionOutcome, Transmitter};

/// Timeout for a `sendBill` call.
pub const SEND_TIMEOUT_SECS: u64 = 30;

/// SOAP client for the SUNAT billing service.
#[derive(Debug, Clone)]
pub struct SoapClient {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl SoapClient {
    /// # Errors
    ///
    /// `TransmissionError::Connection` if the HTTP client cannot be built.
    pub fn new() -> Result<Self, TransmissionError> {
        Self::with_timeout(Duration::from_secs(SEND_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, TransmissionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransmissionError::Connection {
                endpoint: String::new(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            timeout_secs: timeout.as_secs(),
        })
    }

    fn transport_error(&self, endpoint: &str, e: reqwest::Error) -> TransmissionError {
        if e.is_timeout() {
            TransmissionError::Timeout(self.timeout_secs)
        } else {
            TransmissionError::Connection {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl Transmitter for SoapClient {
    async fn submit(
        &self,
        endpoint: &str,
        credentials: &Credentials,
        package_name: &str,
        package: &[u8],
    ) -> Result<TransmissionOutcome, TransmissionError> {
        let envelope = send_bill_envelope(credentials, package_name, package)?;
        debug!(
            endpoint,
            package_name,
            envelope_bytes = envelope.len(),
            "sending sendBill request"
        );

        let resp = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "text/xml; charset=utf-8")
            .header("SOAPAction", "")
            .body(envelope)
            .send()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| self.transport_error(endpoint, e))?;
        debug!(status = status.as_u16(), response_bytes = body.len(), "sendBill answered");

        // The service reports faults with HTTP 500; those are outcomes.
        if !status.is_success() && !is_fault(&body) {
            return Err(TransmissionError::Http {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).chars().take(500).collect(),
            });
        }

        Ok(parse_response(&body))
    }
}
