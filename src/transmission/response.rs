use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

use super::package::read_xml_entry;
use super::{OutcomeStatus, TransmissionOutcome};
use crate::ubl::xml_utils::{all_element_texts, first_element_text};

/// CDR response code meaning "accepted".
pub const ACCEPTED_CODE: &str = "0";

/// Verdict read from a CDR archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdrResponse {
    pub code: String,
    pub description: String,
    pub notes: Vec<String>,
}

impl CdrResponse {
    pub fn is_accepted(&self) -> bool {
        self.code == ACCEPTED_CODE
    }
}

/// Why a CDR archive could not be read.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CdrError {
    #[error("CDR archive is unreadable: {0}")]
    Archive(String),

    #[error("CDR XML not found in response archive")]
    MissingXml,

    #[error("CDR XML has no ResponseCode")]
    MissingResponseCode,

    #[error("CDR XML is malformed: {0}")]
    Xml(String),
}

impl CdrError {
    /// Marker stored as the outcome code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingXml => "NO_CDR_XML",
            Self::MissingResponseCode => "NO_RESPONSE_CODE",
            Self::Archive(_) | Self::Xml(_) => "PARSE_ERROR",
        }
    }
}

/// Read the verdict from a CDR zip.
pub fn parse_cdr(archive: &[u8]) -> Result<CdrResponse, CdrError> {
    let (_, xml) = read_xml_entry(archive)
        .map_err(|e| CdrError::Archive(e.to_string()))?
        .ok_or(CdrError::MissingXml)?;

    let xml_err = |e: crate::core::CpeError| CdrError::Xml(e.to_string());
    let code = first_element_text(&xml, "ResponseCode")
        .map_err(xml_err)?
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .ok_or(CdrError::MissingResponseCode)?;
    let description = first_element_text(&xml, "Description")
        .map_err(xml_err)?
        .unwrap_or_default();
    let notes = all_element_texts(&xml, "Note").map_err(xml_err)?;

    Ok(CdrResponse {
        code,
        description: description.trim().to_string(),
        notes,
    })
}

/// Interpret a raw `sendBill` response body.
///
/// Never fails: faults, missing payloads and unreadable archives become
/// ERROR outcomes. The raw body is kept in every branch.
pub fn parse_response(raw: &[u8]) -> TransmissionOutcome {
    let body = String::from_utf8_lossy(raw);

    match first_element_text(&body, "Fault") {
        Ok(Some(_)) => {
            let code = first_element_text(&body, "faultcode")
                .ok()
                .flatten()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "SOAP_FAULT".to_string());
            let description = first_element_text(&body, "faultstring")
                .ok()
                .flatten()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "Unknown SOAP fault".to_string());
            return TransmissionOutcome::error(code, description, None, raw);
        }
        Ok(None) => {}
        Err(e) => {
            return TransmissionOutcome::error(
                "PARSE_ERROR",
                format!("Error parsing response: {e}"),
                None,
                raw,
            );
        }
    }

    let payload = match first_element_text(&body, "applicationResponse") {
        Ok(Some(p)) if !p.trim().is_empty() => p,
        Ok(_) => {
            return TransmissionOutcome::error(
                "NO_RESPONSE",
                "No application response found",
                None,
                raw,
            );
        }
        Err(e) => {
            return TransmissionOutcome::error(
                "PARSE_ERROR",
                format!("Error parsing response: {e}"),
                None,
                raw,
            );
        }
    };

    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    let archive = match STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return TransmissionOutcome::error(
                "PARSE_ERROR",
                format!("applicationResponse is not valid base64: {e}"),
                None,
                raw,
            );
        }
    };

    match parse_cdr(&archive) {
        Ok(cdr) => TransmissionOutcome {
            status: if cdr.is_accepted() {
                OutcomeStatus::Accepted
            } else {
                OutcomeStatus::Rejected
            },
            code: cdr.code,
            description: cdr.description,
            notes: cdr.notes,
            archive: Some(archive),
            raw_response: raw.to_vec(),
        },
        Err(e) => TransmissionOutcome::error(e.code(), e.to_string(), Some(archive), raw),
    }
}

/// Whether the body carries a SOAP fault.
pub(crate) fn is_fault(raw: &[u8]) -> bool {
    matches!(
        first_element_text(&String::from_utf8_lossy(raw), "Fault"),
        Ok(Some(_))
    )
}
