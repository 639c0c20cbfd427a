//! End-to-end emission of one electronic document.
//!
//! [`EmissionService::emit`] runs allocate → breakdown → build → record →
//! sign → package/store → transmit → persist. Failures before the PENDING
//! record exists are returned as [`EmissionError`]; every failure after it
//! is recorded on the document as a terminal status and the document is
//! returned normally.

mod service;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::{
    CpeError, Customer, DEFAULT_IGV_RATE, DocumentType, InvoiceLine, NoteReference,
    SunatEnvironment, ValidationError,
};
use crate::repository::RepoError;
use crate::transmission::Credentials;

pub use service::EmissionService;

/// Catalog 17 default: internal sale.
pub const DEFAULT_OPERATION_TYPE: &str = "0101";

/// Per-deployment emission parameters.
#[derive(Debug, Clone)]
pub struct EmissionSettings {
    pub environment: SunatEnvironment,
    /// `sendBill` endpoint for the environment.
    pub endpoint: String,
    pub credentials: Credentials,
    pub igv_rate: Decimal,
    pub currency: String,
    pub operation_type: String,
}

impl EmissionSettings {
    pub fn new(
        environment: SunatEnvironment,
        endpoint: impl Into<String>,
        credentials: Credentials,
    ) -> Self {
        Self {
            environment,
            endpoint: endpoint.into(),
            credentials,
            igv_rate: DEFAULT_IGV_RATE,
            currency: "PEN".to_string(),
            operation_type: DEFAULT_OPERATION_TYPE.to_string(),
        }
    }

    pub fn igv_rate(mut self, rate: Decimal) -> Self {
        self.igv_rate = rate;
        self
    }

    pub fn currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn operation_type(mut self, code: impl Into<String>) -> Self {
        self.operation_type = code.into();
        self
    }
}

/// What to emit. The issuer and environment come from the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionRequest {
    pub document_type: DocumentType,
    /// Defaults to [`DocumentType::default_series`].
    #[serde(default)]
    pub series: Option<String>,
    pub issue_date: NaiveDate,
    pub customer: Customer,
    pub lines: Vec<InvoiceLine>,
    /// Required for credit and debit notes.
    #[serde(default)]
    pub reference: Option<NoteReference>,
    #[serde(default)]
    pub related_sale_id: Option<String>,
}

impl EmissionRequest {
    pub fn new(
        document_type: DocumentType,
        issue_date: NaiveDate,
        customer: Customer,
        lines: Vec<InvoiceLine>,
    ) -> Self {
        Self {
            document_type,
            series: None,
            issue_date,
            customer,
            lines,
            reference: None,
            related_sale_id: None,
        }
    }

    pub fn series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn reference(mut self, reference: NoteReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn related_sale(mut self, sale_id: impl Into<String>) -> Self {
        self.related_sale_id = Some(sale_id.into());
        self
    }

    /// Series actually used: the explicit one or the type's default.
    pub fn effective_series(&self) -> String {
        self.series
            .clone()
            .unwrap_or_else(|| self.document_type.default_series().to_string())
    }
}

/// Failures that prevent a document record from reaching a terminal state.
///
/// Authority rejections and transport failures are not errors; they come
/// back as a REJECTED or ERROR [`EmittedDocument`](crate::core::EmittedDocument).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EmissionError {
    /// The request was refused before a number was allocated.
    #[error("invalid emission request: {}", join(.0))]
    InvalidInput(Vec<ValidationError>),

    /// The sale already has an accepted document of this type.
    #[error("sale {sale_id} already has accepted document {document_id}")]
    AlreadyAccepted { sale_id: String, document_id: Uuid },

    /// Another emission for the same sale and type is still running.
    #[error("an emission for sale {sale_id} is already in progress")]
    InProgress { sale_id: String },

    /// No number was consumed; the call may be retried as is.
    #[error("number allocation failed: {0}")]
    Allocation(#[source] RepoError),

    /// The document could not be rendered. `document_id` is burned.
    #[error("building {document_id} failed: {source}")]
    Build {
        document_id: String,
        #[source]
        source: CpeError,
    },

    /// The document record could not be read or written.
    #[error("document record persistence failed: {0}")]
    Persistence(#[source] RepoError),

    /// A record was driven through an illegal status change.
    #[error(transparent)]
    Lifecycle(#[from] CpeError),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
