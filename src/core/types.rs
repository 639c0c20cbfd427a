use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::CpeError;

/// Catalog 01: electronic document types handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// 01: Factura.
    Invoice,
    /// 03: Boleta de venta.
    Receipt,
    /// 07: Nota de crédito.
    CreditNote,
    /// 08: Nota de débito.
    DebitNote,
}

impl DocumentType {
    /// Catalog 01 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invoice => "01",
            Self::Receipt => "03",
            Self::CreditNote => "07",
            Self::DebitNote => "08",
        }
    }

    /// Parse from catalog 01 code.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Invoice),
            "03" => Some(Self::Receipt),
            "07" => Some(Self::CreditNote),
            "08" => Some(Self::DebitNote),
            _ => None,
        }
    }

    /// Series used when a request does not name one.
    pub fn default_series(&self) -> &'static str {
        match self {
            Self::Invoice => "F001",
            Self::Receipt => "B001",
            Self::CreditNote => "FC01",
            Self::DebitNote => "FD01",
        }
    }

    /// XML root shape the document renders with.
    pub fn shape(&self) -> DocumentShape {
        match self {
            Self::Invoice | Self::Receipt => DocumentShape::Invoice,
            Self::CreditNote | Self::DebitNote => DocumentShape::CreditNote,
        }
    }

    /// Whether the document amends a previously issued one.
    pub fn is_note(&self) -> bool {
        matches!(self, Self::CreditNote | Self::DebitNote)
    }
}

/// The two UBL root shapes the authority accepts from this issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentShape {
    Invoice,
    CreditNote,
}

/// Catalog 07: IGV affectation of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxAffectation {
    /// 10: Taxed, onerous operation.
    Taxed,
    /// 20: Exonerated.
    Exonerated,
    /// 30: Unaffected.
    Unaffected,
    /// 40: Export.
    Export,
}

impl TaxAffectation {
    /// Catalog 07 code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Taxed => "10",
            Self::Exonerated => "20",
            Self::Unaffected => "30",
            Self::Export => "40",
        }
    }

    /// Parse from catalog 07 code. Every code in a family maps to the
    /// family's variant (e.g. "17" is taxed, "36" is unaffected).
    pub fn from_code(code: &str) -> Option<Self> {
        let n: u8 = code.parse().ok()?;
        match n {
            10..=17 => Some(Self::Taxed),
            20..=21 => Some(Self::Exonerated),
            30..=37 => Some(Self::Unaffected),
            40 => Some(Self::Export),
            _ => None,
        }
    }

    /// Whether IGV is charged on the line.
    pub fn is_taxed(&self) -> bool {
        matches!(self, Self::Taxed)
    }

    /// Catalog 05 tax scheme the line reports under.
    pub fn scheme(&self) -> TaxScheme {
        match self {
            Self::Taxed => TaxScheme {
                id: "1000",
                name: "IGV",
                type_code: "VAT",
            },
            Self::Exonerated => TaxScheme {
                id: "9997",
                name: "EXO",
                type_code: "VAT",
            },
            Self::Unaffected => TaxScheme {
                id: "9998",
                name: "INA",
                type_code: "FRE",
            },
            Self::Export => TaxScheme {
                id: "9995",
                name: "EXP",
                type_code: "FRE",
            },
        }
    }
}

/// Catalog 05 tax scheme triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaxScheme {
    pub id: &'static str,
    pub name: &'static str,
    pub type_code: &'static str,
}

/// Target environment at the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SunatEnvironment {
    /// Homologation endpoint; documents carry no legal effect.
    Beta,
    Production,
}

impl SunatEnvironment {
    /// `cbc:ProfileExecutionID` value.
    pub fn profile_execution_id(&self) -> &'static str {
        match self {
            Self::Beta => "1",
            Self::Production => "2",
        }
    }

    /// Parse the `SUNAT_ENV` value.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "beta" => Some(Self::Beta),
            "prod" | "production" => Some(Self::Production),
            _ => None,
        }
    }
}

/// Registered fiscal address of the issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationAddress {
    /// INEI ubigeo (6 digits).
    pub ubigeo: String,
    /// Establishment code; "0000" is the fiscal domicile.
    pub address_type_code: String,
    pub district: String,
    pub province: String,
    pub department: String,
    /// Street address line.
    pub line: String,
    /// ISO 3166-1 alpha-2.
    pub country_code: String,
}

/// The issuing company.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issuer {
    /// RUC (11 digits).
    pub ruc: String,
    /// Razón social.
    pub legal_name: String,
    /// Nombre comercial.
    pub trade_name: Option<String>,
    pub address: RegistrationAddress,
}

/// The acquirer of the goods or services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    /// Catalog 06 identity document type.
    pub identity_type: String,
    pub identity_number: String,
    pub name: String,
    pub address: Option<String>,
}

/// One sold item. Transient: only used to compute the breakdown and render lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Catalog 03 unit of measure.
    pub unit_code: String,
    pub tax_affectation: TaxAffectation,
    /// True when `unit_price` already contains IGV.
    pub price_includes_tax: bool,
    /// Issuer's internal product code.
    pub product_code: Option<String>,
}

/// Reference from a credit/debit note to the document it amends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteReference {
    /// Type of the amended document.
    pub document_type: DocumentType,
    /// Full id of the amended document (e.g. "F001-00000042").
    pub document_id: String,
    /// Catalog 09 (credit) or catalog 10 (debit) reason code.
    pub reason_code: String,
    pub description: String,
}

/// Document-level data that is neither party nor line data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentHeader {
    pub document_type: DocumentType,
    pub series: String,
    /// Allocated correlative.
    pub number: u32,
    pub issue_date: NaiveDate,
    /// ISO 4217.
    pub currency: String,
    /// Catalog 51 operation type.
    pub operation_type: String,
    pub environment: SunatEnvironment,
    /// Required for credit and debit notes.
    pub reference: Option<NoteReference>,
}

/// Per-line monetary breakdown, every amount already rounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineBreakdown {
    /// Tax-exclusive line amount (2 dp).
    pub subtotal: Decimal,
    /// IGV on the line (2 dp).
    pub tax: Decimal,
    /// `subtotal + tax` (2 dp).
    pub total: Decimal,
    /// Tax-exclusive unit value (5 dp).
    pub unit_value: Decimal,
    /// Tax-inclusive unit price (5 dp).
    pub unit_price_with_tax: Decimal,
    /// Rate applied to the line (0 when not taxed).
    pub rate: Decimal,
}

/// Document totals, computed as sums of the rounded per-line values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonetaryBreakdown {
    /// Tax-exclusive base across all lines.
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    /// `subtotal + tax_amount`.
    pub total: Decimal,
    /// Base of taxed lines.
    pub taxed_base: Decimal,
    /// Base of exonerated lines.
    pub exonerated_base: Decimal,
    /// Base of unaffected lines.
    pub unaffected_base: Decimal,
    /// Base of export lines.
    pub export_base: Decimal,
    /// IGV rate the breakdown was computed with (e.g. 0.18).
    pub rate: Decimal,
    /// One entry per input line, same order.
    pub lines: Vec<LineBreakdown>,
}

/// Last issued correlative for a (document type, series) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSequence {
    pub document_type: DocumentType,
    pub series: String,
    pub last_number: u32,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle status of an emitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmissionStatus {
    Pending,
    Accepted,
    Rejected,
    Error,
}

impl EmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
            Self::Error => "ERROR",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(Self::Pending),
            "ACCEPTED" => Some(Self::Accepted),
            "REJECTED" => Some(Self::Rejected),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for EmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum length of a persisted diagnostic message.
pub const MAX_DIAGNOSTIC_LEN: usize = 500;

/// The persistent record of one emission attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedDocument {
    pub id: Uuid,
    pub document_type: DocumentType,
    pub series: String,
    pub number: u32,
    /// Back-reference to the originating sale; not an ownership relation.
    pub related_sale_id: Option<String>,
    pub filename: String,
    /// Base64 SHA-256 of the signed XML; empty until signed.
    pub content_hash: String,
    pub xml_storage_path: Option<String>,
    pub package_storage_path: Option<String>,
    pub response_archive_path: Option<String>,
    pub status: EmissionStatus,
    pub authority_code: Option<String>,
    pub authority_message: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
}

impl EmittedDocument {
    /// A fresh PENDING record with a content hash placeholder.
    pub fn pending(
        document_type: DocumentType,
        series: impl Into<String>,
        number: u32,
        filename: impl Into<String>,
        related_sale_id: Option<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_type,
            series: series.into(),
            number,
            related_sale_id,
            filename: filename.into(),
            content_hash: String::new(),
            xml_storage_path: None,
            package_storage_path: None,
            response_archive_path: None,
            status: EmissionStatus::Pending,
            authority_code: None,
            authority_message: None,
            retry_count,
            created_at: Utc::now(),
        }
    }

    /// Record the signed content hash and artifact paths.
    pub fn attach_artifacts(
        &mut self,
        content_hash: impl Into<String>,
        xml_path: impl Into<String>,
        package_path: impl Into<String>,
    ) -> Result<(), CpeError> {
        self.ensure_pending(EmissionStatus::Pending)?;
        self.content_hash = content_hash.into();
        self.xml_storage_path = Some(xml_path.into());
        self.package_storage_path = Some(package_path.into());
        Ok(())
    }

    /// PENDING → ACCEPTED.
    pub fn accept(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        archive_path: Option<String>,
    ) -> Result<(), CpeError> {
        self.ensure_pending(EmissionStatus::Accepted)?;
        self.status = EmissionStatus::Accepted;
        self.authority_code = Some(code.into());
        self.authority_message = Some(truncate_diagnostic(&message.into()));
        self.response_archive_path = archive_path;
        Ok(())
    }

    /// PENDING → REJECTED.
    pub fn reject(
        &mut self,
        code: impl Into<String>,
        message: impl Into<String>,
        archive_path: Option<String>,
    ) -> Result<(), CpeError> {
        self.ensure_pending(EmissionStatus::Rejected)?;
        self.status = EmissionStatus::Rejected;
        self.authority_code = Some(code.into());
        self.authority_message = Some(truncate_diagnostic(&message.into()));
        self.response_archive_path = archive_path;
        Ok(())
    }

    /// PENDING → ERROR. The message is truncated to [`MAX_DIAGNOSTIC_LEN`].
    pub fn fail(&mut self, code: Option<String>, message: &str) -> Result<(), CpeError> {
        self.ensure_pending(EmissionStatus::Error)?;
        self.status = EmissionStatus::Error;
        self.authority_code = code;
        self.authority_message = Some(truncate_diagnostic(message));
        Ok(())
    }

    fn ensure_pending(&self, to: EmissionStatus) -> Result<(), CpeError> {
        if self.status == EmissionStatus::Pending {
            Ok(())
        } else {
            Err(CpeError::InvalidTransition {
                from: self.status,
                to,
            })
        }
    }
}

/// Cut a diagnostic to [`MAX_DIAGNOSTIC_LEN`] characters on a char boundary.
pub fn truncate_diagnostic(message: &str) -> String {
    match message.char_indices().nth(MAX_DIAGNOSTIC_LEN) {
        Some((idx, _)) => message[..idx].to_string(),
        None => message.to_string(),
    }
}
