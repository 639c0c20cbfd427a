use super::error::{CpeError, ValidationError};
use super::types::DocumentType;

/// Highest correlative a series can carry (8 digits).
pub const MAX_CORRELATIVE: u32 = 99_999_999;

/// Width the correlative is zero-padded to in ids and filenames.
pub const CORRELATIVE_WIDTH: usize = 8;

/// A series plus allocated correlative, e.g. `F001` / `42`.
///
/// ```
/// use sunat_cpe::core::{DocumentNumber, DocumentType};
///
/// let n = DocumentNumber::new("F001", 42);
/// assert_eq!(n.document_id(), "F001-00000042");
/// assert_eq!(
///     n.filename("20123456789", DocumentType::Invoice),
///     "20123456789-01-F001-00000042"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNumber {
    series: String,
    number: u32,
}

impl DocumentNumber {
    pub fn new(series: impl Into<String>, number: u32) -> Self {
        Self {
            series: series.into(),
            number,
        }
    }

    pub fn series(&self) -> &str {
        &self.series
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    /// `{series}-{number:08}`, the value of `cbc:ID`.
    pub fn document_id(&self) -> String {
        format!(
            "{}-{:0>width$}",
            self.series,
            self.number,
            width = CORRELATIVE_WIDTH
        )
    }

    /// `{ruc}-{type}-{series}-{number:08}`, the base name of every artifact.
    pub fn filename(&self, ruc: &str, document_type: DocumentType) -> String {
        format!("{}-{}-{}", ruc, document_type.code(), self.document_id())
    }

    /// Parse a `F001-00000042` style id.
    pub fn parse(document_id: &str) -> Result<Self, CpeError> {
        let (series, number) = document_id.split_once('-').ok_or_else(|| {
            CpeError::Validation(format!("document id '{document_id}' has no '-' separator"))
        })?;
        if number.is_empty() || number.len() > CORRELATIVE_WIDTH {
            return Err(CpeError::Validation(format!(
                "document id '{document_id}' has an invalid correlative"
            )));
        }
        let number: u32 = number.parse().map_err(|_| {
            CpeError::Validation(format!(
                "document id '{document_id}' has a non-numeric correlative"
            ))
        })?;
        Ok(Self::new(series, number))
    }
}

impl std::fmt::Display for DocumentNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.document_id())
    }
}

/// Validate a series for a document type.
///
/// Series are four alphanumeric characters. Invoices (and notes against
/// them) start with `F`, receipts (and notes against them) with `B`.
pub fn validate_series(series: &str, document_type: DocumentType) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if series.len() != 4 || !series.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push(ValidationError::with_rule(
            "series",
            format!("series '{series}' must be exactly 4 alphanumeric characters"),
            "1001",
        ));
        return errors;
    }

    let first = series.as_bytes()[0].to_ascii_uppercase();
    let ok = match document_type {
        DocumentType::Invoice => first == b'F',
        DocumentType::Receipt => first == b'B',
        DocumentType::CreditNote | DocumentType::DebitNote => first == b'F' || first == b'B',
    };
    if !ok {
        errors.push(ValidationError::with_rule(
            "series",
            format!(
                "series '{series}' is not valid for document type {}",
                document_type.code()
            ),
            "1001",
        ));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_pads_to_eight_digits() {
        let n = DocumentNumber::new("F001", 42);
        assert_eq!(
            n.filename("20123456789", DocumentType::Invoice),
            "20123456789-01-F001-00000042"
        );
        let n = DocumentNumber::new("B001", MAX_CORRELATIVE);
        assert_eq!(n.document_id(), "B001-99999999");
    }

    #[test]
    fn parse_document_id() {
        let n = DocumentNumber::parse("FC01-00000007").unwrap();
        assert_eq!(n.series(), "FC01");
        assert_eq!(n.number(), 7);
        assert!(DocumentNumber::parse("F00100000007").is_err());
        assert!(DocumentNumber::parse("F001-ABC").is_err());
        assert!(DocumentNumber::parse("F001-123456789").is_err());
    }

    #[test]
    fn series_rules() {
        assert!(validate_series("F001", DocumentType::Invoice).is_empty());
        assert!(validate_series("B001", DocumentType::Receipt).is_empty());
        assert!(validate_series("FC01", DocumentType::CreditNote).is_empty());
        assert!(validate_series("BD01", DocumentType::DebitNote).is_empty());
        assert_eq!(validate_series("B001", DocumentType::Invoice).len(), 1);
        assert_eq!(validate_series("F01", DocumentType::Invoice).len(), 1);
        assert_eq!(validate_series("F-01", DocumentType::Invoice).len(), 1);
    }

    #[test]
    fn default_series_are_valid() {
        for t in [
            DocumentType::Invoice,
            DocumentType::Receipt,
            DocumentType::CreditNote,
            DocumentType::DebitNote,
        ] {
            assert!(validate_series(t.default_series(), t).is_empty());
        }
    }
}
