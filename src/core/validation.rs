use rust_decimal::Decimal;

use super::catalogs;
use super::error::ValidationError;
use super::numbering::{DocumentNumber, MAX_CORRELATIVE, validate_series};
use super::tax::{MAX_QUANTITY, MAX_UNIT_PRICE};
use super::types::*;

/// Maximum length of a line description.
pub const MAX_DESCRIPTION_LEN: usize = 500;

/// Validate every input the builder consumes.
/// Returns all validation errors found (not just the first).
pub fn validate_document(
    header: &DocumentHeader,
    issuer: &Issuer,
    customer: &Customer,
    lines: &[InvoiceLine],
) -> Vec<ValidationError> {
    let mut errors = validate_header(header);
    errors.extend(validate_issuer(issuer));
    errors.extend(validate_customer(customer, header.document_type));
    errors.extend(validate_lines(lines));
    errors
}

/// Header checks: series, correlative range, currency, note reference.
pub fn validate_header(header: &DocumentHeader) -> Vec<ValidationError> {
    let mut errors = validate_series(&header.series, header.document_type);

    if header.number == 0 || header.number > MAX_CORRELATIVE {
        errors.push(ValidationError::new(
            "number",
            format!("correlative {} must be in 1..={MAX_CORRELATIVE}", header.number),
        ));
    }

    errors.extend(validate_currency(&header.currency));

    if header.operation_type.len() != 4 || !is_digits(&header.operation_type) {
        errors.push(ValidationError::new(
            "operation_type",
            format!(
                "operation type '{}' must be a 4-digit catalog 51 code",
                header.operation_type
            ),
        ));
    }

    errors.extend(validate_note_reference(
        header.document_type,
        header.reference.as_ref(),
    ));

    errors
}

/// Issuer checks. A missing registration address type code is rejected by
/// the authority with error 3030, so it is caught here.
pub fn validate_issuer(issuer: &Issuer) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if issuer.ruc.len() != 11 || !is_digits(&issuer.ruc) {
        errors.push(ValidationError::with_rule(
            "issuer.ruc",
            format!("RUC '{}' must be 11 digits", issuer.ruc),
            "1034",
        ));
    }
    if issuer.legal_name.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "issuer.legal_name",
            "legal name must not be empty",
            "1037",
        ));
    }

    let addr = &issuer.address;
    if addr.address_type_code.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "issuer.address.address_type_code",
            "registration address type code is required",
            "3030",
        ));
    } else if addr.address_type_code.len() != 4 || !is_digits(&addr.address_type_code) {
        errors.push(ValidationError::with_rule(
            "issuer.address.address_type_code",
            format!(
                "address type code '{}' must be 4 digits",
                addr.address_type_code
            ),
            "3030",
        ));
    }
    if addr.ubigeo.len() != 6 || !is_digits(&addr.ubigeo) {
        errors.push(ValidationError::with_rule(
            "issuer.address.ubigeo",
            format!("ubigeo '{}' must be 6 digits", addr.ubigeo),
            "4041",
        ));
    }
    if addr.country_code.len() != 2 || !addr.country_code.chars().all(|c| c.is_ascii_uppercase())
    {
        errors.push(ValidationError::new(
            "issuer.address.country_code",
            format!("country code '{}' must be ISO 3166-1 alpha-2", addr.country_code),
        ));
    }

    errors
}

/// Customer checks. Invoices (and notes in an `F` series) require a RUC
/// customer; that is enforced in [`validate_customer_for_series`].
pub fn validate_customer(customer: &Customer, document_type: DocumentType) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if !catalogs::is_known_identity_type(&customer.identity_type) {
        errors.push(ValidationError::with_rule(
            "customer.identity_type",
            format!(
                "identity type '{}' is not in catalog 06",
                customer.identity_type
            ),
            "2800",
        ));
    }

    if document_type == DocumentType::Invoice
        && customer.identity_type != catalogs::IDENTITY_RUC
    {
        errors.push(ValidationError::with_rule(
            "customer.identity_type",
            "an invoice requires a customer identified by RUC",
            "2800",
        ));
    }

    if let Some(len) = catalogs::identity_number_length(&customer.identity_type) {
        if customer.identity_number.len() != len || !is_digits(&customer.identity_number) {
            errors.push(ValidationError::with_rule(
                "customer.identity_number",
                format!(
                    "identity number '{}' must be {len} digits",
                    customer.identity_number
                ),
                "2801",
            ));
        }
    }

    if customer.identity_type != catalogs::IDENTITY_NONE {
        if customer.identity_number.trim().is_empty() {
            errors.push(ValidationError::new(
                "customer.identity_number",
                "identity number must not be empty",
            ));
        }
        if customer.name.trim().is_empty() {
            errors.push(ValidationError::with_rule(
                "customer.name",
                "customer name must not be empty",
                "2021",
            ));
        }
    }

    errors
}

/// Notes issued in an `F` series amend invoices and therefore need a RUC customer.
pub fn validate_customer_for_series(customer: &Customer, series: &str) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if series.starts_with('F') && customer.identity_type != catalogs::IDENTITY_RUC {
        errors.push(ValidationError::with_rule(
            "customer.identity_type",
            format!("series '{series}' requires a customer identified by RUC"),
            "2800",
        ));
    }
    errors
}

/// Line checks.
pub fn validate_lines(lines: &[InvoiceLine]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if lines.is_empty() {
        errors.push(ValidationError::with_rule(
            "lines",
            "a document must have at least one line",
            "2023",
        ));
    }

    for (i, line) in lines.iter().enumerate() {
        let prefix = format!("lines[{i}]");

        let description = line.description.trim();
        if description.is_empty() {
            errors.push(ValidationError::with_rule(
                format!("{prefix}.description"),
                "description must not be empty",
                "2026",
            ));
        } else if description.chars().count() > MAX_DESCRIPTION_LEN {
            errors.push(ValidationError::new(
                format!("{prefix}.description"),
                format!("description exceeds {MAX_DESCRIPTION_LEN} characters"),
            ));
        }

        if line.quantity < Decimal::ZERO {
            errors.push(ValidationError::with_rule(
                format!("{prefix}.quantity"),
                format!("quantity {} must not be negative", line.quantity),
                "2024",
            ));
        } else if line.quantity > MAX_QUANTITY {
            errors.push(ValidationError::new(
                format!("{prefix}.quantity"),
                format!("quantity {} exceeds {MAX_QUANTITY}", line.quantity),
            ));
        }
        if line.unit_price < Decimal::ZERO {
            errors.push(ValidationError::new(
                format!("{prefix}.unit_price"),
                format!("unit price {} must not be negative", line.unit_price),
            ));
        } else if line.unit_price > MAX_UNIT_PRICE {
            errors.push(ValidationError::new(
                format!("{prefix}.unit_price"),
                format!("unit price {} exceeds {MAX_UNIT_PRICE}", line.unit_price),
            ));
        }
        if !catalogs::is_known_unit_code(&line.unit_code) {
            errors.push(ValidationError::with_rule(
                format!("{prefix}.unit_code"),
                format!("unit code '{}' is not in catalog 03", line.unit_code),
                "2883",
            ));
        }
    }

    errors
}

/// Credit and debit notes must reference the amended document; other types must not.
pub fn validate_note_reference(
    document_type: DocumentType,
    reference: Option<&NoteReference>,
) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let Some(reference) = reference else {
        if document_type.is_note() {
            errors.push(ValidationError::with_rule(
                "reference",
                "credit and debit notes must reference the amended document",
                "2524",
            ));
        }
        return errors;
    };

    if !document_type.is_note() {
        errors.push(ValidationError::new(
            "reference",
            format!(
                "document type {} cannot carry a note reference",
                document_type.code()
            ),
        ));
        return errors;
    }

    if reference.document_type.is_note() {
        errors.push(ValidationError::new(
            "reference.document_type",
            "a note must amend an invoice or a receipt",
        ));
    }
    if let Err(e) = DocumentNumber::parse(&reference.document_id) {
        errors.push(ValidationError::new("reference.document_id", e.to_string()));
    }

    let known = match document_type {
        DocumentType::CreditNote => catalogs::is_known_credit_note_reason(&reference.reason_code),
        _ => catalogs::is_known_debit_note_reason(&reference.reason_code),
    };
    if !known {
        errors.push(ValidationError::with_rule(
            "reference.reason_code",
            format!("reason code '{}' is not valid", reference.reason_code),
            "3203",
        ));
    }
    if reference.description.trim().is_empty() {
        errors.push(ValidationError::with_rule(
            "reference.description",
            "reason description must not be empty",
            "2136",
        ));
    }

    errors
}

/// Currency must be a 3-letter code the authority accepts.
pub fn validate_currency(currency: &str) -> Vec<ValidationError> {
    if catalogs::is_known_currency(currency) {
        Vec::new()
    } else {
        vec![ValidationError::with_rule(
            "currency",
            format!("currency '{currency}' is not accepted"),
            "3088",
        )]
    }
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn issuer() -> Issuer {
        Issuer {
            ruc: "20123456789".into(),
            legal_name: "LAPIZ Y PAPEL S.A.C.".into(),
            trade_name: None,
            address: RegistrationAddress {
                ubigeo: "150101".into(),
                address_type_code: "0000".into(),
                district: "LIMA".into(),
                province: "LIMA".into(),
                department: "LIMA".into(),
                line: "AV. ABANCAY 123".into(),
                country_code: "PE".into(),
            },
        }
    }

    fn ruc_customer() -> Customer {
        Customer {
            identity_type: "6".into(),
            identity_number: "20987654321".into(),
            name: "CLIENTE SAC".into(),
            address: None,
        }
    }

    fn line() -> InvoiceLine {
        InvoiceLine {
            description: "Lapicero azul".into(),
            quantity: dec!(2),
            unit_price: dec!(1.50),
            unit_code: "NIU".into(),
            tax_affectation: TaxAffectation::Taxed,
            price_includes_tax: true,
            product_code: None,
        }
    }

    fn header(document_type: DocumentType, series: &str) -> DocumentHeader {
        DocumentHeader {
            document_type,
            series: series.into(),
            number: 1,
            issue_date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            currency: "PEN".into(),
            operation_type: "0101".into(),
            environment: SunatEnvironment::Beta,
            reference: None,
        }
    }

    #[test]
    fn valid_document_passes() {
        let errors = validate_document(
            &header(DocumentType::Invoice, "F001"),
            &issuer(),
            &ruc_customer(),
            &[line()],
        );
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn missing_address_type_code_is_3030() {
        let mut i = issuer();
        i.address.address_type_code = String::new();
        let errors = validate_issuer(&i);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].rule.as_deref(), Some("3030"));
    }

    #[test]
    fn invoice_requires_ruc_customer() {
        let c = Customer {
            identity_type: "1".into(),
            identity_number: "12345678".into(),
            name: "JUAN PEREZ".into(),
            address: None,
        };
        assert!(validate_customer(&c, DocumentType::Receipt).is_empty());
        let errors = validate_customer(&c, DocumentType::Invoice);
        assert!(errors.iter().any(|e| e.rule.as_deref() == Some("2800")));
    }

    #[test]
    fn anonymous_receipt_customer() {
        let c = Customer {
            identity_type: "0".into(),
            identity_number: "-".into(),
            name: String::new(),
            address: None,
        };
        assert!(validate_customer(&c, DocumentType::Receipt).is_empty());
    }

    #[test]
    fn dni_length_checked() {
        let c = Customer {
            identity_type: "1".into(),
            identity_number: "1234".into(),
            name: "ANA".into(),
            address: None,
        };
        let errors = validate_customer(&c, DocumentType::Receipt);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "customer.identity_number");
    }

    #[test]
    fn lines_collect_all_errors() {
        assert_eq!(validate_lines(&[]).len(), 1);

        let mut bad = line();
        bad.description = " ".into();
        bad.quantity = dec!(-1);
        bad.unit_price = dec!(-0.01);
        bad.unit_code = "XXX".into();
        let errors = validate_lines(&[line(), bad]);
        assert_eq!(errors.len(), 4);
        assert!(errors.iter().all(|e| e.field.starts_with("lines[1]")));
    }

    #[test]
    fn oversized_lines_are_refused() {
        let mut big = line();
        big.quantity = dec!(1000000000000000);
        big.unit_price = Decimal::MAX;
        let errors = validate_lines(&[big]);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field, "lines[0].quantity");
        assert_eq!(errors[1].field, "lines[0].unit_price");

        let mut edge = line();
        edge.quantity = MAX_QUANTITY;
        edge.unit_price = MAX_UNIT_PRICE;
        assert!(validate_lines(&[edge]).is_empty());
    }

    #[test]
    fn notes_need_reference() {
        let errors = validate_header(&header(DocumentType::CreditNote, "FC01"));
        assert!(errors.iter().any(|e| e.field == "reference"));

        let mut h = header(DocumentType::CreditNote, "FC01");
        h.reference = Some(NoteReference {
            document_type: DocumentType::Invoice,
            document_id: "F001-00000042".into(),
            reason_code: "07".into(),
            description: "Devolucion por item".into(),
        });
        assert!(validate_header(&h).is_empty());

        h.document_type = DocumentType::DebitNote;
        let errors = validate_header(&h);
        assert!(errors.iter().any(|e| e.field == "reference.reason_code"));
    }

    #[test]
    fn credit_note_series_needs_ruc_customer() {
        let c = Customer {
            identity_type: "1".into(),
            identity_number: "12345678".into(),
            name: "ANA".into(),
            address: None,
        };
        assert_eq!(validate_customer_for_series(&c, "FC01").len(), 1);
        assert!(validate_customer_for_series(&c, "BC01").is_empty());
    }
}
