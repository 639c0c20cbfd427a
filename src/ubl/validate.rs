use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use super::document::join;
use crate::core::*;

/// Check every builder input, including that the breakdown belongs to
/// these lines. Any violation is a structural build failure.
pub fn check_inputs(
    header: &DocumentHeader,
    issuer: &Issuer,
    customer: &Customer,
    lines: &[InvoiceLine],
    breakdown: &MonetaryBreakdown,
) -> Result<(), CpeError> {
    let mut errors = validate_document(header, issuer, customer, lines);
    errors.extend(validate_breakdown(breakdown));
    if breakdown.lines.len() != lines.len() {
        errors.push(ValidationError::new(
            "breakdown.lines",
            format!(
                "breakdown has {} lines but the document has {}",
                breakdown.lines.len(),
                lines.len()
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(CpeError::Builder(join(&errors)))
    }
}

/// Elements every document must carry, with the rejection code the
/// authority answers when one is missing.
const REQUIRED: &[(&str, &str)] = &[
    ("UBLVersionID", "2075"),
    ("CustomizationID", "2073"),
    ("ID", "1001"),
    ("IssueDate", "1009"),
    ("DocumentCurrencyCode", "2070"),
    ("RegistrationName", "1037"),
    ("CompanyID", "1006"),
    ("AddressTypeCode", "3030"),
    ("TaxTotal", "2956"),
    ("LegalMonetaryTotal", "2062"),
    ("LineExtensionAmount", "2031"),
    ("TaxInclusiveAmount", "2062"),
    ("PayableAmount", "2062"),
];

/// Check rendered XML for the elements the authority requires.
///
/// Text-bearing elements must also be non-empty. Returns all violations.
pub fn validate_rendered(xml: &str, shape: DocumentShape) -> Result<Vec<ValidationError>, CpeError> {
    let index = index_elements(xml)?;
    let mut errors = Vec::new();

    for (name, rule) in REQUIRED {
        match index.get(*name) {
            None => errors.push(ValidationError::with_rule(
                *name,
                "required element is missing",
                *rule,
            )),
            Some(text) if text.is_empty() && !is_aggregate(name) => {
                errors.push(ValidationError::with_rule(
                    *name,
                    "required element is empty",
                    *rule,
                ));
            }
            Some(_) => {}
        }
    }

    let (root, line) = match shape {
        DocumentShape::Invoice => ("Invoice", "InvoiceLine"),
        DocumentShape::CreditNote => ("CreditNote", "CreditNoteLine"),
    };
    if !index.contains_key(root) {
        errors.push(ValidationError::new(root, "root element is missing"));
    }
    if !index.contains_key(line) {
        errors.push(ValidationError::with_rule(
            line,
            "document has no lines",
            "2023",
        ));
    }
    if shape == DocumentShape::CreditNote {
        for name in ["DiscrepancyResponse", "BillingReference"] {
            if !index.contains_key(name) {
                errors.push(ValidationError::with_rule(
                    name,
                    "required element is missing",
                    "2524",
                ));
            }
        }
    }

    Ok(errors)
}

fn is_aggregate(name: &str) -> bool {
    matches!(name, "TaxTotal" | "LegalMonetaryTotal")
}

/// Map each local element name to the text of its first occurrence.
fn index_elements(xml: &str) -> Result<BTreeMap<String, String>, CpeError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut index = BTreeMap::new();
    let mut current: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                let first = !index.contains_key(&name);
                if first {
                    index.insert(name.clone(), String::new());
                }
                current = first.then_some(name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                index.entry(name).or_default();
                current = None;
            }
            Ok(Event::Text(ref e)) => {
                if let Some(name) = current.take() {
                    let text = e
                        .unescape()
                        .map_err(|e| CpeError::Xml(format!("XML text error: {e}")))?;
                    index.insert(name, text.trim().to_string());
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(CpeError::Xml(format!(
                    "XML parse error at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    Ok(index)
}
