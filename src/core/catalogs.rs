//! SUNAT code catalogs.
//!
//! Lookups for the catalogs the emission pipeline validates against.
//! Only the subset a point-of-sale issuer realistically emits is listed;
//! each list is sorted for binary search.

/// Check whether `code` is a known catalog 03 unit of measure
/// (UN/ECE Rec 20 subset accepted by SUNAT).
pub fn is_known_unit_code(code: &str) -> bool {
    UNIT_CODES.binary_search(&code).is_ok()
}

/// Check whether `code` is a known catalog 06 identity document type.
pub fn is_known_identity_type(code: &str) -> bool {
    IDENTITY_DOCUMENT_TYPES.binary_search(&code).is_ok()
}

/// Check whether `code` is a known catalog 09 credit note reason.
pub fn is_known_credit_note_reason(code: &str) -> bool {
    CREDIT_NOTE_REASONS.binary_search(&code).is_ok()
}

/// Check whether `code` is a known catalog 10 debit note reason.
pub fn is_known_debit_note_reason(code: &str) -> bool {
    DEBIT_NOTE_REASONS.binary_search(&code).is_ok()
}

/// Check whether `code` is a currency SUNAT accepts for domestic documents.
pub fn is_known_currency(code: &str) -> bool {
    CURRENCIES.binary_search(&code).is_ok()
}

/// Catalog 06 code for RUC (taxpayer registry number).
pub const IDENTITY_RUC: &str = "6";
/// Catalog 06 code for DNI (national identity card).
pub const IDENTITY_DNI: &str = "1";
/// Catalog 06 code used for anonymous receipt customers.
pub const IDENTITY_NONE: &str = "0";

/// Expected identity document number length, where the type fixes one.
pub fn identity_number_length(code: &str) -> Option<usize> {
    match code {
        IDENTITY_RUC => Some(11),
        IDENTITY_DNI => Some(8),
        _ => None,
    }
}

/// Catalog 03: units of measure (sorted).
static UNIT_CODES: &[&str] = &[
    "4A",  // Bobbin
    "BG",  // Bag
    "BJ",  // Bucket
    "BO",  // Bottle
    "BX",  // Box
    "CEN", // Hundred
    "CMK", // Square centimetre
    "CMT", // Centimetre
    "DZN", // Dozen
    "GLL", // Gallon
    "GRM", // Gram
    "KGM", // Kilogram
    "KT",  // Kit
    "LTR", // Litre
    "MIL", // Thousand
    "MTK", // Square metre
    "MTQ", // Cubic metre
    "MTR", // Metre
    "NIU", // Unit (goods)
    "PK",  // Pack
    "PR",  // Pair
    "SET", // Set
    "TNE", // Tonne
    "UM",  // Million units
    "ZZ",  // Unit (services)
];

/// Catalog 06: identity document types (sorted).
static IDENTITY_DOCUMENT_TYPES: &[&str] = &[
    "0", // Non-domiciled, no RUC
    "1", // DNI
    "4", // Foreigner's card
    "6", // RUC
    "7", // Passport
    "A", // Diplomatic ID
    "B", // Foreign identity document
    "C", // TIN
    "D", // IN
    "E", // Andean immigration card
];

/// Catalog 09: credit note reasons (sorted).
static CREDIT_NOTE_REASONS: &[&str] = &[
    "01", // Cancellation of the operation
    "02", // Cancellation due to RUC error
    "03", // Correction of description
    "04", // Global discount
    "05", // Item discount
    "06", // Total refund
    "07", // Item refund
    "08", // Bonus
    "09", // Decrease in value
    "10", // Other concepts
    "11", // Export adjustments
    "12", // IVAP adjustments
    "13", // Correction of amount/payment date
];

/// Catalog 10: debit note reasons (sorted).
static DEBIT_NOTE_REASONS: &[&str] = &[
    "01", // Late payment interest
    "02", // Increase in value
    "03", // Penalties / other concepts
    "11", // Export adjustments
    "12", // IVAP adjustments
];

static CURRENCIES: &[&str] = &["EUR", "PEN", "USD"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_units() {
        assert!(is_known_unit_code("NIU"));
        assert!(is_known_unit_code("ZZ"));
        assert!(is_known_unit_code("KGM"));
        assert!(!is_known_unit_code("C62X"));
        assert!(!is_known_unit_code(""));
    }

    #[test]
    fn identity_types_and_lengths() {
        assert!(is_known_identity_type("6"));
        assert!(is_known_identity_type("1"));
        assert!(!is_known_identity_type("9"));
        assert_eq!(identity_number_length("6"), Some(11));
        assert_eq!(identity_number_length("1"), Some(8));
        assert_eq!(identity_number_length("7"), None);
    }

    #[test]
    fn note_reasons() {
        assert!(is_known_credit_note_reason("01"));
        assert!(is_known_credit_note_reason("13"));
        assert!(!is_known_credit_note_reason("14"));
        assert!(is_known_debit_note_reason("02"));
        assert!(!is_known_debit_note_reason("04"));
    }

    #[test]
    fn lists_are_sorted() {
        for list in [
            UNIT_CODES,
            IDENTITY_DOCUMENT_TYPES,
            CREDIT_NOTE_REASONS,
            DEBIT_NOTE_REASONS,
            CURRENCIES,
        ] {
            for window in list.windows(2) {
                assert!(
                    window[0] < window[1],
                    "catalog not sorted: {} >= {}",
                    window[0],
                    window[1]
                );
            }
        }
    }
}
