//! UBL 2.1 rendering for SUNAT electronic documents.
//!
//! Two root shapes are produced: `Invoice` (facturas and boletas) and
//! `CreditNote` (credit and debit notes). Rendering is a pure function of
//! its inputs, so identical inputs always give byte-identical XML.
//!
//! # Example
//!
//! ```no_run
//! use sunat_cpe::core::*;
//! use sunat_cpe::ubl;
//!
//! # let (header, issuer, customer, lines): (DocumentHeader, Issuer, Customer, Vec<InvoiceLine>) = todo!();
//! let breakdown = compute_breakdown(&lines, DEFAULT_IGV_RATE).unwrap();
//! let xml = ubl::build(&header, &issuer, &customer, &lines, &breakdown).unwrap();
//! ```

mod document;
mod validate;
pub(crate) mod xml_utils;

pub use document::build;
pub use validate::{check_inputs, validate_rendered};
pub use xml_utils::{first_element_text, format_amount, format_price};

/// `cbc:UBLVersionID`.
pub const UBL_VERSION: &str = "2.1";

/// `cbc:CustomizationID` for SUNAT UBL 2.1 documents.
pub const CUSTOMIZATION_ID: &str = "2.0";

/// Id of the signature the external signer inserts.
pub const SIGNATURE_ID: &str = "SignatureSP";

/// UBL 2.1 namespace URIs.
pub mod ns {
    pub const INVOICE: &str = "urn:oasis:names:specification:ubl:schema:xsd:Invoice-2";
    pub const CREDIT_NOTE: &str = "urn:oasis:names:specification:ubl:schema:xsd:CreditNote-2";
    pub const CAC: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonAggregateComponents-2";
    pub const CBC: &str = "urn:oasis:names:specification:ubl:schema:xsd:CommonBasicComponents-2";
    pub const EXT: &str =
        "urn:oasis:names:specification:ubl:schema:xsd:CommonExtensionComponents-2";
    pub const DS: &str = "http://www.w3.org/2000/09/xmldsig#";
}

/// SUNAT catalog URIs used as list/scheme attributes.
pub(crate) mod catalog_uri {
    pub const CAT01: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo01";
    pub const CAT05: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo05";
    pub const CAT06: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo06";
    pub const CAT07: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo07";
    pub const CAT09: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo09";
    pub const CAT10: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo10";
    pub const CAT16: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo16";
    pub const CAT17: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo17";
    pub const CAT51: &str = "urn:pe:gob:sunat:cpe:see:gem:catalogos:catalogo51";
}
