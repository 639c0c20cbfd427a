use rust_decimal::Decimal;

use super::catalog_uri::*;
use super::validate::{check_inputs, validate_rendered};
use super::xml_utils::{XmlWriter, format_amount};
use super::{CUSTOMIZATION_ID, SIGNATURE_ID, UBL_VERSION, ns};
use crate::core::*;

const SUNAT: &str = "PE:SUNAT";
const UNECE: &str = "United Nations Economic Commission for Europe";

/// Render the UBL 2.1 document for one emission.
///
/// Inputs are checked before rendering and the output is checked for the
/// elements the authority requires, so a structurally incomplete document
/// fails here with [`CpeError::Builder`] instead of at transmission time.
pub fn build(
    header: &DocumentHeader,
    issuer: &Issuer,
    customer: &Customer,
    lines: &[InvoiceLine],
    breakdown: &MonetaryBreakdown,
) -> Result<String, CpeError> {
    check_inputs(header, issuer, customer, lines, breakdown)?;

    let shape = header.document_type.shape();
    let xml = render(header, issuer, customer, lines, breakdown, shape)?;

    let errors = validate_rendered(&xml, shape)?;
    if !errors.is_empty() {
        return Err(CpeError::Builder(join(&errors)));
    }
    Ok(xml)
}

pub(super) fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

fn render(
    header: &DocumentHeader,
    issuer: &Issuer,
    customer: &Customer,
    lines: &[InvoiceLine],
    breakdown: &MonetaryBreakdown,
    shape: DocumentShape,
) -> Result<String, CpeError> {
    let currency = header.currency.as_str();
    let mut w = XmlWriter::new()?;

    let (root_tag, root_ns) = match shape {
        DocumentShape::Invoice => ("Invoice", ns::INVOICE),
        DocumentShape::CreditNote => ("CreditNote", ns::CREDIT_NOTE),
    };
    w.start_element_with_attrs(
        root_tag,
        &[
            ("xmlns", root_ns),
            ("xmlns:cac", ns::CAC),
            ("xmlns:cbc", ns::CBC),
            ("xmlns:ds", ns::DS),
            ("xmlns:ext", ns::EXT),
        ],
    )?;

    // Filled by the signer.
    w.start_element("ext:UBLExtensions")?;
    w.start_element("ext:UBLExtension")?;
    w.empty_element("ext:ExtensionContent")?;
    w.end_element("ext:UBLExtension")?;
    w.end_element("ext:UBLExtensions")?;

    w.text_element("cbc:UBLVersionID", UBL_VERSION)?;
    w.text_element("cbc:CustomizationID", CUSTOMIZATION_ID)?;
    w.text_element_with_attrs(
        "cbc:ProfileID",
        &header.operation_type,
        &[
            ("schemeName", "Tipo de Operacion"),
            ("schemeAgencyName", SUNAT),
            ("schemeURI", CAT17),
        ],
    )?;
    w.text_element_with_attrs(
        "cbc:ProfileExecutionID",
        header.environment.profile_execution_id(),
        &[("schemeAgencyName", SUNAT)],
    )?;

    let number = DocumentNumber::new(&header.series, header.number);
    w.text_element("cbc:ID", &number.document_id())?;
    w.text_element("cbc:IssueDate", &header.issue_date.format("%Y-%m-%d").to_string())?;

    if shape == DocumentShape::Invoice {
        w.text_element_with_attrs(
            "cbc:InvoiceTypeCode",
            header.document_type.code(),
            &[
                ("listID", header.operation_type.as_str()),
                ("listAgencyName", SUNAT),
                ("listName", "Tipo de Documento"),
                ("listURI", CAT01),
                ("listSchemeURI", CAT51),
            ],
        )?;
    }

    w.text_element_with_attrs(
        "cbc:DocumentCurrencyCode",
        currency,
        &[
            ("listID", "ISO 4217 Alpha"),
            ("listName", "Currency"),
            ("listAgencyName", UNECE),
        ],
    )?;

    if let Some(reference) = &header.reference {
        write_note_reference(&mut w, header.document_type, reference)?;
    }

    write_signature(&mut w, issuer)?;
    write_supplier(&mut w, issuer)?;
    write_customer(&mut w, customer)?;
    write_tax_total(&mut w, lines, breakdown, currency)?;

    w.start_element("cac:LegalMonetaryTotal")?;
    w.amount_element("cbc:LineExtensionAmount", breakdown.subtotal, currency)?;
    w.amount_element("cbc:TaxInclusiveAmount", breakdown.total, currency)?;
    w.amount_element("cbc:PayableAmount", breakdown.total, currency)?;
    w.end_element("cac:LegalMonetaryTotal")?;

    for (i, (line, lb)) in lines.iter().zip(&breakdown.lines).enumerate() {
        write_line(&mut w, i + 1, line, lb, currency, shape)?;
    }

    w.end_element(root_tag)?;
    w.into_string()
}

fn write_note_reference(
    w: &mut XmlWriter,
    document_type: DocumentType,
    reference: &NoteReference,
) -> Result<(), CpeError> {
    let (list_name, list_uri) = match document_type {
        DocumentType::DebitNote => ("Tipo de nota de debito", CAT10),
        _ => ("Tipo de nota de credito", CAT09),
    };

    w.start_element("cac:DiscrepancyResponse")?;
    w.text_element("cbc:ReferenceID", &reference.document_id)?;
    w.text_element_with_attrs(
        "cbc:ResponseCode",
        &reference.reason_code,
        &[
            ("listAgencyName", SUNAT),
            ("listName", list_name),
            ("listURI", list_uri),
        ],
    )?;
    w.text_element("cbc:Description", &reference.description)?;
    w.end_element("cac:DiscrepancyResponse")?;

    w.start_element("cac:BillingReference")?;
    w.start_element("cac:InvoiceDocumentReference")?;
    w.text_element("cbc:ID", &reference.document_id)?;
    w.text_element_with_attrs(
        "cbc:DocumentTypeCode",
        reference.document_type.code(),
        &[
            ("listAgencyName", SUNAT),
            ("listName", "Tipo de Documento"),
            ("listURI", CAT01),
        ],
    )?;
    w.end_element("cac:InvoiceDocumentReference")?;
    w.end_element("cac:BillingReference")?;
    Ok(())
}

fn write_signature(w: &mut XmlWriter, issuer: &Issuer) -> Result<(), CpeError> {
    let uri = format!("#{SIGNATURE_ID}");
    w.start_element("cac:Signature")?;
    w.text_element("cbc:ID", &format!("ID{SIGNATURE_ID}"))?;
    w.start_element("cac:SignatoryParty")?;
    w.start_element("cac:PartyIdentification")?;
    w.text_element("cbc:ID", &issuer.ruc)?;
    w.end_element("cac:PartyIdentification")?;
    w.start_element("cac:PartyName")?;
    w.text_element("cbc:Name", &issuer.legal_name)?;
    w.end_element("cac:PartyName")?;
    w.end_element("cac:SignatoryParty")?;
    w.start_element("cac:DigitalSignatureAttachment")?;
    w.start_element("cac:ExternalReference")?;
    w.text_element("cbc:URI", &uri)?;
    w.end_element("cac:ExternalReference")?;
    w.end_element("cac:DigitalSignatureAttachment")?;
    w.end_element("cac:Signature")?;
    Ok(())
}

fn identity_attrs(scheme_id: &str) -> [(&str, &str); 4] {
    [
        ("schemeID", scheme_id),
        ("schemeName", "Documento de Identidad"),
        ("schemeAgencyName", SUNAT),
        ("schemeURI", CAT06),
    ]
}

fn write_party_tax_scheme_close(w: &mut XmlWriter) -> Result<(), CpeError> {
    w.start_element("cac:TaxScheme")?;
    w.text_element("cbc:ID", "-")?;
    w.end_element("cac:TaxScheme")?;
    w.end_element("cac:PartyTaxScheme")?;
    Ok(())
}

fn write_country(w: &mut XmlWriter, code: &str) -> Result<(), CpeError> {
    w.start_element("cac:Country")?;
    w.text_element_with_attrs(
        "cbc:IdentificationCode",
        code,
        &[
            ("listID", "ISO 3166-1"),
            ("listAgencyName", UNECE),
            ("listName", "Country"),
        ],
    )?;
    w.end_element("cac:Country")?;
    Ok(())
}

fn write_supplier(w: &mut XmlWriter, issuer: &Issuer) -> Result<(), CpeError> {
    let addr = &issuer.address;

    w.start_element("cac:AccountingSupplierParty")?;
    w.start_element("cac:Party")?;

    w.start_element("cac:PartyName")?;
    w.text_element(
        "cbc:Name",
        issuer.trade_name.as_deref().unwrap_or(&issuer.legal_name),
    )?;
    w.end_element("cac:PartyName")?;

    w.start_element("cac:PartyTaxScheme")?;
    w.text_element("cbc:RegistrationName", &issuer.legal_name)?;
    w.text_element_with_attrs(
        "cbc:CompanyID",
        &issuer.ruc,
        &identity_attrs(catalogs::IDENTITY_RUC),
    )?;

    w.start_element("cac:RegistrationAddress")?;
    w.text_element_with_attrs(
        "cbc:ID",
        &addr.ubigeo,
        &[("schemeName", "Ubigeos"), ("schemeAgencyName", "PE:INEI")],
    )?;
    w.text_element_with_attrs(
        "cbc:AddressTypeCode",
        &addr.address_type_code,
        &[
            ("listAgencyName", SUNAT),
            ("listName", "Establecimientos anexos"),
        ],
    )?;
    w.text_element("cbc:CitySubdivisionName", &addr.district)?;
    w.text_element("cbc:CityName", &addr.province)?;
    w.text_element("cbc:CountrySubentity", &addr.department)?;
    w.text_element("cbc:District", &addr.district)?;
    w.start_element("cac:AddressLine")?;
    w.text_element("cbc:Line", &addr.line)?;
    w.end_element("cac:AddressLine")?;
    write_country(w, &addr.country_code)?;
    w.end_element("cac:RegistrationAddress")?;
    write_party_tax_scheme_close(w)?;

    w.end_element("cac:Party")?;
    w.end_element("cac:AccountingSupplierParty")?;
    Ok(())
}

fn write_customer(w: &mut XmlWriter, customer: &Customer) -> Result<(), CpeError> {
    w.start_element("cac:AccountingCustomerParty")?;
    w.start_element("cac:Party")?;
    w.start_element("cac:PartyTaxScheme")?;
    w.text_element("cbc:RegistrationName", &customer.name)?;
    w.text_element_with_attrs(
        "cbc:CompanyID",
        &customer.identity_number,
        &identity_attrs(&customer.identity_type),
    )?;
    if let Some(address) = &customer.address {
        w.start_element("cac:RegistrationAddress")?;
        w.start_element("cac:AddressLine")?;
        w.text_element("cbc:Line", address)?;
        w.end_element("cac:AddressLine")?;
        write_country(w, "PE")?;
        w.end_element("cac:RegistrationAddress")?;
    }
    write_party_tax_scheme_close(w)?;
    w.end_element("cac:Party")?;
    w.end_element("cac:AccountingCustomerParty")?;
    Ok(())
}

fn write_tax_scheme(w: &mut XmlWriter, scheme: TaxScheme) -> Result<(), CpeError> {
    w.start_element("cac:TaxScheme")?;
    w.text_element_with_attrs(
        "cbc:ID",
        scheme.id,
        &[
            ("schemeName", "Codigo de tributos"),
            ("schemeAgencyName", SUNAT),
            ("schemeURI", CAT05),
        ],
    )?;
    w.text_element("cbc:Name", scheme.name)?;
    w.text_element("cbc:TaxTypeCode", scheme.type_code)?;
    w.end_element("cac:TaxScheme")?;
    Ok(())
}

const AFFECTATIONS: [TaxAffectation; 4] = [
    TaxAffectation::Taxed,
    TaxAffectation::Exonerated,
    TaxAffectation::Unaffected,
    TaxAffectation::Export,
];

/// One `cac:TaxTotal` with a `cac:TaxSubtotal` per affectation present.
fn write_tax_total(
    w: &mut XmlWriter,
    lines: &[InvoiceLine],
    breakdown: &MonetaryBreakdown,
    currency: &str,
) -> Result<(), CpeError> {
    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", breakdown.tax_amount, currency)?;

    for affectation in AFFECTATIONS {
        if !lines.iter().any(|l| l.tax_affectation == affectation) {
            continue;
        }
        let (base, tax) = match affectation {
            TaxAffectation::Taxed => (breakdown.taxed_base, breakdown.tax_amount),
            TaxAffectation::Exonerated => (breakdown.exonerated_base, Decimal::ZERO),
            TaxAffectation::Unaffected => (breakdown.unaffected_base, Decimal::ZERO),
            TaxAffectation::Export => (breakdown.export_base, Decimal::ZERO),
        };
        w.start_element("cac:TaxSubtotal")?;
        w.amount_element("cbc:TaxableAmount", base, currency)?;
        w.amount_element("cbc:TaxAmount", tax, currency)?;
        w.start_element("cac:TaxCategory")?;
        write_tax_scheme(w, affectation.scheme())?;
        w.end_element("cac:TaxCategory")?;
        w.end_element("cac:TaxSubtotal")?;
    }

    w.end_element("cac:TaxTotal")?;
    Ok(())
}

fn write_line(
    w: &mut XmlWriter,
    position: usize,
    line: &InvoiceLine,
    lb: &LineBreakdown,
    currency: &str,
    shape: DocumentShape,
) -> Result<(), CpeError> {
    let (line_tag, qty_tag) = match shape {
        DocumentShape::Invoice => ("cac:InvoiceLine", "cbc:InvoicedQuantity"),
        DocumentShape::CreditNote => ("cac:CreditNoteLine", "cbc:CreditedQuantity"),
    };

    w.start_element(line_tag)?;
    w.text_element("cbc:ID", &position.to_string())?;
    w.quantity_element(qty_tag, line.quantity, &line.unit_code)?;
    w.amount_element("cbc:LineExtensionAmount", lb.subtotal, currency)?;

    w.start_element("cac:PricingReference")?;
    w.start_element("cac:AlternativeConditionPrice")?;
    w.price_element("cbc:PriceAmount", lb.unit_price_with_tax, currency)?;
    w.text_element_with_attrs(
        "cbc:PriceTypeCode",
        "01",
        &[
            ("listName", "Tipo de Precio"),
            ("listAgencyName", SUNAT),
            ("listURI", CAT16),
        ],
    )?;
    w.end_element("cac:AlternativeConditionPrice")?;
    w.end_element("cac:PricingReference")?;

    w.start_element("cac:TaxTotal")?;
    w.amount_element("cbc:TaxAmount", lb.tax, currency)?;
    w.start_element("cac:TaxSubtotal")?;
    w.amount_element("cbc:TaxableAmount", lb.subtotal, currency)?;
    w.amount_element("cbc:TaxAmount", lb.tax, currency)?;
    w.start_element("cac:TaxCategory")?;
    w.text_element("cbc:Percent", &format_amount(lb.rate * Decimal::ONE_HUNDRED))?;
    w.text_element_with_attrs(
        "cbc:TaxExemptionReasonCode",
        line.tax_affectation.code(),
        &[
            ("listAgencyName", SUNAT),
            ("listName", "Afectacion del IGV"),
            ("listURI", CAT07),
        ],
    )?;
    write_tax_scheme(w, line.tax_affectation.scheme())?;
    w.end_element("cac:TaxCategory")?;
    w.end_element("cac:TaxSubtotal")?;
    w.end_element("cac:TaxTotal")?;

    w.start_element("cac:Item")?;
    w.text_element("cbc:Description", line.description.trim())?;
    if let Some(code) = &line.product_code {
        w.start_element("cac:SellersItemIdentification")?;
        w.text_element("cbc:ID", code)?;
        w.end_element("cac:SellersItemIdentification")?;
    }
    w.end_element("cac:Item")?;

    w.start_element("cac:Price")?;
    w.price_element("cbc:PriceAmount", lb.unit_value, currency)?;
    w.end_element("cac:Price")?;

    w.end_element(line_tag)?;
    Ok(())
}
