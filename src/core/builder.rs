use rust_decimal::Decimal;

use super::catalogs;
use super::types::*;

/// Builder for the issuing company.
///
/// ```
/// use sunat_cpe::core::*;
///
/// let issuer = IssuerBuilder::new("20123456789", "LAPIZ Y PAPEL S.A.C.")
///     .trade_name("LAPIZ Y PAPEL")
///     .address(AddressBuilder::new("150101", "AV. ABANCAY 123").district("LIMA").build())
///     .build();
/// assert_eq!(issuer.address.address_type_code, "0000");
/// ```
pub struct IssuerBuilder {
    ruc: String,
    legal_name: String,
    trade_name: Option<String>,
    address: Option<RegistrationAddress>,
}

impl IssuerBuilder {
    pub fn new(ruc: impl Into<String>, legal_name: impl Into<String>) -> Self {
        Self {
            ruc: ruc.into(),
            legal_name: legal_name.into(),
            trade_name: None,
            address: None,
        }
    }

    pub fn trade_name(mut self, name: impl Into<String>) -> Self {
        self.trade_name = Some(name.into());
        self
    }

    pub fn address(mut self, address: RegistrationAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Build the issuer. Without an explicit address, an empty Lima
    /// address is used; validation will flag its missing ubigeo.
    pub fn build(self) -> Issuer {
        Issuer {
            ruc: self.ruc,
            legal_name: self.legal_name,
            trade_name: self.trade_name,
            address: self
                .address
                .unwrap_or_else(|| AddressBuilder::new("", "").build()),
        }
    }
}

/// Builder for a registration address. Defaults to the fiscal domicile
/// (`AddressTypeCode` `0000`) in Lima, Peru.
pub struct AddressBuilder {
    ubigeo: String,
    line: String,
    address_type_code: String,
    district: String,
    province: String,
    department: String,
    country_code: String,
}

impl AddressBuilder {
    pub fn new(ubigeo: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            ubigeo: ubigeo.into(),
            line: line.into(),
            address_type_code: "0000".to_string(),
            district: String::new(),
            province: "LIMA".to_string(),
            department: "LIMA".to_string(),
            country_code: "PE".to_string(),
        }
    }

    pub fn address_type_code(mut self, code: impl Into<String>) -> Self {
        self.address_type_code = code.into();
        self
    }

    pub fn district(mut self, district: impl Into<String>) -> Self {
        self.district = district.into();
        self
    }

    pub fn province(mut self, province: impl Into<String>) -> Self {
        self.province = province.into();
        self
    }

    pub fn department(mut self, department: impl Into<String>) -> Self {
        self.department = department.into();
        self
    }

    pub fn country(mut self, code: impl Into<String>) -> Self {
        self.country_code = code.into();
        self
    }

    pub fn build(self) -> RegistrationAddress {
        RegistrationAddress {
            ubigeo: self.ubigeo,
            address_type_code: self.address_type_code,
            district: self.district,
            province: self.province,
            department: self.department,
            line: self.line,
            country_code: self.country_code,
        }
    }
}

impl Customer {
    /// A customer identified by RUC.
    pub fn with_ruc(ruc: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identity_type: catalogs::IDENTITY_RUC.to_string(),
            identity_number: ruc.into(),
            name: name.into(),
            address: None,
        }
    }

    /// A customer identified by DNI.
    pub fn with_dni(dni: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identity_type: catalogs::IDENTITY_DNI.to_string(),
            identity_number: dni.into(),
            name: name.into(),
            address: None,
        }
    }

    /// The walk-in customer of a low-value receipt.
    pub fn anonymous() -> Self {
        Self {
            identity_type: catalogs::IDENTITY_NONE.to_string(),
            identity_number: "-".to_string(),
            name: "CLIENTES VARIOS".to_string(),
            address: None,
        }
    }

    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Builder for invoice lines. Defaults to a taxed unit (`NIU`) whose
/// price already includes IGV, which is how point-of-sale prices are shown.
///
/// ```
/// use sunat_cpe::core::*;
/// use rust_decimal_macros::dec;
///
/// let line = LineBuilder::new("Cuaderno A4", dec!(3), dec!(4.50))
///     .product_code("CUA-A4")
///     .build();
/// assert!(line.price_includes_tax);
/// assert_eq!(line.unit_code, "NIU");
/// ```
pub struct LineBuilder {
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    unit_code: String,
    tax_affectation: TaxAffectation,
    price_includes_tax: bool,
    product_code: Option<String>,
}

impl LineBuilder {
    pub fn new(description: impl Into<String>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            description: description.into(),
            quantity,
            unit_price,
            unit_code: "NIU".to_string(),
            tax_affectation: TaxAffectation::Taxed,
            price_includes_tax: true,
            product_code: None,
        }
    }

    pub fn unit_code(mut self, code: impl Into<String>) -> Self {
        self.unit_code = code.into();
        self
    }

    pub fn affectation(mut self, affectation: TaxAffectation) -> Self {
        self.tax_affectation = affectation;
        self
    }

    /// Mark the unit price as tax-exclusive.
    pub fn net_price(mut self) -> Self {
        self.price_includes_tax = false;
        self
    }

    pub fn product_code(mut self, code: impl Into<String>) -> Self {
        self.product_code = Some(code.into());
        self
    }

    pub fn build(self) -> InvoiceLine {
        InvoiceLine {
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            unit_code: self.unit_code,
            tax_affectation: self.tax_affectation,
            price_includes_tax: self.price_includes_tax,
            product_code: self.product_code,
        }
    }
}
