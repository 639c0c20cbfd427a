//! Configuration loaded from environment variables.
//!
//! Every key has a safe default except the issuer identity. Production
//! additionally requires real SOL credentials.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::core::{AddressBuilder, DEFAULT_IGV_RATE, Issuer, IssuerBuilder, SunatEnvironment};
use crate::emission::EmissionSettings;
use crate::signing::{DisabledSigner, Signer, SigningError, XadesSigner};
use crate::transmission::Credentials;

pub const DEFAULT_BETA_ENDPOINT: &str =
    "https://e-beta.sunat.gob.pe/ol-ti-itcpfegem-beta/billService";
pub const DEFAULT_PROD_ENDPOINT: &str =
    "https://e-factura.sunat.gob.pe/ol-ti-itcpfegem/billService";

/// SOL user and password SUNAT publishes for its beta service.
const BETA_SOL_USER: &str = "MODDATOS";
const BETA_SOL_PASSWORD: &str = "moddatos";

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub ruc: String,
    pub company_name: String,
    pub trade_name: Option<String>,
    pub ubigeo: String,
    pub address: String,
    pub district: String,
    pub province: String,
    pub department: String,
    pub environment: SunatEnvironment,
    pub beta_endpoint: String,
    pub prod_endpoint: String,
    pub sol_user: String,
    pub sol_password: String,
    /// Base URL of the XAdES signer; `None` disables signing.
    pub xades_url: Option<String>,
    pub xades_key_alias: String,
    pub storage_path: PathBuf,
    pub database_url: String,
    pub igv_rate: Decimal,
    pub currency: String,
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let environment = match get("SUNAT_ENV") {
            None => SunatEnvironment::Beta,
            Some(v) => SunatEnvironment::parse(&v).ok_or(ConfigError::Invalid {
                key: "SUNAT_ENV",
                value: v,
            })?,
        };

        let ruc = get("SUNAT_RUC").ok_or(ConfigError::Missing("SUNAT_RUC"))?;
        if ruc.len() != 11 || !ruc.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid {
                key: "SUNAT_RUC",
                value: ruc,
            });
        }

        let (sol_user, sol_password) = match environment {
            SunatEnvironment::Beta => (
                or("SUNAT_SOL_USER", BETA_SOL_USER),
                or("SUNAT_SOL_PASSWORD", BETA_SOL_PASSWORD),
            ),
            SunatEnvironment::Production => (
                get("SUNAT_SOL_USER").ok_or(ConfigError::Missing("SUNAT_SOL_USER"))?,
                get("SUNAT_SOL_PASSWORD").ok_or(ConfigError::Missing("SUNAT_SOL_PASSWORD"))?,
            ),
        };

        let igv_rate = match get("IGV_RATE") {
            None => DEFAULT_IGV_RATE,
            Some(v) => match Decimal::from_str(&v) {
                Ok(rate) if rate >= Decimal::ZERO && rate < Decimal::ONE => rate,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: "IGV_RATE",
                        value: v,
                    });
                }
            },
        };

        Ok(AppConfig {
            ruc,
            company_name: get("COMPANY_NAME").ok_or(ConfigError::Missing("COMPANY_NAME"))?,
            trade_name: get("COMPANY_TRADE_NAME"),
            ubigeo: or("COMPANY_UBIGEO", "150101"),
            address: or("COMPANY_ADDRESS", "-"),
            district: or("COMPANY_DISTRICT", "LIMA"),
            province: or("COMPANY_PROVINCE", "LIMA"),
            department: or("COMPANY_DEPARTMENT", "LIMA"),
            environment,
            beta_endpoint: or("SUNAT_BETA_ENDPOINT", DEFAULT_BETA_ENDPOINT),
            prod_endpoint: or("SUNAT_PROD_ENDPOINT", DEFAULT_PROD_ENDPOINT),
            sol_user,
            sol_password,
            xades_url: get("XADES_URL"),
            xades_key_alias: or("XADES_KEY_ALIAS", "prod"),
            storage_path: PathBuf::from(or("CPE_STORAGE_PATH", "./storage/cpe")),
            database_url: or("DATABASE_URL", "./cpe.db"),
            igv_rate,
            currency: or("CURRENCY", "PEN"),
        })
    }

    /// `sendBill` endpoint of the configured environment.
    pub fn endpoint(&self) -> &str {
        match self.environment {
            SunatEnvironment::Beta => &self.beta_endpoint,
            SunatEnvironment::Production => &self.prod_endpoint,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::for_environment(
            self.environment,
            &self.ruc,
            &self.sol_user,
            self.sol_password.clone(),
        )
    }

    pub fn issuer(&self) -> Issuer {
        let address = AddressBuilder::new(self.ubigeo.clone(), self.address.clone())
            .district(self.district.clone())
            .province(self.province.clone())
            .department(self.department.clone())
            .build();
        let mut builder = IssuerBuilder::new(self.ruc.clone(), self.company_name.clone())
            .address(address);
        if let Some(name) = &self.trade_name {
            builder = builder.trade_name(name.clone());
        }
        builder.build()
    }

    pub fn emission_settings(&self) -> EmissionSettings {
        EmissionSettings::new(self.environment, self.endpoint(), self.credentials())
            .igv_rate(self.igv_rate)
            .currency(self.currency.clone())
    }

    /// The XAdES signer when `XADES_URL` is set, otherwise a disabled one.
    pub fn signer(&self) -> Result<Arc<dyn Signer>, SigningError> {
        match &self.xades_url {
            Some(url) => Ok(Arc::new(XadesSigner::new(
                url.clone(),
                self.xades_key_alias.clone(),
            )?)),
            None => Ok(Arc::new(DisabledSigner)),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("ruc", &self.ruc)
            .field("company_name", &self.company_name)
            .field("environment", &self.environment)
            .field("endpoint", &self.endpoint())
            .field("sol_user", &self.sol_user)
            .field("sol_password", &"***")
            .field("xades_url", &self.xades_url)
            .field("storage_path", &self.storage_path)
            .field("database_url", &self.database_url)
            .field("igv_rate", &self.igv_rate)
            .field("currency", &self.currency)
            .finish_non_exhaustive()
    }
}
