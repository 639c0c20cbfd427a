//! cpe - emit and inspect SUNAT electronic documents.
//!
//! Configuration comes from the environment (see `sunat_cpe::config`).
//! Log level is controlled by `RUST_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use sunat_cpe::config::AppConfig;
use sunat_cpe::repository::{Database, DbConfig};
use sunat_cpe::signing::{SignerHealth, XadesSigner};
use sunat_cpe::storage::DocumentStore;
use sunat_cpe::transmission::SoapClient;
use sunat_cpe::{EmissionRequest, EmissionService};

#[derive(Parser)]
#[command(name = "cpe")]
#[command(about = "SUNAT electronic document emission")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Emit the document described by a JSON request file
    Emit {
        /// Path to an EmissionRequest JSON file
        request: PathBuf,
    },

    /// Print a stored document record
    Show {
        /// Document record id
        id: Uuid,
    },

    /// Check the database and the signing service
    Health,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn open_database(config: &AppConfig) -> Result<Database> {
    Database::new(DbConfig::new(&config.database_url))
        .await
        .with_context(|| format!("opening database {}", config.database_url))
}

fn service(config: &AppConfig, db: &Database) -> Result<EmissionService> {
    let transmitter = SoapClient::new().context("building SOAP client")?;
    let signer = config.signer().context("building signer client")?;
    Ok(EmissionService::new(
        config.issuer(),
        config.emission_settings(),
        Arc::new(db.sequences()),
        Arc::new(db.documents()),
        Arc::new(transmitter),
        DocumentStore::new(&config.storage_path),
    )
    .with_signer(signer))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env().context("loading configuration")?;

    match cli.command {
        Command::Emit { request } => {
            let raw = tokio::fs::read_to_string(&request)
                .await
                .with_context(|| format!("reading {}", request.display()))?;
            let request: EmissionRequest =
                serde_json::from_str(&raw).context("parsing emission request")?;

            let db = open_database(&config).await?;
            let document = service(&config, &db)?.emit(request).await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
            db.close().await;
        }
        Command::Show { id } => {
            let db = open_database(&config).await?;
            let found = service(&config, &db)?.find(id).await?;
            db.close().await;
            match found {
                Some(document) => println!("{}", serde_json::to_string_pretty(&document)?),
                None => bail!("no document with id {id}"),
            }
        }
        Command::Health => {
            println!("config: {config:?}");
            let db = open_database(&config).await?;
            db.health_check().await.context("database health check")?;
            println!("database: ok");
            db.close().await;

            match &config.xades_url {
                None => println!("signer: disabled (XADES_URL not set)"),
                Some(url) => {
                    let signer = XadesSigner::new(url.clone(), config.xades_key_alias.clone())?;
                    match signer.health().await {
                        SignerHealth::Healthy => println!("signer: ok ({url})"),
                        SignerHealth::Unhealthy { status } => {
                            bail!("signer at {url} answered HTTP {status}")
                        }
                        SignerHealth::Unreachable { reason } => {
                            bail!("signer at {url} unreachable: {reason}")
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
