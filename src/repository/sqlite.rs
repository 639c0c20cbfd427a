//! SQLite-backed repositories.
//!
//! Sequence allocation is a single upsert with `RETURNING` inside a
//! transaction. The first statement of the transaction is a write, so
//! SQLite takes the reserved lock up front and concurrent allocators
//! queue on `busy_timeout` instead of deadlocking on a lock upgrade.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{DocumentSequenceRepo, EmittedDocumentRepo, RepoError, RepoResult};
use crate::core::{DocumentSequence, DocumentType, EmissionStatus, EmittedDocument, MAX_CORRELATIVE};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/sqlite");

const MEMORY_PATH: &str = ":memory:";

impl From<sqlx::Error> for RepoError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => RepoError::NotFound {
                entity: "row",
                id: "unknown".into(),
            },
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::Conflict(db.message().to_string())
            }
            _ => RepoError::Storage(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for RepoError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RepoError::Storage(format!("migration failed: {err}"))
    }
}

/// Database configuration.
///
/// ```rust,ignore
/// let config = DbConfig::new("./cpe.db").max_connections(4);
/// let db = Database::new(config).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite file, or `:memory:`.
    pub database_path: PathBuf,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a pooled connection.
    pub connect_timeout: Duration,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(10),
            run_migrations: true,
        }
    }

    /// An isolated in-memory database. In-memory SQLite is per
    /// connection, so the pool holds exactly one.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(MEMORY_PATH),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn is_memory(&self) -> bool {
        self.database_path.as_path() == Path::new(MEMORY_PATH)
    }
}

/// Handle to the pool plus repository accessors.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database and apply migrations.
    pub async fn new(config: DbConfig) -> RepoResult<Self> {
        info!(path = %config.database_path.display(), "opening document database");

        let base = if config.is_memory() {
            SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| RepoError::Storage(e.to_string()))?
        } else {
            SqliteConnectOptions::new()
                .filename(&config.database_path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
        };
        let options = base
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| RepoError::Storage(format!("connection failed: {e}")))?;

        info!(max_connections = config.max_connections, "database pool created");

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    pub async fn run_migrations(&self) -> RepoResult<()> {
        MIGRATOR.run(&self.pool).await?;
        debug!("migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn sequences(&self) -> SqliteSequenceRepo {
        SqliteSequenceRepo::new(self.pool.clone())
    }

    pub fn documents(&self) -> SqliteDocumentRepo {
        SqliteDocumentRepo::new(self.pool.clone())
    }

    /// `SELECT 1` round trip.
    pub async fn health_check(&self) -> RepoResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        info!("closing document database");
        self.pool.close().await;
    }
}

#[derive(Debug, Clone)]
pub struct SqliteSequenceRepo {
    pool: SqlitePool,
}

impl SqliteSequenceRepo {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteSequenceRepo { pool }
    }
}

#[async_trait]
impl DocumentSequenceRepo for SqliteSequenceRepo {
    async fn allocate(&self, document_type: DocumentType, series: &str) -> RepoResult<u32> {
        let mut tx = self.pool.begin().await?;

        let last: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO document_sequences (document_type, series, last_number, updated_at)
            VALUES (?1, ?2, 1, ?3)
            ON CONFLICT (document_type, series)
            DO UPDATE SET last_number = last_number + 1, updated_at = excluded.updated_at
            RETURNING last_number
            "#,
        )
        .bind(document_type.code())
        .bind(series)
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await?;

        if last > i64::from(MAX_CORRELATIVE) {
            tx.rollback().await?;
            warn!(document_type = document_type.code(), %series, "series exhausted");
            return Err(RepoError::Exhausted {
                document_type: document_type.code(),
                series: series.to_string(),
            });
        }

        tx.commit().await?;
        debug!(document_type = document_type.code(), %series, number = last, "allocated correlative");
        u32::try_from(last).map_err(|_| RepoError::Storage(format!("invalid correlative {last}")))
    }

    async fn current(
        &self,
        document_type: DocumentType,
        series: &str,
    ) -> RepoResult<Option<DocumentSequence>> {
        let row = sqlx::query(
            "SELECT last_number, updated_at FROM document_sequences \
             WHERE document_type = ?1 AND series = ?2",
        )
        .bind(document_type.code())
        .bind(series)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> RepoResult<DocumentSequence> {
            let last: i64 = row.try_get("last_number")?;
            Ok(DocumentSequence {
                document_type,
                series: series.to_string(),
                last_number: u32::try_from(last)
                    .map_err(|_| RepoError::Storage(format!("invalid correlative {last}")))?,
                updated_at: row.try_get("updated_at")?,
            })
        })
        .transpose()
    }
}

#[derive(Debug, Clone)]
pub struct SqliteDocumentRepo {
    pool: SqlitePool,
}

impl SqliteDocumentRepo {
    pub fn new(pool: SqlitePool) -> Self {
        SqliteDocumentRepo { pool }
    }
}

const DOCUMENT_COLUMNS: &str = "id, document_type, series, number, related_sale_id, filename, \
     content_hash, xml_storage_path, package_storage_path, response_archive_path, status, \
     authority_code, authority_message, retry_count, created_at";

fn document_from_row(row: &SqliteRow) -> RepoResult<EmittedDocument> {
    let id: String = row.try_get("id")?;
    let type_code: String = row.try_get("document_type")?;
    let status: String = row.try_get("status")?;
    let number: i64 = row.try_get("number")?;
    let retry_count: i64 = row.try_get("retry_count")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;

    Ok(EmittedDocument {
        id: Uuid::parse_str(&id).map_err(|e| RepoError::Storage(format!("bad id {id}: {e}")))?,
        document_type: DocumentType::from_code(&type_code)
            .ok_or_else(|| RepoError::Storage(format!("unknown document type {type_code}")))?,
        series: row.try_get("series")?,
        number: u32::try_from(number)
            .map_err(|_| RepoError::Storage(format!("invalid number {number}")))?,
        related_sale_id: row.try_get("related_sale_id")?,
        filename: row.try_get("filename")?,
        content_hash: row.try_get("content_hash")?,
        xml_storage_path: row.try_get("xml_storage_path")?,
        package_storage_path: row.try_get("package_storage_path")?,
        response_archive_path: row.try_get("response_archive_path")?,
        status: EmissionStatus::parse(&status)
            .ok_or_else(|| RepoError::Storage(format!("unknown status {status}")))?,
        authority_code: row.try_get("authority_code")?,
        authority_message: row.try_get("authority_message")?,
        retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
        created_at,
    })
}

#[async_trait]
impl EmittedDocumentRepo for SqliteDocumentRepo {
    async fn insert(&self, document: &EmittedDocument) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO emitted_documents (
                id, document_type, series, number, related_sale_id, filename,
                content_hash, xml_storage_path, package_storage_path, response_archive_path,
                status, authority_code, authority_message, retry_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(document.id.to_string())
        .bind(document.document_type.code())
        .bind(&document.series)
        .bind(i64::from(document.number))
        .bind(&document.related_sale_id)
        .bind(&document.filename)
        .bind(&document.content_hash)
        .bind(&document.xml_storage_path)
        .bind(&document.package_storage_path)
        .bind(&document.response_archive_path)
        .bind(document.status.as_str())
        .bind(&document.authority_code)
        .bind(&document.authority_message)
        .bind(i64::from(document.retry_count))
        .bind(document.created_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        debug!(id = %document.id, filename = %document.filename, "inserted emitted document");
        Ok(())
    }

    async fn update(&self, document: &EmittedDocument) -> RepoResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE emitted_documents SET
                content_hash = ?2,
                xml_storage_path = ?3,
                package_storage_path = ?4,
                response_archive_path = ?5,
                status = ?6,
                authority_code = ?7,
                authority_message = ?8,
                updated_at = ?9
            WHERE id = ?1 AND status = 'PENDING'
            "#,
        )
        .bind(document.id.to_string())
        .bind(&document.content_hash)
        .bind(&document.xml_storage_path)
        .bind(&document.package_storage_path)
        .bind(&document.response_archive_path)
        .bind(document.status.as_str())
        .bind(&document.authority_code)
        .bind(&document.authority_message)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.find_by_id(document.id).await? {
                Some(stored) => Err(RepoError::Conflict(format!(
                    "document {} is already {}",
                    document.id, stored.status
                ))),
                None => Err(RepoError::NotFound {
                    entity: "EmittedDocument",
                    id: document.id.to_string(),
                }),
            };
        }

        debug!(id = %document.id, status = %document.status, "updated emitted document");
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<EmittedDocument>> {
        let sql = format!("SELECT {DOCUMENT_COLUMNS} FROM emitted_documents WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn find_by_sale(&self, related_sale_id: &str) -> RepoResult<Vec<EmittedDocument>> {
        let sql = format!(
            "SELECT {DOCUMENT_COLUMNS} FROM emitted_documents \
             WHERE related_sale_id = ?1 ORDER BY created_at, rowid"
        );
        let rows = sqlx::query(&sql)
            .bind(related_sale_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(document_from_row).collect()
    }
}
