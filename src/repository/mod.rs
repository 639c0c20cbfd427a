//! Persistence boundaries for sequences and emitted documents.
//!
//! The orchestrator only sees these traits and plain data. The SQLite
//! implementation (feature `sqlite`) is what production runs on; the
//! in-memory one backs tests and single-process tools.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::core::{DocumentSequence, DocumentType, EmittedDocument};

pub use memory::{MemoryDocumentRepo, MemorySequenceRepo};
#[cfg(feature = "sqlite")]
pub use sqlite::{Database, DbConfig, SqliteDocumentRepo, SqliteSequenceRepo};

/// Repository errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RepoError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A write would break an invariant: a duplicate number, or an update
    /// of a record that already left PENDING.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The series has issued its last possible correlative.
    #[error("series {series} of document type {document_type} is exhausted")]
    Exhausted {
        document_type: &'static str,
        series: String,
    },

    /// Backend failure (connection, query, migration).
    #[error("storage backend error: {0}")]
    Storage(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Access to the `DocumentSequence` rows.
#[async_trait]
pub trait DocumentSequenceRepo: Send + Sync {
    /// Atomically create-or-increment the row for the key and return the
    /// new `last_number`. If the call fails, no number is consumed.
    async fn allocate(&self, document_type: DocumentType, series: &str) -> RepoResult<u32>;

    /// The row for the key, if it was ever allocated from.
    async fn current(
        &self,
        document_type: DocumentType,
        series: &str,
    ) -> RepoResult<Option<DocumentSequence>>;
}

/// Access to `EmittedDocument` records.
#[async_trait]
pub trait EmittedDocumentRepo: Send + Sync {
    /// Insert a new record. Fails with `Conflict` if its
    /// (type, series, number) is already recorded.
    async fn insert(&self, document: &EmittedDocument) -> RepoResult<()>;

    /// Overwrite a record that is still PENDING in storage.
    /// Fails with `Conflict` if the stored record is terminal.
    async fn update(&self, document: &EmittedDocument) -> RepoResult<()>;

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<EmittedDocument>>;

    /// All records for a sale, oldest first.
    async fn find_by_sale(&self, related_sale_id: &str) -> RepoResult<Vec<EmittedDocument>>;
}
