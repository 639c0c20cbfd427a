use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use super::{DocumentSequenceRepo, EmittedDocumentRepo, RepoError, RepoResult};
use crate::core::{DocumentSequence, DocumentType, EmissionStatus, EmittedDocument, MAX_CORRELATIVE};

fn poisoned<T>(_: T) -> RepoError {
    RepoError::Storage("repository lock poisoned".into())
}

/// In-process sequence table. The mutex is the row lock.
#[derive(Debug, Default)]
pub struct MemorySequenceRepo {
    rows: Mutex<HashMap<(DocumentType, String), DocumentSequence>>,
}

impl MemorySequenceRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a series at a given last number (e.g. after a migration
    /// from another system).
    pub fn seed(&self, document_type: DocumentType, series: &str, last_number: u32) -> RepoResult<()> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        rows.insert(
            (document_type, series.to_string()),
            DocumentSequence {
                document_type,
                series: series.to_string(),
                last_number,
                updated_at: Utc::now(),
            },
        );
        Ok(())
    }
}

#[async_trait]
impl DocumentSequenceRepo for MemorySequenceRepo {
    async fn allocate(&self, document_type: DocumentType, series: &str) -> RepoResult<u32> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        let row = rows
            .entry((document_type, series.to_string()))
            .or_insert_with(|| DocumentSequence {
                document_type,
                series: series.to_string(),
                last_number: 0,
                updated_at: Utc::now(),
            });
        if row.last_number >= MAX_CORRELATIVE {
            return Err(RepoError::Exhausted {
                document_type: document_type.code(),
                series: series.to_string(),
            });
        }
        row.last_number += 1;
        row.updated_at = Utc::now();
        Ok(row.last_number)
    }

    async fn current(
        &self,
        document_type: DocumentType,
        series: &str,
    ) -> RepoResult<Option<DocumentSequence>> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows.get(&(document_type, series.to_string())).cloned())
    }
}

/// In-process document table, kept in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDocumentRepo {
    rows: Mutex<Vec<EmittedDocument>>,
}

impl MemoryDocumentRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored record.
    pub fn all(&self) -> RepoResult<Vec<EmittedDocument>> {
        Ok(self.rows.lock().map_err(poisoned)?.clone())
    }
}

#[async_trait]
impl EmittedDocumentRepo for MemoryDocumentRepo {
    async fn insert(&self, document: &EmittedDocument) -> RepoResult<()> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        let duplicate = rows.iter().any(|d| {
            d.id == document.id
                || (d.document_type == document.document_type
                    && d.series == document.series
                    && d.number == document.number)
        });
        if duplicate {
            return Err(RepoError::Conflict(format!(
                "document {}-{} {} already recorded",
                document.series,
                document.number,
                document.document_type.code()
            )));
        }
        rows.push(document.clone());
        Ok(())
    }

    async fn update(&self, document: &EmittedDocument) -> RepoResult<()> {
        let mut rows = self.rows.lock().map_err(poisoned)?;
        let row = rows
            .iter_mut()
            .find(|d| d.id == document.id)
            .ok_or_else(|| RepoError::NotFound {
                entity: "EmittedDocument",
                id: document.id.to_string(),
            })?;
        if row.status != EmissionStatus::Pending {
            return Err(RepoError::Conflict(format!(
                "document {} is already {}",
                document.id, row.status
            )));
        }
        *row = document.clone();
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> RepoResult<Option<EmittedDocument>> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows.iter().find(|d| d.id == id).cloned())
    }

    async fn find_by_sale(&self, related_sale_id: &str) -> RepoResult<Vec<EmittedDocument>> {
        let rows = self.rows.lock().map_err(poisoned)?;
        Ok(rows
            .iter()
            .filter(|d| d.related_sale_id.as_deref() == Some(related_sale_id))
            .cloned()
            .collect())
    }
}
