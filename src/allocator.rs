//! Gap-free correlative allocation.
//!
//! The allocator is the only writer of `DocumentSequence` rows. The
//! repository performs the increment atomically; this layer adds series
//! validation and logging, and holds no lock of its own, so the critical
//! section is exactly the repository call.

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::{DocumentNumber, DocumentType, ValidationError, validate_series};
use crate::repository::{DocumentSequenceRepo, RepoError};

/// Issues the next correlative for a (document type, series) key.
#[derive(Clone)]
pub struct SequenceAllocator {
    repo: Arc<dyn DocumentSequenceRepo>,
}

impl SequenceAllocator {
    pub fn new(repo: Arc<dyn DocumentSequenceRepo>) -> Self {
        Self { repo }
    }

    /// Allocate the next number. On error nothing was consumed and the
    /// whole call may be retried.
    pub async fn allocate(
        &self,
        document_type: DocumentType,
        series: &str,
    ) -> Result<DocumentNumber, RepoError> {
        debug!(document_type = document_type.code(), %series, "allocating correlative");
        let number = self.repo.allocate(document_type, series).await?;
        let allocated = DocumentNumber::new(series, number);
        info!(document_id = %allocated, "correlative allocated");
        Ok(allocated)
    }

    /// Last number issued for the key, or 0 if the series is unused.
    pub async fn last_issued(
        &self,
        document_type: DocumentType,
        series: &str,
    ) -> Result<u32, RepoError> {
        Ok(self
            .repo
            .current(document_type, series)
            .await?
            .map_or(0, |row| row.last_number))
    }

    /// Series format check, exposed so callers can reject a request before
    /// it reaches [`allocate`](Self::allocate).
    pub fn check_series(document_type: DocumentType, series: &str) -> Vec<ValidationError> {
        validate_series(series, document_type)
    }
}

impl std::fmt::Debug for SequenceAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceAllocator").finish_non_exhaustive()
    }
}
