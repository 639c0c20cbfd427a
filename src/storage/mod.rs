//! Artifact storage on the local filesystem.
//!
//! Layout under the base path:
//!
//! ```text
//! {base}/{issue_date}/{filename}.xml   signed document
//! {base}/{issue_date}/{filename}.zip   submitted package
//! {base}/cdr/R-{filename}.zip          authority response archive
//! ```

use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The relative path is absolute or escapes the base directory.
    #[error("invalid storage path: {0}")]
    InvalidPath(String),
}

/// Relative path of the signed XML.
pub fn xml_path(issue_date: NaiveDate, filename: &str) -> String {
    format!("{}/{filename}.xml", issue_date.format("%Y-%m-%d"))
}

/// Relative path of the submitted zip.
pub fn package_path(issue_date: NaiveDate, filename: &str) -> String {
    format!("{}/{filename}.zip", issue_date.format("%Y-%m-%d"))
}

/// Relative path of the authority response archive.
pub fn response_archive_path(filename: &str) -> String {
    format!("cdr/R-{filename}.zip")
}

/// Durable artifact store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    base: PathBuf,
}

impl DocumentStore {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Write `bytes` to `relative` under the base, creating directories and
    /// replacing any existing file. Returns the full path.
    pub async fn save(&self, relative: &str, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let full = self.resolve(relative)?;
        if let Some(dir) = full.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }

        // Write then rename so readers never see a partial file.
        let mut tmp = full.clone().into_os_string();
        tmp.push(".part");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|source| StorageError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &full)
            .await
            .map_err(|source| StorageError::Io {
                path: full.clone(),
                source,
            })?;

        debug!(path = %full.display(), bytes = bytes.len(), "artifact stored");
        Ok(full)
    }

    /// Store an authority response archive as `cdr/R-{filename}.zip`.
    pub async fn save_response_archive(
        &self,
        filename: &str,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        self.save(&response_archive_path(filename), bytes).await
    }

    /// Read back a stored artifact by relative path.
    pub async fn read(&self, relative: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(relative)?;
        tokio::fs::read(&full)
            .await
            .map_err(|source| StorageError::Io { path: full, source })
    }

    fn resolve(&self, relative: &str) -> Result<PathBuf, StorageError> {
        let rel = Path::new(relative);
        if relative.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(StorageError::InvalidPath(relative.to_string()));
        }
        Ok(self.base.join(rel))
    }
}
