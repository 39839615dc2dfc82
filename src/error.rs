//! Fatal errors for load operations.
//!
//! Row-level problems are not errors here: they are classified by the
//! validator as [`crate::validator::Invalid`] and absorbed by the loaders.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Source file {path} is unreadable: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage commit failed: {0}")]
    StorageCommit(#[from] rusqlite::Error),

    #[error("Failed to write error log {path}: {source}")]
    ErrorLogWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Chunk size must be a positive integer, got {0}")]
    InvalidChunkSize(usize),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl IngestError {
    pub fn source_unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestError::SourceUnreadable {
            path: path.into(),
            source,
        }
    }

    /// True when the failure happened while writing to storage
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, IngestError::StorageCommit(_))
    }
}
