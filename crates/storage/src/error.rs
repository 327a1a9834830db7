//! Storage error types.

use stevedore_metadata::MetadataError;
use thiserror::Error;

/// Storage layer errors.
///
/// Driver operations produce the path/io variants; the registry facades
/// layered above also surface domain and metadata errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Domain(#[from] stevedore_core::Error),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid offset {offset} for {path}")]
    InvalidOffset { path: String, offset: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("operation unsupported by driver")]
    Unsupported,

    #[error("writer already {0}")]
    WriterClosed(&'static str),

    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// Flatten into a metadata error for trait impls that live behind the
    /// metadata crate's seams.
    pub fn into_metadata(self) -> MetadataError {
        match self {
            Self::Domain(err) => MetadataError::Domain(err),
            Self::Metadata(err) => err,
            other => MetadataError::Internal(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
