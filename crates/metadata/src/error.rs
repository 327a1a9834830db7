//! Metadata error types.

use thiserror::Error;
use uuid::Uuid;

/// Metadata operation errors.
///
/// The first group are internal signals that never cross the HTTP boundary:
/// `TransactionRetry` is consumed by the bounded-retry wrapper,
/// `FinishedWalk` stops iteration early, and `RepositoryUnknown` lets a
/// caller distinguish "no such repository" from "repository exists with no
/// matches".
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata key not found: {0}")]
    KeyNotFound(String),

    #[error("repository unknown: {0}")]
    RepositoryUnknown(String),

    #[error("transaction can be retried")]
    TransactionRetry,

    #[error("transaction {0} already committed")]
    TransactionCommitted(Uuid),

    /// Sentinel returned by iteration callbacks to stop a walk early.
    #[error("finished walk")]
    FinishedWalk,

    #[error("metadata service is not repository scoped")]
    NotScoped,

    #[error("unexpected value type for key {key}")]
    TypeMismatch { key: String },

    #[error(transparent)]
    Domain(#[from] stevedore_core::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
