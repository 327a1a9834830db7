//! Error types for the core domain.

use crate::descriptor::Descriptor;
use thiserror::Error;

/// Core domain error type.
///
/// These are the errors that cross the service boundary: verification and
/// not-found failures surface directly to the HTTP layer, which maps each
/// kind to a protocol error code.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid digest: {0}")]
    DigestInvalid(String),

    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("invalid repository name: {0}")]
    NameInvalid(String),

    #[error("invalid tag: {0}")]
    TagInvalid(String),

    #[error("tag unknown: {0}")]
    TagUnknown(String),

    #[error("manifest unknown: {name}@{digest}")]
    ManifestUnknown { name: String, digest: String },

    #[error("manifest failed signature verification")]
    ManifestUnverified,

    #[error("manifest references unknown blob: {0}")]
    ManifestBlobUnknown(String),

    #[error("invalid manifest: {0}")]
    ManifestInvalid(String),

    #[error("manifest verification failed ({} errors)", .0.len())]
    ManifestVerification(Vec<Error>),

    #[error("blob unknown: {0}")]
    BlobUnknown(String),

    #[error("blob upload unknown")]
    BlobUploadUnknown,

    #[error("invalid blob upload: {0}")]
    BlobUploadInvalid(String),

    /// Successful cross-repository mount, reported through the error channel
    /// so `create` can short-circuit the upload protocol. The HTTP layer
    /// translates this into a 201 pointing at the existing blob.
    #[error("blob mounted from {from}: {}", .descriptor.digest)]
    BlobMounted { from: String, descriptor: Descriptor },

    #[error("operation unsupported")]
    Unsupported,

    #[error("access denied")]
    Denied,

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
