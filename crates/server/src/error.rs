//! Protocol error codes and per-request error accumulation.
//!
//! Responses carry `{"errors": [{"code", "message", "detail"}]}` with the
//! HTTP status taken from the first error. Handlers may accumulate several
//! errors (manifest verification reports every missing blob at once).

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use stevedore_core::Error;
use stevedore_metadata::MetadataError;
use stevedore_storage::StorageError;

/// Protocol error codes of the v2 API.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    BlobUnknown,
    BlobUploadInvalid,
    BlobUploadUnknown,
    DigestInvalid,
    ManifestBlobUnknown,
    ManifestInvalid,
    ManifestUnknown,
    ManifestUnverified,
    NameInvalid,
    NameUnknown,
    TagInvalid,
    Unsupported,
    Denied,
    Unknown,
}

impl ErrorCode {
    /// The wire identifier.
    pub fn identifier(&self) -> &'static str {
        match self {
            Self::BlobUnknown => "BLOB_UNKNOWN",
            Self::BlobUploadInvalid => "BLOB_UPLOAD_INVALID",
            Self::BlobUploadUnknown => "BLOB_UPLOAD_UNKNOWN",
            Self::DigestInvalid => "DIGEST_INVALID",
            Self::ManifestBlobUnknown => "MANIFEST_BLOB_UNKNOWN",
            Self::ManifestInvalid => "MANIFEST_INVALID",
            Self::ManifestUnknown => "MANIFEST_UNKNOWN",
            Self::ManifestUnverified => "MANIFEST_UNVERIFIED",
            Self::NameInvalid => "NAME_INVALID",
            Self::NameUnknown => "NAME_UNKNOWN",
            Self::TagInvalid => "TAG_INVALID",
            Self::Unsupported => "UNSUPPORTED",
            Self::Denied => "DENIED",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// The HTTP status this code responds with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BlobUnknown
            | Self::BlobUploadUnknown
            | Self::ManifestUnknown
            | Self::NameUnknown => StatusCode::NOT_FOUND,
            Self::BlobUploadInvalid
            | Self::DigestInvalid
            | Self::ManifestBlobUnknown
            | Self::ManifestInvalid
            | Self::ManifestUnverified
            | Self::NameInvalid
            | Self::TagInvalid => StatusCode::BAD_REQUEST,
            Self::Unsupported => StatusCode::METHOD_NOT_ALLOWED,
            Self::Denied => StatusCode::FORBIDDEN,
            Self::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.identifier())
    }
}

/// One error entry of a response body.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorEntry {
    pub code: ErrorCode,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl ErrorEntry {
    /// An entry with a detail string.
    pub fn new(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            code,
            message: detail.into(),
            detail: None,
        }
    }
}

/// The accumulated errors of one request.
#[derive(Clone, Debug, Default)]
pub struct ApiErrors {
    errors: Vec<ErrorEntry>,
}

impl ApiErrors {
    /// A single-entry error.
    pub fn single(code: ErrorCode, detail: impl Into<String>) -> Self {
        Self {
            errors: vec![ErrorEntry::new(code, detail)],
        }
    }

    /// Append an entry.
    pub fn push(&mut self, entry: ErrorEntry) {
        self.errors.push(entry);
    }

    /// The entries accumulated so far.
    pub fn entries(&self) -> &[ErrorEntry] {
        &self.errors
    }

    fn status(&self) -> StatusCode {
        self.errors
            .first()
            .map(|e| e.code.status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    errors: &'a [ErrorEntry],
}

impl IntoResponse for ApiErrors {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(ErrorBody { errors: &self.errors })).into_response()
    }
}

/// Map a domain error to entries, expanding verification error lists.
fn push_domain(errors: &mut Vec<ErrorEntry>, err: &Error) {
    let entry = match err {
        Error::DigestInvalid(_) | Error::DigestMismatch { .. } => {
            ErrorEntry::new(ErrorCode::DigestInvalid, err.to_string())
        }
        Error::NameInvalid(_) => ErrorEntry::new(ErrorCode::NameInvalid, err.to_string()),
        Error::TagInvalid(_) => ErrorEntry::new(ErrorCode::TagInvalid, err.to_string()),
        // A missing tag means the manifest it would name is unknown.
        Error::TagUnknown(_) | Error::ManifestUnknown { .. } => {
            ErrorEntry::new(ErrorCode::ManifestUnknown, err.to_string())
        }
        Error::ManifestUnverified => {
            ErrorEntry::new(ErrorCode::ManifestUnverified, err.to_string())
        }
        Error::ManifestBlobUnknown(_) => {
            ErrorEntry::new(ErrorCode::ManifestBlobUnknown, err.to_string())
        }
        Error::ManifestInvalid(_) => ErrorEntry::new(ErrorCode::ManifestInvalid, err.to_string()),
        Error::ManifestVerification(inner) => {
            for err in inner {
                push_domain(errors, err);
            }
            return;
        }
        Error::BlobUnknown(_) => ErrorEntry::new(ErrorCode::BlobUnknown, err.to_string()),
        Error::BlobUploadUnknown => {
            ErrorEntry::new(ErrorCode::BlobUploadUnknown, err.to_string())
        }
        Error::BlobUploadInvalid(_) => {
            ErrorEntry::new(ErrorCode::BlobUploadInvalid, err.to_string())
        }
        // Mount results are intercepted by the upload handler; reaching the
        // generic mapping is a programming error.
        Error::BlobMounted { .. } => ErrorEntry::new(ErrorCode::Unknown, err.to_string()),
        Error::Unsupported => ErrorEntry::new(ErrorCode::Unsupported, err.to_string()),
        Error::Denied => ErrorEntry::new(ErrorCode::Denied, err.to_string()),
        Error::Serialization(_) => ErrorEntry::new(ErrorCode::Unknown, err.to_string()),
    };
    errors.push(entry);
}

fn push_metadata(errors: &mut Vec<ErrorEntry>, err: &MetadataError) {
    match err {
        MetadataError::Domain(domain) => push_domain(errors, domain),
        MetadataError::RepositoryUnknown(name) => errors.push(ErrorEntry::new(
            ErrorCode::NameUnknown,
            format!("repository unknown: {name}"),
        )),
        // Internal signals; surfacing one is a bug, not client error.
        other => errors.push(ErrorEntry::new(ErrorCode::Unknown, other.to_string())),
    }
}

impl From<Error> for ApiErrors {
    fn from(err: Error) -> Self {
        let mut errors = Vec::new();
        push_domain(&mut errors, &err);
        Self { errors }
    }
}

impl From<MetadataError> for ApiErrors {
    fn from(err: MetadataError) -> Self {
        let mut errors = Vec::new();
        push_metadata(&mut errors, &err);
        Self { errors }
    }
}

impl From<StorageError> for ApiErrors {
    fn from(err: StorageError) -> Self {
        let mut errors = Vec::new();
        match err {
            StorageError::Domain(domain) => push_domain(&mut errors, &domain),
            StorageError::Metadata(metadata) => push_metadata(&mut errors, &metadata),
            StorageError::PathNotFound(path) => errors.push(ErrorEntry::new(
                ErrorCode::BlobUnknown,
                format!("content not found: {path}"),
            )),
            other => errors.push(ErrorEntry::new(ErrorCode::Unknown, other.to_string())),
        }
        Self { errors }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_errors_expand() {
        let err = Error::ManifestVerification(vec![
            Error::ManifestBlobUnknown("sha256:aa".to_string()),
            Error::ManifestBlobUnknown("sha256:bb".to_string()),
            Error::ManifestUnverified,
        ]);
        let api: ApiErrors = err.into();
        assert_eq!(api.entries().len(), 3);
        assert_eq!(api.entries()[0].code, ErrorCode::ManifestBlobUnknown);
        assert_eq!(api.entries()[2].code, ErrorCode::ManifestUnverified);
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn nested_metadata_domain_flattens() {
        let err = StorageError::Metadata(MetadataError::Domain(Error::BlobUnknown(
            "sha256:aa".to_string(),
        )));
        let api: ApiErrors = err.into();
        assert_eq!(api.entries()[0].code, ErrorCode::BlobUnknown);
        assert_eq!(api.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn internal_signals_map_to_unknown() {
        let api: ApiErrors = MetadataError::TransactionRetry.into();
        assert_eq!(api.entries()[0].code, ErrorCode::Unknown);
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn wire_body_shape() {
        let api = ApiErrors::single(ErrorCode::ManifestUnknown, "manifest unknown");
        let body = serde_json::to_value(ErrorBody {
            errors: api.entries(),
        })
        .unwrap();
        assert_eq!(body["errors"][0]["code"], "MANIFEST_UNKNOWN");
        assert!(body["errors"][0].get("detail").is_none());
    }
}
