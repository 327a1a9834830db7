//! Route configuration and v2 path parsing.
//!
//! Repository names span multiple path segments (`library/ubuntu`), which
//! axum's pattern matcher cannot capture, so everything under `/v2/` other
//! than the exact endpoints dispatches through a fallback handler that
//! parses the path itself.

use crate::error::{ApiErrors, ErrorCode};
use crate::handlers;
use crate::metrics::{metrics_handler, request_metrics_middleware};
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::get;
use stevedore_core::reference::RepositoryName;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let mut router = Router::new()
        .route("/v2/", get(handlers::version_check))
        .route("/v2/_catalog", get(handlers::get_catalog))
        .fallback(handlers::v2_fallback);

    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(middleware::from_fn(request_metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A parsed v2 API path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum V2Route {
    /// `/v2/<name>/manifests/<reference>`
    Manifest {
        name: RepositoryName,
        reference: String,
    },

    /// `/v2/<name>/tags/list`
    TagsList { name: RepositoryName },

    /// `/v2/<name>/blobs/<digest>`
    Blob {
        name: RepositoryName,
        digest: String,
    },

    /// `/v2/<name>/blobs/uploads/`
    UploadStart { name: RepositoryName },

    /// `/v2/<name>/blobs/uploads/<id>`
    Upload { name: RepositoryName, id: String },
}

/// Parse a request path below `/v2/`.
pub(crate) fn parse_v2_path(path: &str) -> Result<V2Route, ApiErrors> {
    let not_found = || ApiErrors::single(ErrorCode::Unsupported, format!("unknown route: {path}"));

    let rest = path.strip_prefix("/v2/").ok_or_else(not_found)?;
    let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
    let n = segments.len();

    let parse_name = |parts: &[&str]| -> Result<RepositoryName, ApiErrors> {
        if parts.is_empty() {
            return Err(not_found());
        }
        RepositoryName::parse(&parts.join("/"))
            .map_err(|e| ApiErrors::single(ErrorCode::NameInvalid, e.to_string()))
    };

    if n >= 3 && segments[n - 2] == "tags" && segments[n - 1] == "list" {
        return Ok(V2Route::TagsList {
            name: parse_name(&segments[..n - 2])?,
        });
    }
    if n >= 3 && segments[n - 2] == "blobs" && segments[n - 1] == "uploads" {
        return Ok(V2Route::UploadStart {
            name: parse_name(&segments[..n - 2])?,
        });
    }
    if n >= 4 && segments[n - 3] == "blobs" && segments[n - 2] == "uploads" {
        return Ok(V2Route::Upload {
            name: parse_name(&segments[..n - 3])?,
            id: segments[n - 1].to_string(),
        });
    }
    if n >= 3 && segments[n - 2] == "manifests" {
        return Ok(V2Route::Manifest {
            name: parse_name(&segments[..n - 2])?,
            reference: segments[n - 1].to_string(),
        });
    }
    if n >= 3 && segments[n - 2] == "blobs" {
        return Ok(V2Route::Blob {
            name: parse_name(&segments[..n - 2])?,
            digest: segments[n - 1].to_string(),
        });
    }

    Err(not_found())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> RepositoryName {
        RepositoryName::parse(s).unwrap()
    }

    #[test]
    fn parses_manifest_routes_with_nested_names() {
        assert_eq!(
            parse_v2_path("/v2/library/ubuntu/manifests/latest").unwrap(),
            V2Route::Manifest {
                name: name("library/ubuntu"),
                reference: "latest".to_string(),
            }
        );
        assert_eq!(
            parse_v2_path("/v2/a/b/c/manifests/sha256:00").unwrap(),
            V2Route::Manifest {
                name: name("a/b/c"),
                reference: "sha256:00".to_string(),
            }
        );
    }

    #[test]
    fn parses_upload_routes() {
        assert_eq!(
            parse_v2_path("/v2/library/ubuntu/blobs/uploads/").unwrap(),
            V2Route::UploadStart {
                name: name("library/ubuntu"),
            }
        );
        assert_eq!(
            parse_v2_path("/v2/library/ubuntu/blobs/uploads/some-id").unwrap(),
            V2Route::Upload {
                name: name("library/ubuntu"),
                id: "some-id".to_string(),
            }
        );
    }

    #[test]
    fn parses_blob_and_tags_routes() {
        assert!(matches!(
            parse_v2_path("/v2/library/ubuntu/blobs/sha256:abc").unwrap(),
            V2Route::Blob { .. }
        ));
        assert!(matches!(
            parse_v2_path("/v2/library/ubuntu/tags/list").unwrap(),
            V2Route::TagsList { .. }
        ));
    }

    #[test]
    fn rejects_invalid_names_and_unknown_routes() {
        assert!(parse_v2_path("/v2/UPPER/manifests/latest").is_err());
        assert!(parse_v2_path("/v2/just-a-name").is_err());
        assert!(parse_v2_path("/other/prefix").is_err());
    }
}
