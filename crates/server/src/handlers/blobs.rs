//! Blob handlers: HEAD/GET with optional redirect, DELETE.

use crate::error::{ApiErrors, ErrorCode};
use crate::metrics::RequestMetrics;
use crate::state::AppState;
use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use stevedore_core::digest::Digest;
use stevedore_core::reference::RepositoryName;

fn parse_digest(raw: &str) -> Result<Digest, ApiErrors> {
    Digest::parse(raw).map_err(|e| ApiErrors::single(ErrorCode::DigestInvalid, e.to_string()))
}

/// GET/HEAD /v2/<name>/blobs/<digest>
pub(crate) async fn get_blob(
    state: &AppState,
    metrics: &RequestMetrics,
    name: RepositoryName,
    raw_digest: &str,
    include_body: bool,
) -> Result<Response, ApiErrors> {
    let digest = parse_digest(raw_digest)?;
    let repo = state.registry.repository(name);
    let blobs = repo.blobs();

    let desc = blobs.stat(&digest).await?;
    metrics.increment("blob.stat");

    if include_body {
        // Redirect mode hands the client a driver-signed URL instead of
        // proxying bytes.
        if let Some(url) = blobs.redirect_url(&digest).await? {
            return Ok((
                StatusCode::TEMPORARY_REDIRECT,
                [
                    (header::LOCATION.as_str(), url.as_str()),
                    ("Docker-Content-Digest", digest.as_str()),
                ],
            )
                .into_response());
        }
    }

    let body = if include_body {
        let (_, stream) = blobs.open(&digest).await?;
        metrics.increment("blob.read");
        Body::from_stream(stream)
    } else {
        Body::empty()
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, desc.media_type.as_str())
        .header(header::CONTENT_LENGTH, desc.size)
        .header("Docker-Content-Digest", digest.as_str())
        .header(header::ETAG, format!("\"{digest}\""))
        .body(body)
        .map_err(|e| ApiErrors::single(ErrorCode::Unknown, e.to_string()))
}

/// DELETE /v2/<name>/blobs/<digest>
pub(crate) async fn delete_blob(
    state: &AppState,
    name: RepositoryName,
    raw_digest: &str,
) -> Result<Response, ApiErrors> {
    let digest = parse_digest(raw_digest)?;
    let repo = state.registry.repository(name);

    repo.blobs().delete(&digest).await?;
    Ok((
        StatusCode::ACCEPTED,
        [("Docker-Content-Digest", digest.as_str())],
    )
        .into_response())
}
