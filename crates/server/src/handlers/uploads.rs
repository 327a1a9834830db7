//! Blob upload handlers: create (with mount), append, complete, status,
//! cancel.

use crate::error::{ApiErrors, ErrorCode};
use crate::handlers::query_value;
use crate::metrics::{
    BLOB_COMMIT_DURATION, BLOB_MOUNTS, BLOB_UPLOADS_CANCELLED, BLOB_UPLOADS_COMMITTED,
    BLOB_UPLOADS_CREATED, RequestMetrics,
};
use crate::state::AppState;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use stevedore_core::digest::Digest;
use stevedore_core::error::Error;
use stevedore_core::reference::RepositoryName;
use stevedore_storage::{BlobWriter, CreateOptions, MountRequest, StorageError};

fn upload_location(name: &RepositoryName, id: &str) -> String {
    format!("/v2/{name}/blobs/uploads/{id}")
}

fn blob_location(name: &RepositoryName, digest: &Digest) -> String {
    format!("/v2/{name}/blobs/{digest}")
}

/// The inclusive byte range uploaded so far, per the upload protocol.
fn range_header(size: u64) -> String {
    format!("0-{}", size.saturating_sub(1))
}

/// POST /v2/<name>/blobs/uploads/?mount=<digest>&from=<repository>
pub(crate) async fn start_upload(
    state: &AppState,
    metrics: &RequestMetrics,
    name: RepositoryName,
    query: &str,
) -> Result<Response, ApiErrors> {
    let repo = state.registry.repository(name.clone());

    let mount = match (query_value(query, "mount"), query_value(query, "from")) {
        (Some(digest), Some(from)) => Some(MountRequest {
            from: RepositoryName::parse(&from)
                .map_err(|e| ApiErrors::single(ErrorCode::NameInvalid, e.to_string()))?,
            digest: Digest::parse(&digest)
                .map_err(|e| ApiErrors::single(ErrorCode::DigestInvalid, e.to_string()))?,
        }),
        _ => None,
    };

    match repo.blobs().create(CreateOptions { mount }).await {
        Ok(writer) => {
            let id = writer.id().to_string();
            writer.close().await?;
            BLOB_UPLOADS_CREATED.inc();
            metrics.increment("upload.create");

            let location = upload_location(&name, &id);
            Ok((
                StatusCode::ACCEPTED,
                [
                    (header::LOCATION.as_str(), location.as_str()),
                    (header::RANGE.as_str(), "0-0"),
                    ("Docker-Upload-UUID", id.as_str()),
                ],
            )
                .into_response())
        }
        Err(StorageError::Domain(Error::BlobMounted { descriptor, .. })) => {
            BLOB_MOUNTS.inc();
            metrics.increment("upload.mount");

            let location = blob_location(&name, &descriptor.digest);
            Ok((
                StatusCode::CREATED,
                [
                    (header::LOCATION.as_str(), location.as_str()),
                    ("Docker-Content-Digest", descriptor.digest.as_str()),
                ],
            )
                .into_response())
        }
        Err(err) => Err(err.into()),
    }
}

async fn resume(
    state: &AppState,
    name: &RepositoryName,
    id: &str,
) -> Result<BlobWriter, ApiErrors> {
    let repo = state.registry.repository(name.clone());
    Ok(repo.blobs().resume(id).await?)
}

/// PATCH /v2/<name>/blobs/uploads/<id>
pub(crate) async fn patch_upload(
    state: &AppState,
    name: RepositoryName,
    id: &str,
    body: Bytes,
) -> Result<Response, ApiErrors> {
    let mut writer = resume(state, &name, id).await?;
    if !body.is_empty() {
        writer.write(body).await?;
    }
    let size = writer.size();
    writer.close().await?;

    let location = upload_location(&name, id);
    let range = range_header(size);
    Ok((
        StatusCode::ACCEPTED,
        [
            (header::LOCATION.as_str(), location.as_str()),
            (header::RANGE.as_str(), range.as_str()),
            ("Docker-Upload-UUID", id),
        ],
    )
        .into_response())
}

/// PUT /v2/<name>/blobs/uploads/<id>?digest=<digest>
pub(crate) async fn put_upload(
    state: &AppState,
    metrics: &RequestMetrics,
    name: RepositoryName,
    id: &str,
    query: &str,
    body: Bytes,
) -> Result<Response, ApiErrors> {
    let digest = match query_value(query, "digest") {
        Some(raw) => Digest::parse(&raw)
            .map_err(|e| ApiErrors::single(ErrorCode::DigestInvalid, e.to_string()))?,
        None => {
            return Err(ApiErrors::single(
                ErrorCode::DigestInvalid,
                "digest parameter is required to complete an upload",
            ));
        }
    };

    let mut writer = resume(state, &name, id).await?;
    if !body.is_empty() {
        writer.write(body).await?;
    }

    let timer = BLOB_COMMIT_DURATION.start_timer();
    let desc = writer.commit(Some(&digest)).await?;
    timer.observe_duration();

    BLOB_UPLOADS_COMMITTED.inc();
    metrics.increment("upload.commit");

    let location = blob_location(&name, &desc.digest);
    Ok((
        StatusCode::CREATED,
        [
            (header::LOCATION.as_str(), location.as_str()),
            ("Docker-Content-Digest", desc.digest.as_str()),
        ],
    )
        .into_response())
}

/// GET /v2/<name>/blobs/uploads/<id> - upload progress.
pub(crate) async fn get_upload_status(
    state: &AppState,
    name: RepositoryName,
    id: &str,
) -> Result<Response, ApiErrors> {
    let writer = resume(state, &name, id).await?;
    let size = writer.size();
    writer.close().await?;

    let range = range_header(size);
    Ok((
        StatusCode::NO_CONTENT,
        [
            (header::RANGE.as_str(), range.as_str()),
            ("Docker-Upload-UUID", id),
        ],
    )
        .into_response())
}

/// DELETE /v2/<name>/blobs/uploads/<id> - cancel an upload.
pub(crate) async fn cancel_upload(
    state: &AppState,
    metrics: &RequestMetrics,
    name: RepositoryName,
    id: &str,
) -> Result<Response, ApiErrors> {
    let writer = resume(state, &name, id).await?;
    writer.cancel().await?;

    BLOB_UPLOADS_CANCELLED.inc();
    metrics.increment("upload.cancel");
    Ok(StatusCode::NO_CONTENT.into_response())
}
