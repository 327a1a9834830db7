//! Tag listing handler.

use crate::error::{ApiErrors, ErrorCode};
use crate::state::AppState;
use axum::Json;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use stevedore_core::reference::RepositoryName;
use stevedore_metadata::MetadataError;

#[derive(Serialize)]
struct TagsResponse {
    name: String,
    tags: Vec<String>,
}

/// GET /v2/<name>/tags/list
pub(crate) async fn list_tags(
    state: &AppState,
    name: RepositoryName,
) -> Result<Response, ApiErrors> {
    let repo = state.registry.repository(name.clone());
    let tags = repo.tags().all().await.map_err(|err| match err {
        MetadataError::RepositoryUnknown(name) => ApiErrors::single(
            ErrorCode::NameUnknown,
            format!("repository name not known to registry: {name}"),
        ),
        other => other.into(),
    })?;

    Ok(Json(TagsResponse {
        name: name.to_string(),
        tags,
    })
    .into_response())
}
