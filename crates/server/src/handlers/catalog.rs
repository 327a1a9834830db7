//! Repository catalog handler.

use crate::error::ApiErrors;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use stevedore_storage::CATALOG_PAGE_SIZE;

#[derive(Deserialize)]
pub struct CatalogQuery {
    n: Option<usize>,
    last: Option<String>,
}

#[derive(Serialize)]
struct CatalogResponse {
    repositories: Vec<String>,
}

/// GET /v2/_catalog?n=<size>&last=<cursor>
pub async fn get_catalog(
    State(state): State<AppState>,
    Query(query): Query<CatalogQuery>,
) -> Result<Response, ApiErrors> {
    let limit = query.n.unwrap_or(CATALOG_PAGE_SIZE).clamp(1, CATALOG_PAGE_SIZE);
    let last = query.last.unwrap_or_default();

    let page = state.registry.repositories(limit, &last).await?;

    let mut response = Json(CatalogResponse {
        repositories: page.repositories.clone(),
    })
    .into_response();

    // Offer the next page while enumeration is incomplete.
    if !page.complete {
        if let Some(tail) = page.repositories.last() {
            let link = format!("</v2/_catalog?last={tail}&n={limit}>; rel=\"next\"");
            if let Ok(value) = link.parse() {
                response.headers_mut().insert(header::LINK, value);
            }
        }
    }
    Ok(response)
}
