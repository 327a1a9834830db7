//! HTTP request handlers.

pub mod blobs;
pub mod catalog;
pub mod manifests;
pub mod tags;
pub mod uploads;

pub use catalog::get_catalog;

use crate::error::{ApiErrors, ErrorCode};
use crate::metrics::RequestMetrics;
use crate::routes::{V2Route, parse_v2_path};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// Header advertising v2 protocol support.
pub const API_VERSION_HEADER: (&str, &str) = ("Docker-Distribution-Api-Version", "registry/2.0");

/// Maximum accepted manifest payload (4 MiB).
const MAX_MANIFEST_BODY_SIZE: usize = 4 * 1024 * 1024;

/// Maximum accepted upload chunk per request (256 MiB).
const MAX_UPLOAD_CHUNK_SIZE: usize = 256 * 1024 * 1024;

/// GET /v2/ - protocol version check.
pub async fn version_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [API_VERSION_HEADER],
        Json(serde_json::json!({})),
    )
}

async fn read_body(req: Request, limit: usize, code: ErrorCode) -> Result<Bytes, ApiErrors> {
    axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| ApiErrors::single(code, format!("failed to read body: {e}")))
}

/// Dispatcher for every route whose repository name spans path segments.
pub async fn v2_fallback(State(state): State<AppState>, req: Request) -> Response {
    let method = req.method().clone();
    let headers = req.headers().clone();
    let query = req.uri().query().unwrap_or_default().to_string();
    let metrics = req
        .extensions()
        .get::<RequestMetrics>()
        .cloned()
        .unwrap_or_default();

    let route = match parse_v2_path(req.uri().path()) {
        Ok(route) => route,
        Err(errors) => return errors.into_response(),
    };

    let result: Result<Response, ApiErrors> = match (route, method.as_str()) {
        (V2Route::Manifest { name, reference }, "GET") => {
            manifests::get_manifest(&state, &metrics, name, &reference, &headers, true).await
        }
        (V2Route::Manifest { name, reference }, "HEAD") => {
            manifests::get_manifest(&state, &metrics, name, &reference, &headers, false).await
        }
        (V2Route::Manifest { name, reference }, "PUT") => {
            match read_body(req, MAX_MANIFEST_BODY_SIZE, ErrorCode::ManifestInvalid).await {
                Ok(body) => {
                    manifests::put_manifest(&state, &metrics, name, &reference, &headers, body)
                        .await
                }
                Err(errors) => Err(errors),
            }
        }
        (V2Route::Manifest { name, reference }, "DELETE") => {
            manifests::delete_manifest(&state, &metrics, name, &reference).await
        }
        (V2Route::TagsList { name }, "GET") => tags::list_tags(&state, name).await,
        (V2Route::Blob { name, digest }, "GET") => {
            blobs::get_blob(&state, &metrics, name, &digest, true).await
        }
        (V2Route::Blob { name, digest }, "HEAD") => {
            blobs::get_blob(&state, &metrics, name, &digest, false).await
        }
        (V2Route::Blob { name, digest }, "DELETE") => {
            blobs::delete_blob(&state, name, &digest).await
        }
        (V2Route::UploadStart { name }, "POST") => {
            uploads::start_upload(&state, &metrics, name, &query).await
        }
        (V2Route::Upload { name, id }, "PATCH") => {
            match read_body(req, MAX_UPLOAD_CHUNK_SIZE, ErrorCode::BlobUploadInvalid).await {
                Ok(body) => uploads::patch_upload(&state, name, &id, body).await,
                Err(errors) => Err(errors),
            }
        }
        (V2Route::Upload { name, id }, "PUT") => {
            match read_body(req, MAX_UPLOAD_CHUNK_SIZE, ErrorCode::BlobUploadInvalid).await {
                Ok(body) => uploads::put_upload(&state, &metrics, name, &id, &query, body).await,
                Err(errors) => Err(errors),
            }
        }
        (V2Route::Upload { name, id }, "GET") => {
            uploads::get_upload_status(&state, name, &id).await
        }
        (V2Route::Upload { name, id }, "DELETE") => {
            uploads::cancel_upload(&state, &metrics, name, &id).await
        }
        _ => Err(ApiErrors::single(
            ErrorCode::Unsupported,
            format!("method not allowed: {method}"),
        )),
    };

    match result {
        Ok(response) => response,
        Err(errors) => errors.into_response(),
    }
}

/// Look up a query parameter, percent-decoded.
pub(crate) fn query_value(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| percent_decode(v))
}

/// Decode `%XX` escapes and `+` in a query component. Malformed escapes are
/// kept literally.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3).and_then(|h| {
                    std::str::from_utf8(h)
                        .ok()
                        .and_then(|h| u8::from_str_radix(h, 16).ok())
                });
                match hex {
                    Some(b) => {
                        out.push(b);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_value_decodes_escapes() {
        let query = "mount=sha256%3Aabcd&from=library%2Fubuntu&digest=sha256:ff";
        assert_eq!(query_value(query, "mount").as_deref(), Some("sha256:abcd"));
        assert_eq!(
            query_value(query, "from").as_deref(),
            Some("library/ubuntu")
        );
        assert_eq!(query_value(query, "digest").as_deref(), Some("sha256:ff"));
        assert_eq!(query_value(query, "absent"), None);
    }
}
