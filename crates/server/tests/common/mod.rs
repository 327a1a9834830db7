//! Common test utilities and fixtures.
// Each integration test binary uses a different subset of the helpers.
#![allow(dead_code)]

pub mod fixtures;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use bytes::Bytes;
use std::sync::Arc;
use stevedore_core::config::AppConfig;
use stevedore_metadata::InMemoryMetadataStore;
use stevedore_server::{AppState, create_router};
use stevedore_signer::TrustKey;
use stevedore_storage::{InMemoryDriver, Registry, RegistryOptions};
use tower::ServiceExt;

/// An in-process server over in-memory storage and metadata.
pub struct TestServer {
    pub router: Router,
    pub registry: Arc<Registry>,
}

impl TestServer {
    pub fn new() -> Self {
        let config = AppConfig::for_testing();
        let registry = Registry::new(
            Arc::new(InMemoryDriver::new()),
            InMemoryMetadataStore::new(),
            RegistryOptions::from(&config.registry),
            Some(Arc::new(TrustKey::generate())),
        );
        let router = create_router(AppState::new(config, registry.clone()));
        Self { router, registry }
    }
}

/// Issue a request and collect status, headers, and body.
pub async fn request(
    router: &Router,
    method: &str,
    uri: &str,
    headers: &[(&str, &str)],
    body: Option<Bytes>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder().method(method).uri(uri);
    for (key, value) in headers {
        builder = builder.header(*key, *value);
    }
    let body = match body {
        Some(bytes) => Body::from(bytes),
        None => Body::empty(),
    };

    let response = router
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, body)
}

/// Header value as a string, empty when absent.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// The error codes of an error response body.
pub fn error_codes(body: &Bytes) -> Vec<String> {
    let value: serde_json::Value = serde_json::from_slice(body).unwrap_or_default();
    value["errors"]
        .as_array()
        .map(|errors| {
            errors
                .iter()
                .filter_map(|e| e["code"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}
