//! Prometheus metrics and per-request counters.
//!
//! The `/metrics` endpoint is only mounted when enabled in configuration;
//! restrict it to scraper networks when exposed.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static MANIFESTS_FETCHED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_manifests_fetched_total",
        "Total number of manifests served",
    )
    .expect("metric creation failed")
});

pub static MANIFESTS_PUT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_manifests_put_total",
        "Total number of manifests stored",
    )
    .expect("metric creation failed")
});

pub static MANIFESTS_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_manifests_deleted_total",
        "Total number of manifests deleted",
    )
    .expect("metric creation failed")
});

pub static MANIFESTS_DOWNCONVERTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_manifests_downconverted_total",
        "Total number of schema2 manifests rewritten as schema1 for legacy clients",
    )
    .expect("metric creation failed")
});

pub static BLOB_UPLOADS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_blob_uploads_created_total",
        "Total number of blob uploads opened",
    )
    .expect("metric creation failed")
});

pub static BLOB_UPLOADS_COMMITTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_blob_uploads_committed_total",
        "Total number of blob uploads committed",
    )
    .expect("metric creation failed")
});

pub static BLOB_UPLOADS_CANCELLED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_blob_uploads_cancelled_total",
        "Total number of blob uploads cancelled",
    )
    .expect("metric creation failed")
});

pub static BLOB_MOUNTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stevedore_blob_mounts_total",
        "Total number of cross-repository blob mounts",
    )
    .expect("metric creation failed")
});

pub static MANIFEST_PUT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stevedore_manifest_put_duration_seconds",
            "Time taken to verify and store a manifest",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
    )
    .expect("metric creation failed")
});

pub static BLOB_COMMIT_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "stevedore_blob_commit_duration_seconds",
            "Time taken to commit a blob upload",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Idempotent.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(MANIFESTS_FETCHED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MANIFESTS_PUT.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MANIFESTS_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MANIFESTS_DOWNCONVERTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_UPLOADS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_UPLOADS_COMMITTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_UPLOADS_CANCELLED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_MOUNTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(MANIFEST_PUT_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BLOB_COMMIT_DURATION.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Per-request counters, incremented by handlers as they touch the
/// storage and metadata services and logged when the request completes.
#[derive(Clone, Default)]
pub struct RequestMetrics {
    data: Arc<Mutex<HashMap<&'static str, u64>>>,
}

impl RequestMetrics {
    /// Increment a counter.
    pub fn increment(&self, key: &'static str) {
        let mut data = self.data.lock().unwrap_or_else(|e| e.into_inner());
        *data.entry(key).or_insert(0) += 1;
    }

    /// A copy of the current counters.
    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// Middleware attaching a [`RequestMetrics`] map to the request and logging
/// it on completion.
pub async fn request_metrics_middleware(mut request: Request, next: Next) -> Response {
    let metrics = RequestMetrics::default();
    request.extensions_mut().insert(metrics.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let counters = metrics.snapshot();
    if !counters.is_empty() {
        tracing::debug!(%method, %path, ?counters, "request metrics");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        register_metrics();
        register_metrics();
    }

    #[test]
    fn request_metrics_count() {
        let metrics = RequestMetrics::default();
        metrics.increment("manifest.get");
        metrics.increment("manifest.get");
        metrics.increment("blob.stat");
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot["manifest.get"], 2);
        assert_eq!(snapshot["blob.stat"], 1);
    }
}
