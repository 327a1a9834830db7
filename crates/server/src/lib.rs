//! HTTP frontend for Stevedore.
//!
//! This crate provides the Docker Registry HTTP API v2:
//! - Manifest GET/HEAD/PUT/DELETE with content negotiation
//! - Tag listing
//! - Blob HEAD/GET/DELETE with optional redirect responses
//! - Resumable blob uploads and cross-repository mounts
//! - Repository catalog pagination
//! - Prometheus metrics

pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod state;

pub use error::{ApiErrors, ErrorCode};
pub use routes::create_router;
pub use state::AppState;
