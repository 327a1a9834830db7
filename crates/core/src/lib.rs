//! Core domain types and shared logic for the Stevedore registry.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content-addressed digests and incremental digesters
//! - Repository names, tags, and parsed references
//! - Blob descriptors
//! - Manifest schemas (schema1 signed, schema2, manifest lists)
//! - Application configuration

pub mod config;
pub mod descriptor;
pub mod digest;
pub mod error;
pub mod manifest;
pub mod reference;

pub use descriptor::Descriptor;
pub use digest::{CANONICAL_ALGORITHM, Digest, Digester};
pub use error::{Error, Result};
pub use manifest::Manifest;
pub use reference::{Reference, RepositoryName};

/// Media type served for raw blob content.
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";
