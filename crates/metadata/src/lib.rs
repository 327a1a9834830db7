//! Metadata service abstraction and implementations for Stevedore.
//!
//! This crate provides the control-plane data model:
//! - Typed keys over a repository-scoped flat key space
//! - The `MetadataService` capability with CAS batch writes
//! - Request-scoped transactions with bounded retry
//! - Tag and manifest index services
//! - The metadata-gated blob descriptor service

pub mod error;
pub mod inmemory;
pub mod keys;
pub mod manifests;
pub mod service;
pub mod statter;
pub mod tags;
pub mod transaction;

pub use error::{MetadataError, MetadataResult};
pub use inmemory::InMemoryMetadataStore;
pub use keys::{IterKind, Key};
pub use manifests::{ManifestIndex, ManifestStore};
pub use service::{IterateParams, MetadataService, UpdateRecord, Value};
pub use statter::{BlobStatter, MetadataBlobStatter};
pub use tags::TagStore;
pub use transaction::{MAX_TX_ATTEMPTS, Transaction, update_repository};
