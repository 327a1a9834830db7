//! Storage layer for Stevedore.
//!
//! This crate provides:
//! - The `StorageDriver` capability and the filesystem and in-memory drivers
//! - The registry path layout under `/docker/registry/v2`
//! - Repository-scoped blob stores with resumable chunked uploads and
//!   cross-repository mounts
//! - The schema-aware manifest store with verification on put
//! - Paged repository enumeration (metadata-backed and storage-walk)
//! - CDN URL signing for redirected blob downloads

pub mod blobs;
pub mod catalog;
pub mod cdn;
pub mod driver;
pub mod error;
pub mod manifests;
pub mod paths;
pub mod registry;

pub use blobs::{BlobStore, BlobWriter, CreateOptions, MountRequest};
pub use catalog::{CATALOG_PAGE_SIZE, CatalogPage};
pub use driver::{
    ByteStream, FileInfo, FileWriter, StorageDriver, WalkDecision, filesystem::FilesystemDriver,
    memory::InMemoryDriver,
};
pub use error::{StorageError, StorageResult};
pub use registry::{Registry, RegistryOptions, Repository};

use std::sync::Arc;
use stevedore_core::config::StorageConfig;

/// Create a storage driver from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn StorageDriver>> {
    match config {
        StorageConfig::Filesystem { path } => {
            let driver = FilesystemDriver::new(path).await?;
            Ok(Arc::new(driver))
        }
        StorageConfig::Memory => Ok(Arc::new(InMemoryDriver::new())),
    }
}
