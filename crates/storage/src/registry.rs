//! The registry namespace and request-scoped repository facets.

use crate::blobs::{BlobStore, DriverStatter};
use crate::driver::StorageDriver;
use crate::manifests::BlobManifestStore;
use std::sync::Arc;
use stevedore_core::config::RegistrySettings;
use stevedore_core::reference::RepositoryName;
use stevedore_metadata::{ManifestIndex, MetadataBlobStatter, MetadataService, TagStore};
use stevedore_signer::TrustKey;

/// Registry behaviour flags, mirrored from configuration.
#[derive(Clone, Debug, Default)]
pub struct RegistryOptions {
    pub delete_enabled: bool,
    pub resumable_digest_enabled: bool,
    pub redirect: bool,
    pub catalog_from_storage: bool,
}

impl From<&RegistrySettings> for RegistryOptions {
    fn from(settings: &RegistrySettings) -> Self {
        Self {
            delete_enabled: settings.delete_enabled,
            resumable_digest_enabled: settings.resumable_digest_enabled,
            redirect: settings.redirect,
            catalog_from_storage: settings.catalog_from_storage,
        }
    }
}

/// The top-level registry: a namespace of repositories over one storage
/// driver and one metadata service.
///
/// A registry is shared by all requests; the per-repository facets it hands
/// out are request-scoped and cheap to allocate.
pub struct Registry {
    driver: Arc<dyn StorageDriver>,
    metadata: Arc<dyn MetadataService>,
    options: RegistryOptions,
    trust_key: Option<Arc<TrustKey>>,
}

impl Registry {
    /// Create a registry.
    pub fn new(
        driver: Arc<dyn StorageDriver>,
        metadata: Arc<dyn MetadataService>,
        options: RegistryOptions,
        trust_key: Option<Arc<TrustKey>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            driver,
            metadata,
            options,
            trust_key,
        })
    }

    /// The storage driver.
    pub fn driver(&self) -> Arc<dyn StorageDriver> {
        self.driver.clone()
    }

    /// The base (unscoped) metadata service.
    pub fn metadata(&self) -> Arc<dyn MetadataService> {
        self.metadata.clone()
    }

    /// Behaviour flags.
    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// The schema1 trust key, when configured.
    pub fn trust_key(&self) -> Option<&Arc<TrustKey>> {
        self.trust_key.as_ref()
    }

    /// A request-scoped view of one repository.
    pub fn repository(&self, name: RepositoryName) -> Repository {
        let metadata = self.metadata.clone().repository_scoped(&name);
        Repository {
            name,
            driver: self.driver.clone(),
            metadata,
            metadata_base: self.metadata.clone(),
            options: self.options.clone(),
        }
    }
}

/// Name-scoped access to a repository's manifests, tags, and blobs.
///
/// Instances are request-scoped: allocate one per request rather than
/// sharing across tasks.
pub struct Repository {
    name: RepositoryName,
    driver: Arc<dyn StorageDriver>,
    metadata: Arc<dyn MetadataService>,
    metadata_base: Arc<dyn MetadataService>,
    options: RegistryOptions,
}

impl Repository {
    /// The repository name.
    pub fn name(&self) -> &RepositoryName {
        &self.name
    }

    /// The repository-scoped metadata service.
    pub fn metadata(&self) -> Arc<dyn MetadataService> {
        self.metadata.clone()
    }

    /// The repository's blob descriptor service.
    pub fn statter(&self) -> Arc<MetadataBlobStatter> {
        Arc::new(MetadataBlobStatter::new(
            self.metadata.clone(),
            Arc::new(DriverStatter::new(self.driver.clone())),
        ))
    }

    /// The repository's blob service.
    pub fn blobs(&self) -> BlobStore {
        BlobStore::new(
            self.name.clone(),
            self.driver.clone(),
            self.metadata.clone(),
            self.metadata_base.clone(),
            self.options.clone(),
            self.statter(),
        )
    }

    /// The repository's tag service.
    pub fn tags(&self) -> TagStore {
        TagStore::new(self.name.clone(), self.metadata.clone())
    }

    /// The repository's manifest service.
    pub fn manifests(&self) -> ManifestIndex {
        let store = BlobManifestStore::new(
            self.name.clone(),
            self.blobs(),
            self.statter(),
            self.metadata.clone(),
        );
        ManifestIndex::new(
            self.name.clone(),
            self.metadata.clone(),
            Arc::new(store),
            self.options.delete_enabled,
        )
    }
}
