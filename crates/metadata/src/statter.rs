//! Metadata-gated blob descriptor service.

use crate::error::MetadataResult;
use crate::keys::Key;
use crate::service::{MetadataService, Value};
use async_trait::async_trait;
use std::sync::Arc;
use stevedore_core::descriptor::Descriptor;
use stevedore_core::digest::Digest;
use stevedore_core::error::Error;

/// Descriptor lookup by digest. The metadata statter layers a repository
/// membership check over an underlying statter that resolves size and media
/// type from the driver.
#[async_trait]
pub trait BlobStatter: Send + Sync {
    async fn stat(&self, dgst: &Digest) -> MetadataResult<Descriptor>;
}

/// Blob descriptor service backed by `blob::` keys.
///
/// A blob is visible in a repository only once its `blob::<digest>` key has
/// been written; resolution of the descriptor itself is delegated to the
/// backend statter.
pub struct MetadataBlobStatter {
    store: Arc<dyn MetadataService>,
    backend: Arc<dyn BlobStatter>,
}

impl MetadataBlobStatter {
    /// Create a statter over a repository-scoped metadata service.
    pub fn new(store: Arc<dyn MetadataService>, backend: Arc<dyn BlobStatter>) -> Self {
        Self { store, backend }
    }

    /// Look up the descriptor for a digest in this repository.
    pub async fn stat(&self, dgst: &Digest) -> MetadataResult<Descriptor> {
        let key = Key::Blob(dgst.clone()).to_string();
        match self.store.get(&key).await? {
            None => Err(Error::BlobUnknown(dgst.to_string()).into()),
            Some(_) => self.backend.stat(dgst).await,
        }
    }

    /// Record a descriptor for a digest in this repository.
    pub async fn set_descriptor(&self, dgst: &Digest, desc: Descriptor) -> MetadataResult<()> {
        let key = Key::Blob(dgst.clone()).to_string();
        self.store.put(&key, Value::Descriptor(desc)).await
    }

    /// Remove the descriptor for a digest from this repository.
    pub async fn clear(&self, dgst: &Digest) -> MetadataResult<()> {
        let key = Key::Blob(dgst.clone()).to_string();
        self.store.delete(&key).await
    }
}

#[async_trait]
impl BlobStatter for MetadataBlobStatter {
    async fn stat(&self, dgst: &Digest) -> MetadataResult<Descriptor> {
        MetadataBlobStatter::stat(self, dgst).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetadataError;
    use crate::inmemory::InMemoryMetadataStore;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use stevedore_core::reference::RepositoryName;

    /// Backend stub resolving descriptors from a fixed map, standing in for
    /// the driver-backed statter.
    #[derive(Default)]
    struct FakeBackend {
        blobs: Mutex<HashMap<Digest, Descriptor>>,
    }

    #[async_trait]
    impl BlobStatter for FakeBackend {
        async fn stat(&self, dgst: &Digest) -> MetadataResult<Descriptor> {
            self.blobs
                .lock()
                .unwrap()
                .get(dgst)
                .cloned()
                .ok_or_else(|| Error::BlobUnknown(dgst.to_string()).into())
        }
    }

    fn setup() -> (MetadataBlobStatter, Arc<FakeBackend>) {
        let repo = RepositoryName::parse("library/ubuntu").unwrap();
        let store = InMemoryMetadataStore::new().repository_scoped(&repo);
        let backend = Arc::new(FakeBackend::default());
        (
            MetadataBlobStatter::new(store, backend.clone()),
            backend,
        )
    }

    #[tokio::test]
    async fn stat_requires_repository_membership() {
        let (statter, backend) = setup();
        let dgst = Digest::from_bytes(b"blob");
        let desc = Descriptor::new("application/octet-stream", 4, dgst.clone());

        // Present in the backend but not linked into the repository.
        backend
            .blobs
            .lock()
            .unwrap()
            .insert(dgst.clone(), desc.clone());
        assert!(matches!(
            statter.stat(&dgst).await,
            Err(MetadataError::Domain(Error::BlobUnknown(_)))
        ));

        statter.set_descriptor(&dgst, desc.clone()).await.unwrap();
        assert_eq!(statter.stat(&dgst).await.unwrap(), desc);
    }

    #[tokio::test]
    async fn clear_unlinks_blob() {
        let (statter, backend) = setup();
        let dgst = Digest::from_bytes(b"blob");
        let desc = Descriptor::new("application/octet-stream", 4, dgst.clone());
        backend
            .blobs
            .lock()
            .unwrap()
            .insert(dgst.clone(), desc.clone());

        statter.set_descriptor(&dgst, desc).await.unwrap();
        statter.clear(&dgst).await.unwrap();
        assert!(statter.stat(&dgst).await.is_err());
        // Clearing twice reports the missing key.
        assert!(matches!(
            statter.clear(&dgst).await,
            Err(MetadataError::KeyNotFound(_))
        ));
    }
}
