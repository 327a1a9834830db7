//! Manifest index: existence gate, delete policy, and enumeration over the
//! schema-aware manifest store.

use crate::error::MetadataResult;
use crate::keys::{IterKind, Key};
use crate::service::{IterateParams, MetadataService, Value};
use crate::transaction::Transaction;
use async_trait::async_trait;
use std::sync::Arc;
use stevedore_core::digest::Digest;
use stevedore_core::error::Error;
use stevedore_core::manifest::Manifest;
use stevedore_core::reference::RepositoryName;

/// The schema-aware manifest store the index delegates payload handling to.
/// `put` verifies the manifest against the blob store and writes its
/// canonical payload; `get` decodes a stored payload back into a manifest.
#[async_trait]
pub trait ManifestStore: Send + Sync {
    async fn get(&self, dgst: &Digest) -> MetadataResult<Manifest>;
    async fn put(&self, manifest: &Manifest) -> MetadataResult<Digest>;
}

/// The manifest service for one repository.
pub struct ManifestIndex {
    repo: RepositoryName,
    store: Arc<dyn MetadataService>,
    manifests: Arc<dyn ManifestStore>,
    delete_enabled: bool,
}

impl ManifestIndex {
    /// Create a manifest index over a repository-scoped metadata service and
    /// a manifest store.
    pub fn new(
        repo: RepositoryName,
        store: Arc<dyn MetadataService>,
        manifests: Arc<dyn ManifestStore>,
        delete_enabled: bool,
    ) -> Self {
        Self {
            repo,
            store,
            manifests,
            delete_enabled,
        }
    }

    /// Whether the manifest exists in this repository.
    pub async fn exists(&self, dgst: &Digest) -> MetadataResult<bool> {
        let key = Key::ManifestDigest(dgst.clone()).to_string();
        self.store.exists(&key).await
    }

    /// Retrieve the manifest with the given digest.
    pub async fn get(&self, dgst: &Digest) -> MetadataResult<Manifest> {
        if !self.exists(dgst).await? {
            return Err(Error::ManifestUnknown {
                name: self.repo.to_string(),
                digest: dgst.to_string(),
            }
            .into());
        }
        self.manifests.get(dgst).await
    }

    /// Verify and store a manifest, returning its canonical digest. The
    /// manifest key is written through the transaction when one is supplied.
    pub async fn put(&self, tx: Option<&Transaction>, manifest: &Manifest) -> MetadataResult<Digest> {
        let dgst = self.manifests.put(manifest).await?;
        let key = Key::ManifestDigest(dgst.clone());
        match tx {
            Some(tx) => {
                tx.update(&key, Some(Value::Bytes(manifest.payload().clone())))
                    .await?
            }
            None => {
                self.store
                    .put(&key.to_string(), Value::Digest(dgst.clone()))
                    .await?
            }
        }
        Ok(dgst)
    }

    /// Remove the manifest key. Gated by the deletion policy; deleting an
    /// absent manifest is an error.
    pub async fn delete(&self, tx: Option<&Transaction>, dgst: &Digest) -> MetadataResult<()> {
        if !self.delete_enabled {
            return Err(Error::Unsupported.into());
        }
        if !self.exists(dgst).await? {
            return Err(Error::BlobUnknown(dgst.to_string()).into());
        }
        let key = Key::ManifestDigest(dgst.clone());
        match tx {
            Some(tx) => tx.update(&key, None).await,
            None => self.store.delete(&key.to_string()).await,
        }
    }

    /// Invoke `f` with the digest of every manifest in this repository.
    pub async fn enumerate(
        &self,
        f: &mut (dyn FnMut(&Digest) -> MetadataResult<()> + Send),
    ) -> MetadataResult<()> {
        self.store
            .iterate(
                IterateParams::all(IterKind::ManifestDigest),
                &mut |key, _| {
                    let dgst = Digest::parse(key)?;
                    f(&dgst)
                },
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MetadataError;
    use crate::inmemory::InMemoryMetadataStore;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use stevedore_core::descriptor::Descriptor;
    use stevedore_core::manifest::schema2;
    use stevedore_core::manifest::{MEDIA_TYPE_IMAGE_CONFIG, MEDIA_TYPE_LAYER};

    /// Manifest store stub that keeps payloads in a map, standing in for the
    /// blob-backed store.
    #[derive(Default)]
    struct FakeManifestStore {
        stored: Mutex<HashMap<Digest, bytes::Bytes>>,
    }

    #[async_trait]
    impl ManifestStore for FakeManifestStore {
        async fn get(&self, dgst: &Digest) -> MetadataResult<Manifest> {
            let stored = self.stored.lock().unwrap();
            let payload = stored
                .get(dgst)
                .cloned()
                .ok_or_else(|| MetadataError::Internal(format!("missing payload {dgst}")))?;
            Ok(Manifest::unmarshal(None, payload)?)
        }

        async fn put(&self, manifest: &Manifest) -> MetadataResult<Digest> {
            let dgst = manifest.digest();
            self.stored
                .lock()
                .unwrap()
                .insert(dgst.clone(), manifest.payload().clone());
            Ok(dgst)
        }
    }

    fn sample_manifest(seed: &[u8]) -> Manifest {
        let config = Descriptor::new(MEDIA_TYPE_IMAGE_CONFIG, 1, Digest::from_bytes(seed));
        let layers = vec![Descriptor::new(MEDIA_TYPE_LAYER, 2, Digest::from_bytes(b"l"))];
        Manifest::Schema2(schema2::Manifest::new(config, layers).unwrap())
    }

    fn setup(delete_enabled: bool) -> ManifestIndex {
        let repo = RepositoryName::parse("library/ubuntu").unwrap();
        let store = InMemoryMetadataStore::new().repository_scoped(&repo);
        ManifestIndex::new(
            repo,
            store,
            Arc::new(FakeManifestStore::default()),
            delete_enabled,
        )
    }

    #[tokio::test]
    async fn put_then_exists_and_get() {
        let index = setup(false);
        let manifest = sample_manifest(b"a");
        let dgst = index.put(None, &manifest).await.unwrap();

        assert_eq!(dgst, manifest.digest());
        assert!(index.exists(&dgst).await.unwrap());
        let loaded = index.get(&dgst).await.unwrap();
        assert_eq!(loaded.payload(), manifest.payload());
    }

    #[tokio::test]
    async fn get_unknown_digest_fails() {
        let index = setup(false);
        let missing = Digest::from_bytes(b"missing");
        assert!(matches!(
            index.get(&missing).await,
            Err(MetadataError::Domain(Error::ManifestUnknown { .. }))
        ));
    }

    #[tokio::test]
    async fn delete_gated_by_policy() {
        let index = setup(false);
        let dgst = index.put(None, &sample_manifest(b"a")).await.unwrap();
        assert!(matches!(
            index.delete(None, &dgst).await,
            Err(MetadataError::Domain(Error::Unsupported))
        ));
    }

    #[tokio::test]
    async fn delete_requires_existence() {
        let index = setup(true);
        let missing = Digest::from_bytes(b"missing");
        assert!(matches!(
            index.delete(None, &missing).await,
            Err(MetadataError::Domain(Error::BlobUnknown(_)))
        ));
    }

    #[tokio::test]
    async fn delete_removes_manifest() {
        let index = setup(true);
        let dgst = index.put(None, &sample_manifest(b"a")).await.unwrap();
        index.delete(None, &dgst).await.unwrap();
        assert!(!index.exists(&dgst).await.unwrap());
    }

    #[tokio::test]
    async fn enumerate_yields_each_digest() {
        let index = setup(false);
        let d1 = index.put(None, &sample_manifest(b"a")).await.unwrap();
        let d2 = index.put(None, &sample_manifest(b"b")).await.unwrap();

        let mut seen = Vec::new();
        index
            .enumerate(&mut |dgst| {
                seen.push(dgst.clone());
                Ok(())
            })
            .await
            .unwrap();
        seen.sort();
        let mut expected = vec![d1, d2];
        expected.sort();
        assert_eq!(seen, expected);
    }
}
