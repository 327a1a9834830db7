//! Schema-aware manifest store: verification on put, payloads as blobs.

use crate::blobs::BlobStore;
use async_trait::async_trait;
use std::sync::Arc;
use stevedore_core::digest::Digest;
use stevedore_core::error::Error;
use stevedore_core::manifest::Manifest;
use stevedore_core::reference::RepositoryName;
use stevedore_metadata::{
    Key, ManifestStore, MetadataBlobStatter, MetadataResult, MetadataService,
};

/// Manifest store writing canonical payloads into the repository's blob
/// store and verifying references against it.
pub struct BlobManifestStore {
    repo: RepositoryName,
    blobs: BlobStore,
    statter: Arc<MetadataBlobStatter>,
    metadata: Arc<dyn MetadataService>,
}

impl BlobManifestStore {
    pub(crate) fn new(
        repo: RepositoryName,
        blobs: BlobStore,
        statter: Arc<MetadataBlobStatter>,
        metadata: Arc<dyn MetadataService>,
    ) -> Self {
        Self {
            repo,
            blobs,
            statter,
            metadata,
        }
    }

    /// Verify a manifest against the blob store before it is written.
    /// Verification errors accumulate so a handler can report all of them.
    async fn verify(&self, manifest: &Manifest) -> MetadataResult<()> {
        let mut errors: Vec<Error> = Vec::new();

        match manifest {
            Manifest::Schema2(m) => {
                for descriptor in m.references() {
                    if self.statter.stat(&descriptor.digest).await.is_err() {
                        errors.push(Error::ManifestBlobUnknown(descriptor.digest.to_string()));
                    }
                }
            }
            Manifest::List(list) => {
                // Sub-manifests must already be stored in this repository.
                for descriptor in list.references() {
                    let key = Key::ManifestDigest(descriptor.digest.clone()).to_string();
                    if !self.metadata.exists(&key).await? {
                        errors.push(Error::ManifestBlobUnknown(descriptor.digest.to_string()));
                    }
                }
            }
            Manifest::Schema1(signed) => {
                if signed.body().name != self.repo.as_str() {
                    errors.push(Error::NameInvalid(signed.body().name.clone()));
                }
                // Signatures are self-certifying against the embedded JWK;
                // trust decisions belong to the caller.
                if stevedore_signer::verify_manifest(signed).is_err() {
                    errors.push(Error::ManifestUnverified);
                }
                for layer in &signed.body().fs_layers {
                    if self.statter.stat(&layer.blob_sum).await.is_err() {
                        errors.push(Error::ManifestBlobUnknown(layer.blob_sum.to_string()));
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::ManifestVerification(errors).into())
        }
    }
}

#[async_trait]
impl ManifestStore for BlobManifestStore {
    async fn get(&self, dgst: &Digest) -> MetadataResult<Manifest> {
        let payload = self
            .blobs
            .get(dgst)
            .await
            .map_err(|e| e.into_metadata())?;
        Ok(Manifest::unmarshal(None, payload)?)
    }

    async fn put(&self, manifest: &Manifest) -> MetadataResult<Digest> {
        self.verify(manifest).await?;

        let dgst = manifest.digest();
        self.blobs
            .put_at(&dgst, manifest.media_type(), manifest.payload().clone())
            .await
            .map_err(|e| e.into_metadata())?;
        Ok(dgst)
    }
}
