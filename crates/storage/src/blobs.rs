//! Repository-scoped blob store and the upload state machine.

use crate::driver::{ByteStream, FileWriter, StorageDriver};
use crate::error::{StorageError, StorageResult};
use crate::paths;
use crate::registry::RegistryOptions;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;
use stevedore_core::MEDIA_TYPE_OCTET_STREAM;
use stevedore_core::descriptor::Descriptor;
use stevedore_core::digest::{Digest, Digester};
use stevedore_core::error::Error;
use stevedore_core::reference::RepositoryName;
use stevedore_metadata::{
    BlobStatter, Key, MetadataBlobStatter, MetadataError, MetadataResult, MetadataService, Value,
    update_repository,
};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Statter resolving descriptors straight from the driver's blob tree,
/// used underneath the metadata statter.
pub struct DriverStatter {
    driver: Arc<dyn StorageDriver>,
}

impl DriverStatter {
    pub fn new(driver: Arc<dyn StorageDriver>) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl BlobStatter for DriverStatter {
    async fn stat(&self, dgst: &Digest) -> MetadataResult<Descriptor> {
        let path = paths::blob_data_path(dgst);
        match self.driver.stat(&path).await {
            Ok(info) => Ok(Descriptor::new(
                MEDIA_TYPE_OCTET_STREAM,
                info.size,
                dgst.clone(),
            )),
            Err(StorageError::PathNotFound(_)) => {
                Err(Error::BlobUnknown(dgst.to_string()).into())
            }
            Err(err) => Err(err.into_metadata()),
        }
    }
}

/// A cross-repository mount request.
#[derive(Clone, Debug)]
pub struct MountRequest {
    /// The repository the blob already lives in.
    pub from: RepositoryName,

    /// The blob to mount.
    pub digest: Digest,
}

/// Options for [`BlobStore::create`].
#[derive(Clone, Debug, Default)]
pub struct CreateOptions {
    /// When set, try to mount the blob instead of opening an upload.
    pub mount: Option<MountRequest>,
}

/// The blob service for one repository: reads gated by the metadata
/// statter, writes through the resumable upload state machine.
pub struct BlobStore {
    repo: RepositoryName,
    driver: Arc<dyn StorageDriver>,
    metadata: Arc<dyn MetadataService>,
    metadata_base: Arc<dyn MetadataService>,
    options: RegistryOptions,
    statter: Arc<MetadataBlobStatter>,
}

impl BlobStore {
    pub(crate) fn new(
        repo: RepositoryName,
        driver: Arc<dyn StorageDriver>,
        metadata: Arc<dyn MetadataService>,
        metadata_base: Arc<dyn MetadataService>,
        options: RegistryOptions,
        statter: Arc<MetadataBlobStatter>,
    ) -> Self {
        Self {
            repo,
            driver,
            metadata,
            metadata_base,
            options,
            statter,
        }
    }

    /// The repository's blob descriptor service.
    pub fn statter(&self) -> &Arc<MetadataBlobStatter> {
        &self.statter
    }

    /// Look up a blob's descriptor in this repository.
    pub async fn stat(&self, dgst: &Digest) -> StorageResult<Descriptor> {
        Ok(self.statter.stat(dgst).await?)
    }

    /// Read a blob's full content.
    pub async fn get(&self, dgst: &Digest) -> StorageResult<Bytes> {
        self.stat(dgst).await?;
        self.driver.get_content(&paths::blob_data_path(dgst)).await
    }

    /// Open a blob for streaming, returning its descriptor and a byte
    /// stream.
    pub async fn open(&self, dgst: &Digest) -> StorageResult<(Descriptor, ByteStream)> {
        let desc = self.stat(dgst).await?;
        let stream = self.driver.reader(&paths::blob_data_path(dgst), 0).await?;
        Ok((desc, stream))
    }

    /// A redirect URL for a blob, when the registry is configured for
    /// redirects and the driver can mint one.
    pub async fn redirect_url(&self, dgst: &Digest) -> StorageResult<Option<String>> {
        if !self.options.redirect {
            return Ok(None);
        }
        match self.driver.url_for(&paths::blob_data_path(dgst)).await {
            Ok(url) => Ok(Some(url)),
            Err(StorageError::Unsupported) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Store a complete blob, linking it into this repository.
    pub async fn put(&self, media_type: &str, payload: Bytes) -> StorageResult<Descriptor> {
        let dgst = Digest::from_bytes(&payload);
        self.put_at(&dgst, media_type, payload).await
    }

    /// Store blob content under an explicit digest. Used by the manifest
    /// store, where schema1 payloads are addressed by their canonical
    /// (signature-stripped) digest rather than the payload hash.
    pub(crate) async fn put_at(
        &self,
        dgst: &Digest,
        media_type: &str,
        payload: Bytes,
    ) -> StorageResult<Descriptor> {
        let size = payload.len() as u64;
        self.driver
            .put_content(&paths::blob_data_path(dgst), payload)
            .await?;
        self.driver
            .put_content(
                &paths::layer_link_path(&self.repo, dgst),
                Bytes::from(dgst.to_string()),
            )
            .await?;

        let desc = Descriptor::new(media_type, size, dgst.clone());
        self.statter.set_descriptor(dgst, desc.clone()).await?;
        Ok(desc)
    }

    /// Remove a blob from this repository. Gated by the deletion policy.
    pub async fn delete(&self, dgst: &Digest) -> StorageResult<()> {
        if !self.options.delete_enabled {
            return Err(Error::Unsupported.into());
        }
        match self.statter.clear(dgst).await {
            Ok(()) => Ok(()),
            Err(MetadataError::KeyNotFound(_)) => {
                Err(Error::BlobUnknown(dgst.to_string()).into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Start a blob write. With mount options this may short-circuit: a
    /// successful mount reports [`Error::BlobMounted`] instead of returning
    /// a writer.
    pub async fn create(&self, opts: CreateOptions) -> StorageResult<BlobWriter> {
        if let Some(mount) = opts.mount {
            match self.mount(&mount.from, &mount.digest).await {
                Ok(descriptor) => {
                    return Err(Error::BlobMounted {
                        from: mount.from.to_string(),
                        descriptor,
                    }
                    .into());
                }
                Err(err) => {
                    tracing::warn!(
                        from = %mount.from,
                        digest = %mount.digest,
                        error = %err,
                        "cross-repository mount failed, falling back to upload"
                    );
                }
            }
        }

        let id = Uuid::new_v4().to_string();
        let started_at = OffsetDateTime::now_utc();
        let started_at_text = started_at
            .format(&Rfc3339)
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        self.metadata
            .put(
                &Key::UploadStartedAt(id.clone()).to_string(),
                Value::Text(started_at_text),
            )
            .await?;

        let path = paths::upload_data_path(&self.repo, &id);
        self.metadata
            .put(
                &Key::UploadPath(id.clone()).to_string(),
                Value::Text(path.clone()),
            )
            .await?;

        self.new_writer(id, path, started_at, false).await
    }

    /// Resume an open upload by id.
    pub async fn resume(&self, id: &str) -> StorageResult<BlobWriter> {
        let started_at = match self
            .metadata
            .get(&Key::UploadStartedAt(id.to_string()).to_string())
            .await?
        {
            None => return Err(Error::BlobUploadUnknown.into()),
            Some(Value::Text(text)) => OffsetDateTime::parse(&text, &Rfc3339)
                .map_err(|e| Error::BlobUploadInvalid(format!("bad start time: {e}")))?,
            Some(_) => {
                return Err(Error::BlobUploadInvalid("malformed start time".to_string()).into());
            }
        };

        let path = match self
            .metadata
            .get(&Key::UploadPath(id.to_string()).to_string())
            .await?
        {
            Some(Value::Text(path)) => path,
            _ => {
                return Err(Error::BlobUploadInvalid("missing upload path".to_string()).into());
            }
        };

        self.new_writer(id.to_string(), path, started_at, true).await
    }

    async fn new_writer(
        &self,
        id: String,
        path: String,
        started_at: OffsetDateTime,
        append: bool,
    ) -> StorageResult<BlobWriter> {
        let file = self.driver.writer(&path, append).await?;

        let digester = if !append {
            Some(Digester::new())
        } else if self.options.resumable_digest_enabled {
            // Restore the accumulator over the bytes already uploaded.
            let mut digester = Digester::new();
            if file.size() > 0 {
                let mut stream = self.driver.reader(&path, 0).await?;
                while let Some(chunk) = stream.next().await {
                    digester.update(&chunk?);
                }
            }
            Some(digester)
        } else {
            // Disabled: the full stream is rehashed at commit.
            None
        };

        Ok(BlobWriter {
            id,
            repo: self.repo.clone(),
            path,
            started_at,
            driver: self.driver.clone(),
            metadata: self.metadata.clone(),
            statter: self.statter.clone(),
            file,
            digester,
        })
    }

    async fn mount(&self, from: &RepositoryName, dgst: &Digest) -> StorageResult<Descriptor> {
        // Resolve the blob in the source repository through its own
        // metadata-gated statter.
        let source_metadata = self.metadata_base.clone().repository_scoped(from);
        let source_statter = MetadataBlobStatter::new(
            source_metadata,
            Arc::new(DriverStatter::new(self.driver.clone())),
        );
        let stat = source_statter.stat(dgst).await?;

        let descriptor = Descriptor::new(MEDIA_TYPE_OCTET_STREAM, stat.size, dgst.clone());
        self.statter.set_descriptor(dgst, descriptor.clone()).await?;
        Ok(descriptor)
    }
}

/// An open blob upload: `Open -> Appending* -> Committed | Cancelled`.
///
/// Bytes stream into the driver at the upload path while a sha256
/// accumulator tracks the digest of the full stream. `commit` and `cancel`
/// consume the writer, so a finished upload cannot be written again.
pub struct BlobWriter {
    id: String,
    repo: RepositoryName,
    path: String,
    started_at: OffsetDateTime,
    driver: Arc<dyn StorageDriver>,
    metadata: Arc<dyn MetadataService>,
    statter: Arc<MetadataBlobStatter>,
    file: Box<dyn FileWriter>,
    digester: Option<Digester>,
}

impl std::fmt::Debug for BlobWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobWriter")
            .field("id", &self.id)
            .field("repo", &self.repo)
            .field("path", &self.path)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

impl BlobWriter {
    /// The upload id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the upload was created.
    pub fn started_at(&self) -> OffsetDateTime {
        self.started_at
    }

    /// Bytes written so far, including resumed content.
    pub fn size(&self) -> u64 {
        self.file.size()
    }

    /// Append a chunk.
    pub async fn write(&mut self, data: Bytes) -> StorageResult<usize> {
        if let Some(digester) = self.digester.as_mut() {
            digester.update(&data);
        }
        let n = data.len();
        self.file.write(data).await?;
        Ok(n)
    }

    /// Persist written content without finishing the upload, so a later
    /// request can resume it.
    pub async fn close(mut self) -> StorageResult<()> {
        self.file.commit().await
    }

    /// Finish the upload: verify the digest, move the content into its
    /// content-addressed location, clean up the upload keys, and record the
    /// descriptor.
    pub async fn commit(mut self, expected: Option<&Digest>) -> StorageResult<Descriptor> {
        self.file.commit().await?;
        let size = self.file.size();

        let dgst = match self.digester.take() {
            Some(digester) => digester.finalize(),
            // Resumable digests disabled: rehash the stored stream.
            None => {
                let mut digester = Digester::new();
                let mut stream = self.driver.reader(&self.path, 0).await?;
                while let Some(chunk) = stream.next().await {
                    digester.update(&chunk?);
                }
                digester.finalize()
            }
        };

        if let Some(expected) = expected {
            if expected != &dgst {
                return Err(Error::DigestMismatch {
                    expected: expected.to_string(),
                    actual: dgst.to_string(),
                }
                .into());
            }
        }

        let descriptor = Descriptor::new(MEDIA_TYPE_OCTET_STREAM, size, dgst.clone());

        self.driver
            .rename(&self.path, &paths::blob_data_path(&dgst))
            .await?;
        self.driver
            .put_content(
                &paths::layer_link_path(&self.repo, &dgst),
                Bytes::from(dgst.to_string()),
            )
            .await?;

        self.remove_upload_state().await?;
        self.statter.set_descriptor(&dgst, descriptor.clone()).await?;

        tracing::debug!(upload = %self.id, digest = %dgst, size, "blob upload committed");
        Ok(descriptor)
    }

    /// Abandon the upload, removing its content and metadata keys.
    pub async fn cancel(mut self) -> StorageResult<()> {
        self.file.cancel().await?;
        match self.driver.delete(&paths::upload_root(&self.repo, &self.id)).await {
            Ok(()) | Err(StorageError::PathNotFound(_)) => {}
            Err(err) => {
                // Content cleanup is best-effort; the keys must still go.
                tracing::warn!(upload = %self.id, error = %err, "upload content cleanup failed");
            }
        }
        self.remove_upload_state().await?;
        tracing::debug!(upload = %self.id, "blob upload cancelled");
        Ok(())
    }

    /// Delete the upload's `startedat` and `path` keys in one transaction.
    async fn remove_upload_state(&self) -> StorageResult<()> {
        let started_key = Key::UploadStartedAt(self.id.clone());
        let path_key = Key::UploadPath(self.id.clone());
        update_repository::<_, MetadataError, _, _>(self.metadata.clone(), |tx| {
            let started_key = &started_key;
            let path_key = &path_key;
            async move {
                tx.update(started_key, None).await?;
                tx.update(path_key, None).await
            }
        })
        .await?;
        Ok(())
    }
}
