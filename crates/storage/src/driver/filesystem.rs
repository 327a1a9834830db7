//! Local filesystem storage driver.

use crate::driver::{ByteStream, FileInfo, FileWriter, StorageDriver, WalkDecision, WalkFn};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::instrument;
use uuid::Uuid;

/// Chunk size for streaming reads (64 KiB).
const STREAM_CHUNK_SIZE: usize = 64 * 1024;

/// Filesystem driver rooted at a local directory.
pub struct FilesystemDriver {
    root: PathBuf,
}

impl FilesystemDriver {
    /// Create a new filesystem driver, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Map a driver path to a location under the root, with path traversal
    /// protection.
    ///
    /// Async wrapper around `full_path_sync` using `spawn_blocking`, since
    /// `canonicalize` and `symlink_metadata` hit the filesystem.
    async fn full_path(&self, path: &str) -> StorageResult<PathBuf> {
        let root = self.root.clone();
        let path = path.to_string();
        tokio::task::spawn_blocking(move || Self::full_path_sync(&root, &path))
            .await
            .map_err(|e| {
                StorageError::Io(std::io::Error::other(format!("spawn_blocking failed: {e}")))
            })?
    }

    /// Synchronous path mapping with traversal protection.
    ///
    /// Rejects traversal components, then verifies that the resolved path
    /// (or, for paths that do not exist yet, its nearest existing ancestor)
    /// does not escape the canonicalized root through a symlink.
    fn full_path_sync(root: &Path, path: &str) -> StorageResult<PathBuf> {
        let trimmed = path.trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        for component in Path::new(trimmed).components() {
            match component {
                std::path::Component::Normal(_) => {}
                _ => return Err(StorageError::InvalidPath(path.to_string())),
            }
        }

        let full = root.join(trimmed);

        let root_canonical = root.canonicalize().map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize root: {e}"),
            ))
        })?;

        // For existing paths (or symlinks, even if broken), canonicalize and
        // verify they stay inside the root. This catches a symlink inside
        // the storage root pointing at a location outside of it.
        match std::fs::symlink_metadata(&full) {
            Ok(meta) => {
                let canonical = full.canonicalize().map_err(|e| {
                    if meta.file_type().is_symlink() {
                        StorageError::InvalidPath(format!(
                            "symlink target missing or invalid: {path}"
                        ))
                    } else {
                        StorageError::Io(std::io::Error::new(
                            e.kind(),
                            format!("failed to canonicalize path: {e}"),
                        ))
                    }
                })?;
                if !canonical.starts_with(&root_canonical) {
                    return Err(StorageError::InvalidPath(format!(
                        "resolved path escapes storage root: {path}"
                    )));
                }
                // Return the original path (not canonical) to keep listings
                // consistent with the root.
                return Ok(full);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(StorageError::Io(std::io::Error::new(
                    err.kind(),
                    format!("failed to stat path: {err}"),
                )));
            }
        }

        // For new paths, find the nearest existing ancestor and verify it
        // resolves inside the root. Without this, a symlinked directory
        // would let writes escape through components that do not exist yet.
        let mut ancestor = full.as_path();
        while let Some(parent) = ancestor.parent() {
            match std::fs::symlink_metadata(parent) {
                Ok(meta) => {
                    let parent_canonical = parent.canonicalize().map_err(|e| {
                        if meta.file_type().is_symlink() {
                            StorageError::InvalidPath(format!(
                                "ancestor symlink target missing or invalid: {path}"
                            ))
                        } else {
                            StorageError::Io(std::io::Error::new(
                                e.kind(),
                                format!("failed to canonicalize ancestor: {e}"),
                            ))
                        }
                    })?;
                    if !parent_canonical.starts_with(&root_canonical) {
                        return Err(StorageError::InvalidPath(format!(
                            "ancestor path escapes storage root: {path}"
                        )));
                    }
                    break;
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(StorageError::Io(std::io::Error::new(
                        err.kind(),
                        format!("failed to stat ancestor: {err}"),
                    )));
                }
            }
            ancestor = parent;
        }

        Ok(full)
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn not_found(path: &str, err: std::io::Error) -> StorageError {
        if err.kind() == std::io::ErrorKind::NotFound {
            StorageError::PathNotFound(path.to_string())
        } else {
            StorageError::Io(err)
        }
    }

    fn walk_dir<'a>(
        &'a self,
        dir: PathBuf,
        virtual_dir: String,
        f: &'a mut WalkFn<'_>,
    ) -> Pin<Box<dyn Future<Output = StorageResult<bool>> + Send + 'a>> {
        Box::pin(async move {
            let mut entries = Vec::new();
            let mut read_dir = fs::read_dir(&dir)
                .await
                .map_err(|e| Self::not_found(&virtual_dir, e))?;
            while let Some(entry) = read_dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let metadata = entry.metadata().await?;
                entries.push((name, metadata));
            }
            entries.sort_by(|a, b| a.0.cmp(&b.0));

            for (name, metadata) in entries {
                let virtual_path = format!("{virtual_dir}/{name}");
                let info = FileInfo {
                    path: virtual_path.clone(),
                    size: if metadata.is_dir() { 0 } else { metadata.len() },
                    is_dir: metadata.is_dir(),
                    modified: metadata.modified().ok().map(Into::into),
                };
                match f(&info) {
                    WalkDecision::Stop => return Ok(false),
                    WalkDecision::SkipDir => continue,
                    WalkDecision::Continue => {
                        if metadata.is_dir()
                            && !self.walk_dir(dir.join(&name), virtual_path, f).await?
                        {
                            return Ok(false);
                        }
                    }
                }
            }
            Ok(true)
        })
    }
}

#[async_trait]
impl StorageDriver for FilesystemDriver {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    #[instrument(skip(self), fields(driver = "filesystem"))]
    async fn get_content(&self, path: &str) -> StorageResult<Bytes> {
        let full = self.full_path(path).await?;
        let data = fs::read(&full).await.map_err(|e| Self::not_found(path, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, content), fields(driver = "filesystem", size = content.len()))]
    async fn put_content(&self, path: &str, content: Bytes) -> StorageResult<()> {
        let full = self.full_path(path).await?;
        Self::ensure_parent(&full).await?;

        // Write to a uniquely named temp file, sync, then rename into place.
        let temp = full.with_file_name(format!(".tmp.{}", Uuid::new_v4()));
        {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(&content).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp, &full).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(driver = "filesystem"))]
    async fn reader(&self, path: &str, offset: u64) -> StorageResult<ByteStream> {
        use tokio::io::AsyncReadExt;

        let full = self.full_path(path).await?;
        let mut file = fs::File::open(&full)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        let len = file.metadata().await?.len();
        if offset > len {
            return Err(StorageError::InvalidOffset {
                path: path.to_string(),
                offset,
            });
        }
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let stream = async_stream::try_stream! {
            let mut file = file;
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            loop {
                let n = file.read(&mut buf).await?;
                if n == 0 {
                    break;
                }
                yield Bytes::copy_from_slice(&buf[..n]);
            }
        };
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self), fields(driver = "filesystem"))]
    async fn writer(&self, path: &str, append: bool) -> StorageResult<Box<dyn FileWriter>> {
        let full = self.full_path(path).await?;
        Self::ensure_parent(&full).await?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true);
        if !append {
            options.truncate(true);
        }
        let mut file = options.open(&full).await?;

        let size = if append {
            file.seek(std::io::SeekFrom::End(0)).await?
        } else {
            0
        };

        Ok(Box::new(FilesystemFileWriter {
            file: Some(file),
            path: full,
            size,
            closed: None,
        }))
    }

    #[instrument(skip(self), fields(driver = "filesystem"))]
    async fn stat(&self, path: &str) -> StorageResult<FileInfo> {
        let full = self.full_path(path).await?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        Ok(FileInfo {
            path: path.to_string(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            is_dir: metadata.is_dir(),
            modified: metadata.modified().ok().map(Into::into),
        })
    }

    #[instrument(skip(self), fields(driver = "filesystem"))]
    async fn list(&self, path: &str) -> StorageResult<Vec<String>> {
        let full = self.full_path(path).await?;
        let mut read_dir = fs::read_dir(&full)
            .await
            .map_err(|e| Self::not_found(path, e))?;

        let base = path.trim_end_matches('/');
        let mut children = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            children.push(format!("{base}/{}", entry.file_name().to_string_lossy()));
        }
        children.sort();
        Ok(children)
    }

    #[instrument(skip(self), fields(driver = "filesystem"))]
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let from_full = self.full_path(from).await?;
        let to_full = self.full_path(to).await?;
        Self::ensure_parent(&to_full).await?;
        fs::rename(&from_full, &to_full)
            .await
            .map_err(|e| Self::not_found(from, e))
    }

    #[instrument(skip(self), fields(driver = "filesystem"))]
    async fn delete(&self, path: &str) -> StorageResult<()> {
        let full = self.full_path(path).await?;
        let metadata = fs::metadata(&full)
            .await
            .map_err(|e| Self::not_found(path, e))?;
        if metadata.is_dir() {
            fs::remove_dir_all(&full).await?;
        } else {
            fs::remove_file(&full).await?;
        }
        Ok(())
    }

    async fn walk(&self, path: &str, f: &mut WalkFn<'_>) -> StorageResult<()> {
        let full = self.full_path(path).await?;
        let virtual_dir = path.trim_end_matches('/').to_string();
        self.walk_dir(full, virtual_dir, f).await?;
        Ok(())
    }
}

struct FilesystemFileWriter {
    file: Option<fs::File>,
    path: PathBuf,
    size: u64,
    closed: Option<&'static str>,
}

#[async_trait]
impl FileWriter for FilesystemFileWriter {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        if let Some(state) = self.closed {
            return Err(StorageError::WriterClosed(state));
        }
        let file = self
            .file
            .as_mut()
            .ok_or(StorageError::WriterClosed("closed"))?;
        file.write_all(&data).await?;
        self.size += data.len() as u64;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }

    async fn commit(&mut self) -> StorageResult<()> {
        if let Some(state) = self.closed {
            return Err(StorageError::WriterClosed(state));
        }
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        self.closed = Some("committed");
        Ok(())
    }

    async fn cancel(&mut self) -> StorageResult<()> {
        if self.closed == Some("committed") {
            return Err(StorageError::WriterClosed("committed"));
        }
        self.file.take();
        if let Err(err) = fs::remove_file(&self.path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                return Err(StorageError::Io(err));
            }
        }
        self.closed = Some("cancelled");
        Ok(())
    }
}
