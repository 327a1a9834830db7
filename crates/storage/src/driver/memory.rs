//! In-memory storage driver for tests and development.

use crate::driver::{ByteStream, FileInfo, FileWriter, StorageDriver, WalkDecision, WalkFn};
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// In-memory driver keeping file content in an ordered map, so listing and
/// walking come out in lexicographic order for free.
pub struct InMemoryDriver {
    files: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl InMemoryDriver {
    /// Create an empty in-memory driver.
    pub fn new() -> Self {
        Self {
            files: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    fn normalize(path: &str) -> String {
        format!("/{}", path.trim_matches('/'))
    }

    /// Immediate children (files and directories) of a directory path.
    fn children(files: &BTreeMap<String, Bytes>, dir: &str) -> Vec<(String, bool, u64)> {
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{dir}/")
        };
        let mut children: Vec<(String, bool, u64)> = Vec::new();
        for (key, content) in files.range(prefix.clone()..) {
            let Some(rest) = key.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((name, _)) => {
                    let child = format!("{prefix}{name}");
                    if children.last().map(|(p, _, _)| p.as_str()) != Some(child.as_str()) {
                        children.push((child, true, 0));
                    }
                }
                None => children.push((key.clone(), false, content.len() as u64)),
            }
        }
        children
    }

    fn walk_node(
        files: &BTreeMap<String, Bytes>,
        dir: &str,
        f: &mut WalkFn<'_>,
    ) -> StorageResult<bool> {
        for (path, is_dir, size) in Self::children(files, dir) {
            let info = FileInfo {
                path: path.clone(),
                size,
                is_dir,
                modified: None,
            };
            match f(&info) {
                WalkDecision::Stop => return Ok(false),
                WalkDecision::SkipDir => continue,
                WalkDecision::Continue => {
                    if is_dir && !Self::walk_node(files, &path, f)? {
                        return Ok(false);
                    }
                }
            }
        }
        Ok(true)
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageDriver for InMemoryDriver {
    fn name(&self) -> &'static str {
        "inmemory"
    }

    async fn get_content(&self, path: &str) -> StorageResult<Bytes> {
        let path = Self::normalize(path);
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files
            .get(&path)
            .cloned()
            .ok_or(StorageError::PathNotFound(path))
    }

    async fn put_content(&self, path: &str, content: Bytes) -> StorageResult<()> {
        let path = Self::normalize(path);
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(path, content);
        Ok(())
    }

    async fn reader(&self, path: &str, offset: u64) -> StorageResult<ByteStream> {
        let content = self.get_content(path).await?;
        if offset > content.len() as u64 {
            return Err(StorageError::InvalidOffset {
                path: Self::normalize(path),
                offset,
            });
        }
        let remainder = content.slice(offset as usize..);
        Ok(Box::pin(futures::stream::once(async move { Ok(remainder) })))
    }

    async fn writer(&self, path: &str, append: bool) -> StorageResult<Box<dyn FileWriter>> {
        let path = Self::normalize(path);
        let buf = if append {
            let files = self.files.read().unwrap_or_else(|e| e.into_inner());
            files.get(&path).map(|b| b.to_vec()).unwrap_or_default()
        } else {
            Vec::new()
        };
        // Register the path immediately so a created-but-unwritten upload is
        // visible to stat and resume.
        if !append {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            files.insert(path.clone(), Bytes::new());
        }
        Ok(Box::new(InMemoryFileWriter {
            files: self.files.clone(),
            path,
            buf,
            closed: None,
        }))
    }

    async fn stat(&self, path: &str) -> StorageResult<FileInfo> {
        let path = Self::normalize(path);
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        if let Some(content) = files.get(&path) {
            return Ok(FileInfo {
                path,
                size: content.len() as u64,
                is_dir: false,
                modified: None,
            });
        }
        let prefix = format!("{path}/");
        if files.range(prefix.clone()..).next().is_some_and(|(k, _)| k.starts_with(&prefix)) {
            return Ok(FileInfo {
                path,
                size: 0,
                is_dir: true,
                modified: None,
            });
        }
        Err(StorageError::PathNotFound(path))
    }

    async fn list(&self, path: &str) -> StorageResult<Vec<String>> {
        let path = Self::normalize(path);
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let children = Self::children(&files, &path);
        if children.is_empty() {
            return Err(StorageError::PathNotFound(path));
        }
        Ok(children.into_iter().map(|(p, _, _)| p).collect())
    }

    async fn rename(&self, from: &str, to: &str) -> StorageResult<()> {
        let from = Self::normalize(from);
        let to = Self::normalize(to);
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        match files.remove(&from) {
            Some(content) => {
                files.insert(to, content);
                Ok(())
            }
            None => Err(StorageError::PathNotFound(from)),
        }
    }

    async fn delete(&self, path: &str) -> StorageResult<()> {
        let path = Self::normalize(path);
        let prefix = format!("{path}/");
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        // Keys under `prefix` are contiguous from `prefix`; the exact path
        // itself is not (siblings like `a.b` sort between `a` and `a/`).
        let mut keys: Vec<String> = files
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| k.clone())
            .collect();
        if files.contains_key(&path) {
            keys.push(path.clone());
        }
        if keys.is_empty() {
            return Err(StorageError::PathNotFound(path));
        }
        for key in keys {
            files.remove(&key);
        }
        Ok(())
    }

    async fn walk(&self, path: &str, f: &mut WalkFn<'_>) -> StorageResult<()> {
        let path = Self::normalize(path);
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        Self::walk_node(&files, &path, f)?;
        Ok(())
    }
}

struct InMemoryFileWriter {
    files: Arc<RwLock<BTreeMap<String, Bytes>>>,
    path: String,
    buf: Vec<u8>,
    closed: Option<&'static str>,
}

#[async_trait]
impl FileWriter for InMemoryFileWriter {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        if let Some(state) = self.closed {
            return Err(StorageError::WriterClosed(state));
        }
        self.buf.extend_from_slice(&data);
        Ok(())
    }

    fn size(&self) -> u64 {
        self.buf.len() as u64
    }

    async fn commit(&mut self) -> StorageResult<()> {
        if let Some(state) = self.closed {
            return Err(StorageError::WriterClosed(state));
        }
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(self.path.clone(), Bytes::from(std::mem::take(&mut self.buf)));
        self.closed = Some("committed");
        Ok(())
    }

    async fn cancel(&mut self) -> StorageResult<()> {
        if self.closed == Some("committed") {
            return Err(StorageError::WriterClosed("committed"));
        }
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.remove(&self.path);
        self.closed = Some("cancelled");
        Ok(())
    }
}
