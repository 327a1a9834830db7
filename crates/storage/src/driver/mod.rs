//! Storage driver capability traits.

pub mod filesystem;
pub mod memory;

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use time::OffsetDateTime;

/// A boxed stream of bytes for streaming reads.
pub type ByteStream = Pin<Box<dyn Stream<Item = StorageResult<Bytes>> + Send>>;

/// Metadata about a stored path.
#[derive(Clone, Debug)]
pub struct FileInfo {
    /// The full driver path.
    pub path: String,

    /// Content size in bytes; zero for directories.
    pub size: u64,

    /// Whether the path is a directory.
    pub is_dir: bool,

    /// Last modification time, if the driver tracks one.
    pub modified: Option<OffsetDateTime>,
}

/// Per-entry verdict returned by walk callbacks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkDecision {
    /// Keep walking.
    Continue,

    /// Do not descend into this directory.
    SkipDir,

    /// Terminate the walk.
    Stop,
}

/// Callback invoked for every entry visited by [`StorageDriver::walk`], in
/// lexicographic depth-first order.
pub type WalkFn<'a> = dyn FnMut(&FileInfo) -> WalkDecision + Send + 'a;

/// The capability the registry core requires from any storage backend:
/// read/write/list/delete of byte content under hierarchical paths.
///
/// Drivers must tolerate concurrent reads and writes to different paths;
/// concurrent writes to the same upload path are prevented by the upload
/// protocol (one writer per upload id), not by the driver.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    /// A static identifier for the driver, used in logs.
    fn name(&self) -> &'static str;

    /// Read the full content at a path.
    async fn get_content(&self, path: &str) -> StorageResult<Bytes>;

    /// Atomically replace the content at a path.
    async fn put_content(&self, path: &str, content: Bytes) -> StorageResult<()>;

    /// Stream the content at a path, starting at `offset`.
    async fn reader(&self, path: &str, offset: u64) -> StorageResult<ByteStream>;

    /// Open a writer at a path, optionally appending to existing content.
    async fn writer(&self, path: &str, append: bool) -> StorageResult<Box<dyn FileWriter>>;

    /// Stat a path.
    async fn stat(&self, path: &str) -> StorageResult<FileInfo>;

    /// List the immediate children of a directory path.
    async fn list(&self, path: &str) -> StorageResult<Vec<String>>;

    /// Move content from one path to another.
    async fn rename(&self, from: &str, to: &str) -> StorageResult<()>;

    /// Delete a path recursively.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// A direct URL serving the content at a path, for drivers that can
    /// delegate reads (signed CDN or bucket URLs).
    async fn url_for(&self, path: &str) -> StorageResult<String> {
        let _ = path;
        Err(crate::error::StorageError::Unsupported)
    }

    /// Walk the tree rooted at a path in lexicographic depth-first order.
    /// The callback may prune directories or terminate the walk early.
    async fn walk(&self, path: &str, f: &mut WalkFn<'_>) -> StorageResult<()>;
}

/// An open file writer bound to one driver path.
#[async_trait]
pub trait FileWriter: Send + Sync {
    /// Append a chunk.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Bytes written so far, including pre-existing content when opened in
    /// append mode.
    fn size(&self) -> u64;

    /// Flush and persist the written content.
    async fn commit(&mut self) -> StorageResult<()>;

    /// Abandon the write and remove any partial content.
    async fn cancel(&mut self) -> StorageResult<()>;
}
