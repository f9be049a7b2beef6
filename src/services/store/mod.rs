//! Storage abstraction over the asset tree and the chunk staging area.
//!
//! Paths are relative, `/`-separated and already normalized by the caller
//! (see `path_guard`). The empty path is the store root.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;
use tokio::io::AsyncRead;

pub mod local;
#[cfg(test)]
pub mod memory;

pub use local::LocalStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("`{0}` already exists")]
    AlreadyExists(String),
    #[error("directory `{0}` is not empty")]
    NotEmpty(String),
    #[error("`{0}` is not a directory")]
    NotADirectory(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Stream of payload pieces fed into [`AssetStore::write_new`].
pub type ByteStream<'a> = BoxStream<'a, StoreResult<Bytes>>;

/// Reader returned by [`AssetStore::open`].
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One directory entry or stat result.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl StoreEntry {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Entries directly under `dir`.
    async fn list(&self, dir: &str) -> StoreResult<Vec<StoreEntry>>;

    /// Entry at `path`, or `None` when nothing exists there.
    async fn stat(&self, path: &str) -> StoreResult<Option<StoreEntry>>;

    /// Whole payload of the file at `path`.
    async fn read(&self, path: &str) -> StoreResult<Bytes>;

    /// Streaming reader over the file at `path`.
    async fn open(&self, path: &str) -> StoreResult<ByteReader>;

    /// Replace the file at `path` with `data`. Readers observe either the old
    /// or the new content, never a partial write. Parents are created.
    async fn write(&self, path: &str, data: Bytes) -> StoreResult<()>;

    /// Write `stream` to a new file at `path` and return its size.
    ///
    /// The file only becomes visible once every piece has been written. Fails
    /// with [`StoreError::AlreadyExists`] instead of replacing an existing
    /// entry; nothing is left behind on failure.
    async fn write_new(&self, path: &str, stream: ByteStream<'_>) -> StoreResult<u64>;

    /// Create `dir` and any missing parents.
    async fn create_dir(&self, dir: &str) -> StoreResult<()>;

    async fn remove_file(&self, path: &str) -> StoreResult<()>;

    /// Remove an empty directory.
    async fn remove_dir(&self, dir: &str) -> StoreResult<()>;
}
