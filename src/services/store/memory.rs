//! In-memory store used by tests in place of the filesystem.

use super::{AssetStore, ByteReader, ByteStream, EntryKind, StoreEntry, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{
    collections::BTreeMap,
    io::Cursor,
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File { data: Bytes, modified: DateTime<Utc> },
}

/// Flat map of normalized paths to nodes. The root (`""`) always exists.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
}

fn parent_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("")
}

fn name_of(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, name)| name).unwrap_or(path)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a file with an explicit modification time.
    pub fn insert_file(&self, path: &str, data: &[u8], modified: DateTime<Utc>) {
        let mut nodes = self.nodes.lock().unwrap();
        Self::ensure_parents(&mut nodes, path);
        nodes.insert(
            path.to_string(),
            Node::File {
                data: Bytes::copy_from_slice(data),
                modified,
            },
        );
    }

    /// Every file path currently stored, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        let nodes = self.nodes.lock().unwrap();
        nodes
            .iter()
            .filter(|(_, node)| matches!(node, Node::File { .. }))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn ensure_parents(nodes: &mut BTreeMap<String, Node>, path: &str) {
        let mut parent = parent_of(path);
        while !parent.is_empty() {
            nodes.entry(parent.to_string()).or_insert(Node::Dir);
            parent = parent_of(parent);
        }
    }

    fn entry(path: &str, node: &Node) -> StoreEntry {
        match node {
            Node::Dir => StoreEntry {
                name: name_of(path).to_string(),
                kind: EntryKind::Dir,
                size: 0,
                modified: Utc::now(),
            },
            Node::File { data, modified } => StoreEntry {
                name: name_of(path).to_string(),
                kind: EntryKind::File,
                size: data.len() as u64,
                modified: *modified,
            },
        }
    }

    fn file(&self, path: &str) -> StoreResult<Bytes> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::File { data, .. }) => Ok(data.clone()),
            _ => Err(StoreError::NotFound(path.to_string())),
        }
    }
}

#[async_trait]
impl AssetStore for MemoryStore {
    async fn list(&self, dir: &str) -> StoreResult<Vec<StoreEntry>> {
        let nodes = self.nodes.lock().unwrap();
        match nodes.get(dir) {
            Some(Node::Dir) => {}
            Some(Node::File { .. }) => return Err(StoreError::NotADirectory(dir.to_string())),
            None if dir.is_empty() => {}
            None => return Err(StoreError::NotFound(dir.to_string())),
        }
        Ok(nodes
            .iter()
            .filter(|(path, _)| !path.is_empty() && parent_of(path) == dir)
            .map(|(path, node)| Self::entry(path, node))
            .collect())
    }

    async fn stat(&self, path: &str) -> StoreResult<Option<StoreEntry>> {
        let nodes = self.nodes.lock().unwrap();
        if path.is_empty() {
            return Ok(Some(Self::entry(path, &Node::Dir)));
        }
        Ok(nodes.get(path).map(|node| Self::entry(path, node)))
    }

    async fn read(&self, path: &str) -> StoreResult<Bytes> {
        self.file(path)
    }

    async fn open(&self, path: &str) -> StoreResult<ByteReader> {
        let data = self.file(path)?;
        Ok(Box::new(Cursor::new(data.to_vec())))
    }

    async fn write(&self, path: &str, data: Bytes) -> StoreResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(Node::Dir) = nodes.get(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        Self::ensure_parents(&mut nodes, path);
        nodes.insert(
            path.to_string(),
            Node::File {
                data,
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn write_new(&self, path: &str, mut stream: ByteStream<'_>) -> StoreResult<u64> {
        let mut buf = BytesMut::new();
        while let Some(piece) = stream.next().await {
            buf.extend_from_slice(&piece?);
        }

        let mut nodes = self.nodes.lock().unwrap();
        if nodes.contains_key(path) {
            return Err(StoreError::AlreadyExists(path.to_string()));
        }
        Self::ensure_parents(&mut nodes, path);
        let size = buf.len() as u64;
        nodes.insert(
            path.to_string(),
            Node::File {
                data: buf.freeze(),
                modified: Utc::now(),
            },
        );
        Ok(size)
    }

    async fn create_dir(&self, dir: &str) -> StoreResult<()> {
        if dir.is_empty() {
            return Ok(());
        }
        let mut nodes = self.nodes.lock().unwrap();
        if let Some(Node::File { .. }) = nodes.get(dir) {
            return Err(StoreError::NotADirectory(dir.to_string()));
        }
        Self::ensure_parents(&mut nodes, dir);
        nodes.insert(dir.to_string(), Node::Dir);
        Ok(())
    }

    async fn remove_file(&self, path: &str) -> StoreResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(path) {
            Some(Node::File { .. }) => {
                nodes.remove(path);
                Ok(())
            }
            Some(Node::Dir) => Err(StoreError::Io(std::io::Error::new(
                std::io::ErrorKind::IsADirectory,
                format!("`{}` is a directory", path),
            ))),
            None => Err(StoreError::NotFound(path.to_string())),
        }
    }

    async fn remove_dir(&self, dir: &str) -> StoreResult<()> {
        let mut nodes = self.nodes.lock().unwrap();
        match nodes.get(dir) {
            Some(Node::Dir) => {}
            Some(Node::File { .. }) => return Err(StoreError::NotADirectory(dir.to_string())),
            None => return Err(StoreError::NotFound(dir.to_string())),
        }
        if nodes.keys().any(|path| parent_of(path) == dir && path != dir) {
            return Err(StoreError::NotEmpty(dir.to_string()));
        }
        nodes.remove(dir);
        Ok(())
    }
}
