//! Local filesystem store rooted at a directory.

use super::{AssetStore, ByteReader, ByteStream, EntryKind, StoreEntry, StoreError, StoreResult};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::{
    fs::Metadata,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, rel: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in rel.split('/').filter(|p| !p.is_empty()) {
            path.push(part);
        }
        path
    }

    /// Hidden sibling used to build a file before it becomes visible.
    fn temp_sibling(path: &Path) -> StoreResult<(PathBuf, PathBuf)> {
        let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StoreError::Io(io::Error::new(
                ErrorKind::Other,
                "store path missing parent directory",
            ))
        })?;
        let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        Ok((parent, tmp))
    }
}

fn not_found(rel: &str, err: io::Error) -> StoreError {
    if err.kind() == ErrorKind::NotFound {
        StoreError::NotFound(rel.to_string())
    } else {
        StoreError::Io(err)
    }
}

fn entry_from(name: String, meta: &Metadata) -> StoreEntry {
    let modified = meta
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    StoreEntry {
        name,
        kind: if meta.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        },
        size: if meta.is_dir() { 0 } else { meta.len() },
        modified,
    }
}

#[async_trait]
impl AssetStore for LocalStore {
    async fn list(&self, dir: &str) -> StoreResult<Vec<StoreEntry>> {
        let path = self.resolve(dir);
        let meta = fs::metadata(&path).await.map_err(|e| not_found(dir, e))?;
        if !meta.is_dir() {
            return Err(StoreError::NotADirectory(dir.to_string()));
        }

        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&path).await?;
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.metadata().await {
                Ok(meta) => entries.push(entry_from(name, &meta)),
                // Entry vanished between read_dir and metadata.
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(StoreError::Io(err)),
            }
        }
        Ok(entries)
    }

    async fn stat(&self, path: &str) -> StoreResult<Option<StoreEntry>> {
        let full = self.resolve(path);
        match fs::metadata(&full).await {
            Ok(meta) => {
                let name = path.rsplit('/').next().unwrap_or(path).to_string();
                Ok(Some(entry_from(name, &meta)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn read(&self, path: &str) -> StoreResult<Bytes> {
        let data = fs::read(self.resolve(path))
            .await
            .map_err(|e| not_found(path, e))?;
        Ok(Bytes::from(data))
    }

    async fn open(&self, path: &str) -> StoreResult<ByteReader> {
        let file = File::open(self.resolve(path))
            .await
            .map_err(|e| not_found(path, e))?;
        Ok(Box::new(file))
    }

    async fn write(&self, path: &str, data: Bytes) -> StoreResult<()> {
        let full = self.resolve(path);
        let (parent, tmp) = Self::temp_sibling(&full)?;
        fs::create_dir_all(&parent).await?;

        if let Err(err) = fs::write(&tmp, &data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = fs::rename(&tmp, &full).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(err));
        }
        Ok(())
    }

    async fn write_new(&self, path: &str, mut stream: ByteStream<'_>) -> StoreResult<u64> {
        let full = self.resolve(path);
        let (parent, tmp) = Self::temp_sibling(&full)?;
        fs::create_dir_all(&parent).await?;
        let mut file = File::create(&tmp).await?;

        let mut size: u64 = 0;
        while let Some(piece) = stream.next().await {
            let piece = match piece {
                Ok(piece) => piece,
                Err(err) => {
                    let _ = fs::remove_file(&tmp).await;
                    return Err(err);
                }
            };
            size += piece.len() as u64;
            if let Err(err) = file.write_all(&piece).await {
                let _ = fs::remove_file(&tmp).await;
                return Err(StoreError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StoreError::Io(err));
        }
        drop(file);

        // hard_link refuses to replace an existing entry, which gives the
        // no-clobber commit; the temp name is dropped either way.
        let linked = fs::hard_link(&tmp, &full).await;
        if let Err(err) = fs::remove_file(&tmp).await {
            debug!("failed to remove temp file {}: {}", tmp.display(), err);
        }
        match linked {
            Ok(()) => Ok(size),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                Err(StoreError::AlreadyExists(path.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn create_dir(&self, dir: &str) -> StoreResult<()> {
        let full = self.resolve(dir);
        match fs::create_dir_all(&full).await {
            Ok(()) => Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::AlreadyExists | ErrorKind::NotADirectory
                ) =>
            {
                Err(StoreError::NotADirectory(dir.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }

    async fn remove_file(&self, path: &str) -> StoreResult<()> {
        fs::remove_file(self.resolve(path))
            .await
            .map_err(|e| not_found(path, e))
    }

    async fn remove_dir(&self, dir: &str) -> StoreResult<()> {
        match fs::remove_dir(self.resolve(dir)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(StoreError::NotFound(dir.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => {
                Err(StoreError::NotEmpty(dir.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotADirectory => {
                Err(StoreError::NotADirectory(dir.to_string()))
            }
            Err(err) => Err(StoreError::Io(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use tokio::io::AsyncReadExt;

    fn pieces(parts: &[&'static [u8]]) -> ByteStream<'static> {
        let items: Vec<StoreResult<Bytes>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p))).collect();
        stream::iter(items).boxed()
    }

    #[tokio::test]
    async fn write_new_concatenates_and_refuses_to_clobber() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let size = store
            .write_new("docs/a.txt", pieces(&[b"hello ", b"world"]))
            .await
            .unwrap();
        assert_eq!(size, 11);
        assert_eq!(store.read("docs/a.txt").await.unwrap(), "hello world");

        let err = store
            .write_new("docs/a.txt", pieces(&[b"other"]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
        assert_eq!(store.read("docs/a.txt").await.unwrap(), "hello world");

        let names: Vec<String> = store
            .list("docs")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["a.txt".to_string()]);
    }

    #[tokio::test]
    async fn failed_stream_leaves_nothing_visible() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        let items: Vec<StoreResult<Bytes>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(StoreError::NotFound("chunk".into())),
        ];
        let err = store
            .write_new("b.bin", stream::iter(items).boxed())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_overwrites_and_open_streams() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store.write("x/y/c.bin", Bytes::from_static(b"one")).await.unwrap();
        store.write("x/y/c.bin", Bytes::from_static(b"two")).await.unwrap();

        let mut reader = store.open("x/y/c.bin").await.unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"two");

        let entry = store.stat("x/y/c.bin").await.unwrap().unwrap();
        assert!(entry.is_file());
        assert_eq!(entry.size, 3);
        assert!(store.stat("x/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remove_dir_reports_not_empty_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path());

        store.create_dir("a/b").await.unwrap();
        store.write("a/b/f", Bytes::from_static(b"1")).await.unwrap();

        assert!(matches!(
            store.remove_dir("a/b").await,
            Err(StoreError::NotEmpty(_))
        ));
        store.remove_file("a/b/f").await.unwrap();
        store.remove_dir("a/b").await.unwrap();
        assert!(matches!(
            store.remove_dir("a/b").await,
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            store.remove_file("a/nope").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
