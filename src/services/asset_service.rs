//! src/services/asset_service.rs
//!
//! AssetService: the asset tree as the editor sees it. Listing, folders,
//! deletion and downloads. The upload pipeline lives in `upload_service.rs`
//! as a second `impl` block on the same type, so handlers share one state.

use crate::{
    models::asset::{AssetFile, AssetListing, Folder},
    services::{
        locks::KeyedLocks,
        name_resolver::canonical_stem,
        path_guard::{PathRejected, SafePath},
        session_registry::SessionRegistry,
        store::{AssetStore, ByteReader, StoreEntry, StoreError},
        thumbnail::{self, Bounds},
    },
};
use std::{collections::HashSet, sync::Arc};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    PathTraversal(#[from] PathRejected),
    #[error("upload `{upload_id}` is missing chunk(s) {missing:?}")]
    IncompleteUpload { upload_id: String, missing: Vec<u32> },
    #[error("upload `{0}` has already been assembled")]
    UploadAlreadyComplete(String),
    #[error("`{0}` not found")]
    NotFound(String),
    #[error("`{0}` is not a file")]
    NotAFile(String),
    #[error("`{0}` is not a folder")]
    NotAFolder(String),
    #[error("folder `{0}` is not empty")]
    FolderNotEmpty(String),
    #[error(transparent)]
    Storage(#[from] StoreError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Size and format limits applied to every upload path.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_upload_bytes: u64,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AssetService {
    /// The asset tree served under `/assets`.
    pub assets: Arc<dyn AssetStore>,

    /// Scratch space for chunks of in-flight uploads.
    pub staging: Arc<dyn AssetStore>,

    pub sessions: SessionRegistry,
    pub(crate) finalize_locks: KeyedLocks,
    pub limits: UploadLimits,
    pub thumbnail_bounds: Bounds,
}

impl AssetService {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        staging: Arc<dyn AssetStore>,
        sessions: SessionRegistry,
        limits: UploadLimits,
        thumbnail_bounds: Bounds,
    ) -> Self {
        Self {
            assets,
            staging,
            sessions,
            finalize_locks: KeyedLocks::new(),
            limits,
            thumbnail_bounds,
        }
    }

    /// Names currently present in `dir`, used for collision checks.
    pub(crate) async fn names_in(&self, dir: &SafePath) -> AssetResult<HashSet<String>> {
        match self.assets.list(dir.as_str()).await {
            Ok(entries) => Ok(entries.into_iter().map(|e| e.name).collect()),
            Err(StoreError::NotFound(_)) => Ok(HashSet::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// List folders and files of `dir`.
    ///
    /// Hidden entries (leading `.`) and thumbnails are left out. Folders are
    /// sorted by name, files newest first.
    pub async fn list(&self, dir: &SafePath) -> AssetResult<AssetListing> {
        let entries = match self.assets.list(dir.as_str()).await {
            Ok(entries) => entries,
            Err(StoreError::NotFound(_)) | Err(StoreError::NotADirectory(_)) => {
                return Err(AssetError::NotFound(dir.to_string()));
            }
            Err(err) => return Err(err.into()),
        };

        let names: HashSet<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        let mut folders = Vec::new();
        let mut files: Vec<(StoreEntry, AssetFile)> = Vec::new();

        for entry in &entries {
            if entry.name.starts_with('.') || thumbnail::is_thumbnail(&entry.name) {
                continue;
            }
            let path = dir.join(&entry.name);
            if entry.is_dir() {
                folders.push(Folder {
                    name: entry.name.clone(),
                    path: path.to_string(),
                });
                continue;
            }

            let thumb_name = thumbnail::thumbnail_name(&entry.name);
            let thumbnail = names
                .contains(thumb_name.as_str())
                .then(|| dir.join(&thumb_name).public_url());
            let mime_type = mime_guess::from_path(&entry.name)
                .first_or_octet_stream()
                .essence_str()
                .to_string();

            files.push((
                entry.clone(),
                AssetFile {
                    name: entry.name.clone(),
                    path: path.public_url(),
                    size: entry.size,
                    modified: entry.modified.timestamp(),
                    mime_type,
                    thumbnail,
                },
            ));
        }

        folders.sort_by(|a, b| a.name.cmp(&b.name));
        files.sort_by(|(a, _), (b, _)| b.modified.cmp(&a.modified).then(a.name.cmp(&b.name)));

        Ok(AssetListing {
            current_path: dir.to_string(),
            folders,
            files: files.into_iter().map(|(_, file)| file).collect(),
        })
    }

    /// Create folder `name` (sanitized like a file stem) inside `parent`.
    pub async fn create_folder(&self, parent: &SafePath, name: &str) -> AssetResult<SafePath> {
        let folder = canonical_stem(name);
        if folder.is_empty() {
            return Err(AssetError::Validation("invalid folder name".into()));
        }

        let path = parent.join(&folder);
        if self.assets.stat(path.as_str()).await?.is_some() {
            return Err(AssetError::Validation(format!(
                "folder `{}` already exists",
                path
            )));
        }

        self.assets.create_dir(path.as_str()).await.map_err(|err| match err {
            StoreError::NotADirectory(p) => AssetError::NotAFolder(p),
            other => other.into(),
        })?;
        info!("created folder {}", path);
        Ok(path)
    }

    /// Delete an empty folder. The root cannot be deleted.
    pub async fn delete_folder(&self, path: &SafePath) -> AssetResult<()> {
        if path.is_root() {
            return Err(AssetError::Validation("the root folder cannot be deleted".into()));
        }
        match self.assets.stat(path.as_str()).await? {
            None => return Err(AssetError::NotFound(path.to_string())),
            Some(entry) if !entry.is_dir() => return Err(AssetError::NotAFolder(path.to_string())),
            Some(_) => {}
        }

        self.assets
            .remove_dir(path.as_str())
            .await
            .map_err(|err| match err {
                StoreError::NotEmpty(p) => AssetError::FolderNotEmpty(p),
                StoreError::NotFound(p) => AssetError::NotFound(p),
                other => other.into(),
            })?;
        info!("deleted folder {}", path);
        Ok(())
    }

    /// Delete a file and its companion thumbnail, if any.
    pub async fn delete_file(&self, path: &SafePath) -> AssetResult<()> {
        let Some((dir, name)) = path.split_last() else {
            return Err(AssetError::Validation("file path is required".into()));
        };
        match self.assets.stat(path.as_str()).await? {
            None => return Err(AssetError::NotFound(path.to_string())),
            Some(entry) if !entry.is_file() => return Err(AssetError::NotAFile(path.to_string())),
            Some(_) => {}
        }

        self.assets
            .remove_file(path.as_str())
            .await
            .map_err(|err| match err {
                StoreError::NotFound(p) => AssetError::NotFound(p),
                other => other.into(),
            })?;
        info!("deleted file {}", path);

        let thumb = dir.join(&thumbnail::thumbnail_name(name));
        match self.assets.remove_file(thumb.as_str()).await {
            Ok(()) => debug!("deleted thumbnail {}", thumb),
            Err(StoreError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        Ok(())
    }

    /// Open a stored file for streaming.
    pub async fn open_file(&self, path: &SafePath) -> AssetResult<(StoreEntry, ByteReader)> {
        let entry = match self.assets.stat(path.as_str()).await? {
            Some(entry) if entry.is_file() => entry,
            Some(_) => return Err(AssetError::NotAFile(path.to_string())),
            None => return Err(AssetError::NotFound(path.to_string())),
        };
        let reader = self.assets.open(path.as_str()).await.map_err(|err| match err {
            StoreError::NotFound(p) => AssetError::NotFound(p),
            other => other.into(),
        })?;
        Ok((entry, reader))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        db,
        services::{path_guard::guard, store::memory::MemoryStore},
    };
    use chrono::{Duration, Utc};

    pub(crate) struct Harness {
        pub service: AssetService,
        pub assets: MemoryStore,
        pub staging: MemoryStore,
    }

    pub(crate) async fn harness_with(limits: UploadLimits) -> Harness {
        let assets = MemoryStore::new();
        let staging = MemoryStore::new();
        let sessions = SessionRegistry::new(db::memory_pool().await.unwrap());
        let service = AssetService::new(
            Arc::new(assets.clone()),
            Arc::new(staging.clone()),
            sessions,
            limits,
            Bounds::default(),
        );
        Harness {
            service,
            assets,
            staging,
        }
    }

    pub(crate) async fn harness() -> Harness {
        harness_with(UploadLimits::default()).await
    }

    #[tokio::test]
    async fn listing_hides_thumbnails_and_sorts_newest_first() {
        let h = harness().await;
        let now = Utc::now();
        h.assets.insert_file("old.pdf", b"1", now - Duration::hours(2));
        h.assets.insert_file("new.png", b"22", now);
        h.assets.insert_file("_thumb_new.png", b"t", now);
        h.assets.insert_file(".tmp-123", b"x", now);
        h.service.assets.create_dir("zeta").await.unwrap();
        h.service.assets.create_dir("alpha").await.unwrap();

        let listing = h.service.list(&SafePath::root()).await.unwrap();
        let folders: Vec<_> = listing.folders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(folders, vec!["alpha", "zeta"]);

        let files: Vec<_> = listing.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(files, vec!["new.png", "old.pdf"]);
        assert_eq!(
            listing.files[0].thumbnail.as_deref(),
            Some("/assets/_thumb_new.png")
        );
        assert_eq!(listing.files[0].mime_type, "image/png");
        assert_eq!(listing.files[0].size, 2);
        assert_eq!(listing.files[1].thumbnail, None);
        assert_eq!(listing.files[1].mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn listing_missing_folder_is_not_found() {
        let h = harness().await;
        let err = h.service.list(&guard("nope").unwrap()).await.unwrap_err();
        assert!(matches!(err, AssetError::NotFound(_)));
    }

    #[tokio::test]
    async fn create_folder_sanitizes_and_rejects_duplicates() {
        let h = harness().await;
        let parent = guard("projects").unwrap();

        let path = h.service.create_folder(&parent, "Nová Složka").await.unwrap();
        assert_eq!(path.as_str(), "projects/nova-slozka");

        let dup = h.service.create_folder(&parent, "nova slozka").await.unwrap_err();
        assert!(matches!(dup, AssetError::Validation(_)));

        let empty = h.service.create_folder(&parent, "***").await.unwrap_err();
        assert!(matches!(empty, AssetError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_removes_companion_thumbnail() {
        let h = harness().await;
        let now = Utc::now();
        h.assets.insert_file("img/cat.png", b"png", now);
        h.assets.insert_file("img/_thumb_cat.png", b"thumb", now);
        h.assets.insert_file("img/dog.png", b"png", now);

        h.service.delete_file(&guard("img/cat.png").unwrap()).await.unwrap();
        assert_eq!(h.assets.file_paths(), vec!["img/dog.png"]);

        // No thumbnail is fine too.
        h.service.delete_file(&guard("img/dog.png").unwrap()).await.unwrap();
        assert!(h.assets.file_paths().is_empty());
    }

    #[tokio::test]
    async fn delete_missing_or_folder_has_no_side_effects() {
        let h = harness().await;
        h.assets.insert_file("img/cat.png", b"png", Utc::now());

        let missing = h.service.delete_file(&guard("img/none.png").unwrap()).await;
        assert!(matches!(missing, Err(AssetError::NotFound(_))));

        let folder = h.service.delete_file(&guard("img").unwrap()).await;
        assert!(matches!(folder, Err(AssetError::NotAFile(_))));

        assert_eq!(h.assets.file_paths(), vec!["img/cat.png"]);
    }

    #[tokio::test]
    async fn delete_folder_requires_empty_existing_folder() {
        let h = harness().await;
        h.assets.insert_file("full/a.txt", b"a", Utc::now());
        h.service.assets.create_dir("empty").await.unwrap();

        assert!(matches!(
            h.service.delete_folder(&guard("full").unwrap()).await,
            Err(AssetError::FolderNotEmpty(_))
        ));
        assert!(matches!(
            h.service.delete_folder(&guard("missing").unwrap()).await,
            Err(AssetError::NotFound(_))
        ));
        assert!(matches!(
            h.service.delete_folder(&SafePath::root()).await,
            Err(AssetError::Validation(_))
        ));
        assert!(matches!(
            h.service.delete_folder(&guard("full/a.txt").unwrap()).await,
            Err(AssetError::NotAFolder(_))
        ));
        h.service.delete_folder(&guard("empty").unwrap()).await.unwrap();
        assert!(h.service.assets.stat("empty").await.unwrap().is_none());
    }
}
