//! src/services/upload_service.rs
//!
//! Upload pipeline on top of [`AssetService`]:
//! - chunk receipt into the staging store
//! - assembly of the staged chunks once the last index arrives
//! - direct single/multi-file uploads
//!
//! Every path commits through [`AssetService::commit_new`], so the naming and
//! collision scheme is the same for all of them.

use crate::{
    models::{
        asset::UploadedFile,
        upload::{ChunkOutcome, ChunkUpload, DirectUploadReport, FilePart, SessionState, StoredFile},
    },
    services::{
        asset_service::{AssetError, AssetResult, AssetService},
        name_resolver::{extension_of, resolve_name},
        path_guard::{SafePath, guard},
        store::{ByteStream, StoreError},
        thumbnail,
    },
};
use chrono::Utc;
use futures::{StreamExt, stream};
use tracing::{debug, info, warn};

/// Extensions accepted on every upload path.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "svg", "pdf", "mp4", "webm", "mp3", "wav", "zip",
];

const MAX_UPLOAD_ID_LEN: usize = 256;
const MAX_COMMIT_ATTEMPTS: usize = 8;

/// Staging directory of an upload. The id is hashed so client text never
/// becomes part of a path.
pub(crate) fn staging_dir(upload_id: &str) -> String {
    format!("{:x}", md5::compute(upload_id))
}

fn chunk_key(upload_id: &str, chunk_index: u32) -> String {
    format!("{}/{}", staging_dir(upload_id), chunk_index)
}

fn base_name(file_name: &str) -> &str {
    file_name.rsplit(['/', '\\']).next().unwrap_or(file_name).trim()
}

fn check_extension(file_name: &str) -> AssetResult<()> {
    let ext = extension_of(file_name);
    if ALLOWED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(AssetError::Validation(format!(
            "unsupported file type: {}",
            base_name(file_name)
        )))
    }
}

impl AssetService {
    fn check_size(&self, file_name: &str, size: u64) -> AssetResult<()> {
        let max = self.limits.max_upload_bytes;
        if size > max {
            return Err(AssetError::Validation(format!(
                "file {} is too large (max {} MiB)",
                base_name(file_name),
                max / (1024 * 1024)
            )));
        }
        Ok(())
    }

    async fn ensure_dir(&self, dir: &SafePath) -> AssetResult<()> {
        self.assets
            .create_dir(dir.as_str())
            .await
            .map_err(|err| match err {
                StoreError::NotADirectory(p) => {
                    AssetError::Validation(format!("destination `{}` is not a folder", p))
                }
                other => other.into(),
            })
    }

    /// Write a new file into `dir` under the canonical form of `desired`.
    ///
    /// The name is resolved against the live listing; if another writer takes
    /// it before the commit, the name is resolved again and the payload
    /// re-streamed from `make_stream`.
    pub(crate) async fn commit_new<F>(
        &self,
        dir: &SafePath,
        desired: &str,
        mut make_stream: F,
    ) -> AssetResult<(String, u64)>
    where
        F: FnMut() -> ByteStream<'static>,
    {
        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let taken = self.names_in(dir).await?;
            let name = resolve_name(desired, &taken, Utc::now());
            let path = dir.join(&name);
            match self.assets.write_new(path.as_str(), make_stream()).await {
                Ok(size) => return Ok((name, size)),
                Err(StoreError::AlreadyExists(_)) => {
                    debug!(attempt, "name {} was taken concurrently, resolving again", path);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Err(AssetError::Storage(StoreError::AlreadyExists(format!(
            "{} (no free name after {} attempts)",
            dir.join(base_name(desired)),
            MAX_COMMIT_ATTEMPTS
        ))))
    }

    /// Staged chunks of an upload, read one at a time in index order.
    fn staged_stream(&self, upload_id: &str, total_chunks: u32) -> ByteStream<'static> {
        let staging = self.staging.clone();
        let dir = staging_dir(upload_id);
        stream::iter(0..total_chunks)
            .then(move |index| {
                let staging = staging.clone();
                let key = format!("{}/{}", dir, index);
                async move { staging.read(&key).await }
            })
            .boxed()
    }

    /// Remove everything staged for an upload. Returns the number of chunks
    /// removed; failures are logged, never returned.
    pub(crate) async fn discard_staged(&self, upload_id: &str) -> usize {
        let dir = staging_dir(upload_id);
        let entries = match self.staging.list(&dir).await {
            Ok(entries) => entries,
            Err(StoreError::NotFound(_)) => return 0,
            Err(err) => {
                warn!("cannot list staged chunks of {}: {}", upload_id, err);
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.iter().filter(|e| e.is_file()) {
            let key = format!("{}/{}", dir, entry.name);
            match self.staging.remove_file(&key).await {
                Ok(()) => removed += 1,
                Err(err) => warn!("cannot remove staged chunk {}: {}", key, err),
            }
        }
        if let Err(err) = self.staging.remove_dir(&dir).await {
            debug!("cannot remove staging dir {}: {}", dir, err);
        }
        removed
    }

    /// Accept one chunk of a chunked upload.
    ///
    /// All validation happens before the chunk is written. The chunk whose
    /// index is `total_chunks - 1` triggers [`AssetService::finalize`].
    pub async fn receive_chunk(&self, chunk: ChunkUpload) -> AssetResult<ChunkOutcome> {
        if chunk.upload_id.trim().is_empty() || chunk.file_name.trim().is_empty() {
            return Err(AssetError::Validation(
                "file name and upload id are required".into(),
            ));
        }
        if chunk.upload_id.len() > MAX_UPLOAD_ID_LEN {
            return Err(AssetError::Validation("upload id is too long".into()));
        }
        if chunk.total_chunks == 0 {
            return Err(AssetError::Validation("totalChunks must be at least 1".into()));
        }
        if chunk.chunk_index >= chunk.total_chunks {
            return Err(AssetError::Validation(format!(
                "chunkIndex {} is out of range for {} chunks",
                chunk.chunk_index, chunk.total_chunks
            )));
        }
        let target = guard(&chunk.path)?;
        check_extension(&chunk.file_name)?;
        self.check_size(&chunk.file_name, chunk.data.len() as u64)?;

        // Held across touch and write so the reaper cannot drop this chunk
        // between the two. Released before finalize takes it again.
        let lock = self.finalize_locks.lock(&chunk.upload_id).await;
        let session = self
            .sessions
            .touch(
                &chunk.upload_id,
                base_name(&chunk.file_name),
                chunk.total_chunks,
                target.as_str(),
                Utc::now(),
            )
            .await?;
        if session.state == SessionState::Assembled {
            return Err(AssetError::UploadAlreadyComplete(chunk.upload_id));
        }
        if session.total_chunks != i64::from(chunk.total_chunks) {
            return Err(AssetError::Validation(format!(
                "totalChunks changed from {} to {}",
                session.total_chunks, chunk.total_chunks
            )));
        }

        let key = chunk_key(&chunk.upload_id, chunk.chunk_index);
        self.staging.write(&key, chunk.data).await?;
        debug!(
            upload_id = %chunk.upload_id,
            chunk_index = chunk.chunk_index,
            total_chunks = chunk.total_chunks,
            "staged chunk"
        );
        drop(lock);

        if chunk.chunk_index + 1 == chunk.total_chunks {
            let file = self.finalize(&chunk.upload_id).await?;
            Ok(ChunkOutcome::Assembled(file))
        } else {
            Ok(ChunkOutcome::Staged {
                chunk_index: chunk.chunk_index,
            })
        }
    }

    /// Assemble a staged upload into its destination directory.
    ///
    /// Fails with [`AssetError::IncompleteUpload`] (staging untouched) while
    /// any index is missing, and with [`AssetError::UploadAlreadyComplete`]
    /// once the upload has been assembled. Attempts for one upload id are
    /// serialized.
    pub async fn finalize(&self, upload_id: &str) -> AssetResult<StoredFile> {
        let lock = self.finalize_locks.lock(upload_id).await;

        let session = self
            .sessions
            .get(upload_id)
            .await?
            .ok_or_else(|| AssetError::NotFound(format!("upload `{}`", upload_id)))?;
        if session.state == SessionState::Assembled {
            return Err(AssetError::UploadAlreadyComplete(upload_id.to_string()));
        }
        let total = u32::try_from(session.total_chunks)
            .map_err(|_| AssetError::Validation("invalid chunk count".into()))?;

        let mut missing = Vec::new();
        let mut total_size: u64 = 0;
        for index in 0..total {
            match self.staging.stat(&chunk_key(upload_id, index)).await? {
                Some(entry) if entry.is_file() => total_size += entry.size,
                _ => missing.push(index),
            }
        }
        if !missing.is_empty() {
            info!(upload_id, ?missing, "finalize requested with missing chunks");
            return Err(AssetError::IncompleteUpload {
                upload_id: upload_id.to_string(),
                missing,
            });
        }

        if let Err(err) = self.check_size(&session.file_name, total_size) {
            warn!(upload_id, total_size, "assembled upload over the size limit, discarding");
            self.discard_staged(upload_id).await;
            self.sessions.remove(upload_id).await?;
            return Err(err);
        }

        let dir = guard(&session.target_path)?;
        self.ensure_dir(&dir).await?;
        let (name, size) = self
            .commit_new(&dir, &session.file_name, || {
                self.staged_stream(upload_id, total)
            })
            .await?;
        self.sessions
            .mark_assembled(upload_id, &name, Utc::now())
            .await?;
        let removed = self.discard_staged(upload_id).await;
        drop(lock);

        info!(
            upload_id,
            chunks = removed,
            size,
            "assembled {}",
            dir.join(&name)
        );

        let thumbnail = thumbnail::derive(&self.assets, &dir, &name, self.thumbnail_bounds).await;
        Ok(StoredFile {
            path: dir.join(&name).public_url(),
            filename: name,
            thumbnail,
            size,
        })
    }

    async fn store_part(&self, dir: &SafePath, part: &FilePart) -> AssetResult<UploadedFile> {
        let original = base_name(&part.file_name).to_string();
        if original.is_empty() {
            return Err(AssetError::Validation("file name is required".into()));
        }
        check_extension(&original)?;
        self.check_size(&original, part.size)?;

        self.ensure_dir(dir).await?;
        let data = part.data.clone();
        let (name, size) = self
            .commit_new(dir, &original, || {
                stream::once(futures::future::ready(Ok(data.clone()))).boxed()
            })
            .await?;
        info!(size, "stored {}", dir.join(&name));

        let thumbnail = thumbnail::derive(&self.assets, dir, &name, self.thumbnail_bounds).await;
        Ok(UploadedFile {
            path: dir.join(&name).public_url(),
            filename: name,
            thumbnail,
            original,
        })
    }

    /// Store one or more files sent in a single request.
    ///
    /// Each file succeeds or fails on its own; failures are reported as
    /// messages next to the stored files.
    pub async fn upload_files(
        &self,
        path: &str,
        parts: Vec<FilePart>,
    ) -> AssetResult<DirectUploadReport> {
        let dir = guard(path)?;
        if parts.is_empty() {
            return Err(AssetError::Validation("no files were uploaded".into()));
        }

        let mut report = DirectUploadReport {
            only_invalid_input: true,
            ..Default::default()
        };
        for part in &parts {
            match self.store_part(&dir, part).await {
                Ok(file) => report.files.push(file),
                Err(AssetError::Validation(msg)) => report.errors.push(msg),
                Err(err) => {
                    warn!("failed to store {}: {}", part.file_name, err);
                    report.only_invalid_input = false;
                    report
                        .errors
                        .push(format!("failed to store {}", base_name(&part.file_name)));
                }
            }
        }
        Ok(report)
    }
}
