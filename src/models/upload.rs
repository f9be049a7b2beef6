//! Chunked upload sessions and the results of receiving a chunk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle of an upload session row.
#[derive(Serialize, Deserialize, sqlx::Type, Clone, Copy, Debug, PartialEq, Eq)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Zero or more chunks staged; finalize may still fail as incomplete.
    Receiving,
    /// The file has been committed; further chunks are rejected.
    Assembled,
}

/// One logical file transfer, keyed by the client-generated upload id.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadSession {
    /// Opaque correlation key chosen by the client.
    pub upload_id: String,

    /// File name as sent with the first chunk.
    pub file_name: String,

    /// Number of chunks, fixed by the first chunk.
    pub total_chunks: i64,

    /// Guarded destination directory relative to the asset root.
    pub target_path: String,

    pub state: SessionState,

    /// Canonical name the file was stored under, once assembled.
    pub final_name: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Last chunk or state change; drives the reaper.
    pub updated_at: DateTime<Utc>,
}

/// A single chunk as received from the client.
#[derive(Debug, Clone)]
pub struct ChunkUpload {
    pub upload_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub file_name: String,
    pub path: String,
    pub data: bytes::Bytes,
}

/// Result of accepting one chunk.
#[derive(Debug, Clone)]
pub enum ChunkOutcome {
    /// Chunk staged; the upload is not complete yet.
    Staged { chunk_index: u32 },
    /// The last chunk completed the upload.
    Assembled(StoredFile),
}

/// A file committed to the asset tree by an upload.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    /// Canonical name in the destination directory.
    pub filename: String,

    /// Public URL of the file.
    pub path: String,

    /// Public URL of the thumbnail, when one was derived.
    pub thumbnail: Option<String>,

    pub size: u64,
}

/// One file part of a direct (non-chunked) upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Name the client sent.
    pub file_name: String,

    /// Payload; empty when the part was over the size limit.
    pub data: bytes::Bytes,

    /// Number of bytes the client sent, counted even past the limit.
    pub size: u64,
}

/// Per-file results of a direct upload.
#[derive(Debug, Clone, Default)]
pub struct DirectUploadReport {
    pub files: Vec<crate::models::asset::UploadedFile>,
    pub errors: Vec<String>,

    /// True when every failure was a rejected input rather than a storage fault.
    pub only_invalid_input: bool,
}
