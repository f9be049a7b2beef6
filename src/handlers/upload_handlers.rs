//! HTTP handlers for chunked and direct uploads.
//!
//! Multipart fields are read piecewise so that an oversized part is noticed
//! before it is fully buffered.

use crate::{
    errors::AppError,
    handlers::Success,
    models::{
        asset::UploadedFile,
        upload::{ChunkOutcome, ChunkUpload, FilePart, StoredFile},
    },
    services::asset_service::AssetService,
};
use axum::{
    Json,
    extract::{Multipart, State, multipart::Field},
    http::StatusCode,
};
use bytes::{Bytes, BytesMut};
use serde::Serialize;
use tracing::debug;

/// File parts accepted per direct upload request; later parts are drained
/// and reported as rejected.
pub const MAX_FILES_PER_REQUEST: usize = 20;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResponse {
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<StoredFile>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub files: Vec<UploadedFile>,
    pub errors: Vec<String>,
}

/// Payload of one field plus the number of bytes the client sent for it.
/// Buffering stops once `limit` is exceeded.
async fn read_capped(mut field: Field<'_>, limit: u64) -> Result<(Bytes, u64), AppError> {
    let mut buf = BytesMut::new();
    let mut size: u64 = 0;
    while let Some(piece) = field.chunk().await? {
        size += piece.len() as u64;
        if size <= limit {
            buf.extend_from_slice(&piece);
        } else {
            buf.clear();
        }
    }
    Ok((buf.freeze(), size))
}

fn parse_index(name: &str, raw: Option<String>) -> Result<u32, AppError> {
    let raw = raw.ok_or_else(|| AppError::bad_request(format!("{} is required", name)))?;
    raw.trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("{} must be a non-negative integer", name)))
}

/// `POST /api/upload/chunk`
///
/// Fields: `chunk` (bytes), `chunkIndex`, `totalChunks`, `fileName`,
/// `fileId`, `path`.
pub async fn upload_chunk(
    State(service): State<AssetService>,
    mut multipart: Multipart,
) -> Result<Json<Success<ChunkResponse>>, AppError> {
    let limit = service.limits.max_upload_bytes;
    let mut data = None;
    let mut chunk_index = None;
    let mut total_chunks = None;
    let mut file_name = None;
    let mut upload_id = None;
    let mut path = None;

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "chunk" => {
                let (bytes, size) = read_capped(field, limit).await?;
                if size > limit {
                    return Err(AppError::bad_request(format!(
                        "chunk is too large (max {} MiB)",
                        limit / (1024 * 1024)
                    )));
                }
                data = Some(bytes);
            }
            "chunkIndex" => chunk_index = Some(field.text().await?),
            "totalChunks" => total_chunks = Some(field.text().await?),
            "fileName" => file_name = Some(field.text().await?),
            "fileId" => upload_id = Some(field.text().await?),
            "path" => path = Some(field.text().await?),
            other => debug!("ignoring multipart field {}", other),
        }
    }

    let data = data.ok_or_else(|| AppError::bad_request("no chunk uploaded"))?;
    let chunk = ChunkUpload {
        chunk_index: parse_index("chunkIndex", chunk_index)?,
        total_chunks: parse_index("totalChunks", total_chunks)?,
        upload_id: upload_id.unwrap_or_default(),
        file_name: file_name.unwrap_or_default(),
        path: path.unwrap_or_default(),
        data,
    };

    let response = match service.receive_chunk(chunk).await? {
        ChunkOutcome::Staged { chunk_index } => ChunkResponse {
            complete: false,
            chunk_index: Some(chunk_index),
            file: None,
        },
        ChunkOutcome::Assembled(file) => ChunkResponse {
            complete: true,
            chunk_index: None,
            file: Some(file),
        },
    };
    Ok(Json(Success::new(response)))
}

/// `POST /api/upload`
///
/// Every `assetfile` / `assetfile[]` field is one file; `path` is the
/// destination folder. Each file is checked against the size ceiling on its
/// own. Responds 200 when at least one file was stored; otherwise the error
/// body lists every per-file failure under `errors`.
pub async fn upload_files(
    State(service): State<AssetService>,
    mut multipart: Multipart,
) -> Result<Json<Success<UploadResponse>>, AppError> {
    let limit = service.limits.max_upload_bytes;
    let mut parts = Vec::new();
    let mut rejected = Vec::new();
    let mut path = String::new();

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "assetfile" | "assetfile[]" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                if parts.len() >= MAX_FILES_PER_REQUEST {
                    read_capped(field, 0).await?;
                    rejected.push(format!(
                        "{}: too many files in one request (max {})",
                        file_name, MAX_FILES_PER_REQUEST
                    ));
                    continue;
                }
                let (data, size) = read_capped(field, limit).await?;
                parts.push(FilePart {
                    file_name,
                    data,
                    size,
                });
            }
            "path" => path = field.text().await?,
            other => debug!("ignoring multipart field {}", other),
        }
    }

    let mut report = service.upload_files(&path, parts).await?;
    report.errors.extend(rejected);
    if report.files.is_empty() && !report.errors.is_empty() {
        let status = if report.only_invalid_input {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        return Err(AppError::new(status, "no files were uploaded").with_errors(report.errors));
    }

    Ok(Json(Success::new(UploadResponse {
        files: report.files,
        errors: report.errors,
    })))
}
