//! HTTP handlers for browsing, folders, deletion and downloads.

use crate::{
    errors::AppError,
    handlers::Success,
    models::asset::AssetListing,
    services::{
        asset_service::AssetService,
        path_guard::{guard, guard_public},
    },
};
use axum::{
    Json,
    body::Body,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct FolderResponse {
    /// Canonical folder name.
    pub folder: String,
    /// Folder path relative to the asset root.
    pub path: String,
}

/// `GET /api/assets?path=`
pub async fn list_assets(
    State(service): State<AssetService>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Success<AssetListing>>, AppError> {
    let Query(query) = query?;
    let dir = guard(&query.path)?;
    let listing = service.list(&dir).await?;
    Ok(Json(Success::new(listing)))
}

/// `DELETE /api/assets` with `{ "path": "/assets/dir/file.png" }`
pub async fn delete_asset(
    State(service): State<AssetService>,
    payload: Result<Json<PathRequest>, JsonRejection>,
) -> Result<Json<Success<MessageResponse>>, AppError> {
    let Json(req) = payload?;
    let path = guard_public(&req.path)?;
    service.delete_file(&path).await?;
    Ok(Json(Success::new(MessageResponse {
        message: "File deleted successfully".into(),
    })))
}

/// `POST /api/folders` with `{ "name": "...", "path": "parent" }`
pub async fn create_folder(
    State(service): State<AssetService>,
    payload: Result<Json<CreateFolderRequest>, JsonRejection>,
) -> Result<Json<Success<FolderResponse>>, AppError> {
    let Json(req) = payload?;
    let parent = guard(&req.path)?;
    let created = service.create_folder(&parent, &req.name).await?;
    let folder = created
        .split_last()
        .map(|(_, name)| name.to_string())
        .unwrap_or_default();
    Ok(Json(Success::new(FolderResponse {
        folder,
        path: created.to_string(),
    })))
}

/// `DELETE /api/folders` with `{ "path": "dir/sub" }`
pub async fn delete_folder(
    State(service): State<AssetService>,
    payload: Result<Json<PathRequest>, JsonRejection>,
) -> Result<Json<Success<MessageResponse>>, AppError> {
    let Json(req) = payload?;
    let path = guard(&req.path)?;
    service.delete_folder(&path).await?;
    Ok(Json(Success::new(MessageResponse {
        message: "Folder deleted successfully".into(),
    })))
}

/// `GET /assets/{*path}` as a streaming response.
pub async fn download_asset(
    State(service): State<AssetService>,
    Path(path): Path<String>,
) -> Result<Response, AppError> {
    let path = guard(&path)?;
    let (entry, reader) = service.open_file(&path).await?;
    let body = Body::from_stream(ReaderStream::new(reader));

    let mime = mime_guess::from_path(path.as_str()).first_or_octet_stream();
    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.essence_str()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(entry.size));
    Ok(response)
}
