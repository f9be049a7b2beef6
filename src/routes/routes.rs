//! Defines routes for the asset API and file downloads.
//!
//! ## Structure
//! - **Uploads**
//!   - `POST   /api/upload/chunk` — one chunk of a chunked upload
//!   - `POST   /api/upload`       — one or more whole files
//!
//! - **Browsing**
//!   - `GET    /api/assets?path=` — list a folder
//!   - `DELETE /api/assets`       — delete a file and its thumbnail
//!   - `POST   /api/folders`      — create a folder
//!   - `DELETE /api/folders`      — delete an empty folder
//!
//! - **Files**
//!   - `GET    /assets/{*path}`   — download a stored file
//!
//! The wildcard `*path` allows nested paths like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        asset_handlers::{create_folder, delete_asset, delete_folder, download_asset, list_assets},
        health_handlers::{healthz, readyz},
        upload_handlers::{upload_chunk, upload_files},
    },
    services::asset_service::AssetService,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Room for multipart boundaries and text fields on top of the file payload.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Request body limit for a given per-file ceiling. Applies to every route
/// except `/api/upload`, which may carry several files.
pub fn body_limit(max_upload_bytes: u64) -> usize {
    usize::try_from(max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)).unwrap_or(usize::MAX)
}

/// Build the router for every endpoint.
///
/// The router carries shared state (`AssetService`) to all handlers.
pub fn routes(body_limit: usize) -> Router<AssetService> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // uploads
        .route("/api/upload/chunk", post(upload_chunk))
        // per-file ceilings are enforced while reading the parts
        .route(
            "/api/upload",
            post(upload_files).layer(DefaultBodyLimit::disable()),
        )
        // browsing
        .route("/api/assets", get(list_assets).delete(delete_asset))
        .route("/api/folders", post(create_folder).delete(delete_folder))
        // stored files
        .route("/assets/{*path}", get(download_asset))
        .layer(DefaultBodyLimit::max(body_limit))
}
