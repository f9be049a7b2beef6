use crate::services::{asset_service::AssetError, path_guard::PathRejected};
use axum::{
    Json,
    extract::{
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for request errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,

    /// Per-item failures, reported as `errors` when non-empty.
    pub errors: Vec<String>,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            errors: Vec::new(),
        }
    }

    /// Attach the individual failures behind this error.
    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.message,
            "status": self.status.as_u16()
        });
        if !self.errors.is_empty() {
            body["errors"] = json!(self.errors);
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<AssetError> for AppError {
    fn from(err: AssetError) -> Self {
        match err {
            AssetError::Validation(_)
            | AssetError::PathTraversal(_)
            | AssetError::IncompleteUpload { .. }
            | AssetError::NotAFile(_)
            | AssetError::NotAFolder(_)
            | AssetError::FolderNotEmpty(_) => AppError::bad_request(err.to_string()),
            AssetError::NotFound(_) => AppError::not_found(err.to_string()),
            AssetError::UploadAlreadyComplete(_) => {
                AppError::new(StatusCode::CONFLICT, err.to_string())
            }
            AssetError::Storage(_) | AssetError::Database(_) => {
                tracing::error!("request failed: {}", err);
                AppError::internal("internal storage error")
            }
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(
            err.status(),
            format!("malformed multipart body: {}", err.body_text()),
        )
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::bad_request(err.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(err: QueryRejection) -> Self {
        AppError::bad_request(err.body_text())
    }
}

impl From<PathRejected> for AppError {
    fn from(err: PathRejected) -> Self {
        AssetError::from(err).into()
    }
}
