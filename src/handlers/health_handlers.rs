//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks SQLite and both stores

use crate::services::{asset_service::AssetService, store::AssetStore};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

/// `GET /healthz`
///
/// Liveness probe. Always 200, never touches I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that runs `SELECT 1` against SQLite and a
/// write/read/delete cycle against the asset and staging stores.
/// HTTP 200 when all checks pass, 503 otherwise.
pub async fn readyz(State(service): State<AssetService>) -> impl IntoResponse {
    let mut checks = BTreeMap::new();
    checks.insert(
        "sqlite",
        CheckStatus::from(service.sessions.ping().await.map_err(|e| e.to_string())),
    );
    checks.insert("assets", CheckStatus::from(probe(&*service.assets).await));
    checks.insert("staging", CheckStatus::from(probe(&*service.staging).await));

    let overall_ok = checks.values().all(|c| c.ok);
    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Write, read back and remove a hidden probe file at the store root.
async fn probe(store: &dyn AssetStore) -> Result<(), String> {
    let path = format!(".readyz-{}", Uuid::new_v4());
    store
        .write(&path, Bytes::from_static(b"readyz"))
        .await
        .map_err(|e| format!("could not write probe file: {}", e))?;

    let read = store.read(&path).await;
    let removed = store.remove_file(&path).await;
    match read {
        Ok(bytes) if bytes == "readyz" => {}
        Ok(_) => return Err("probe file content mismatch".into()),
        Err(e) => return Err(format!("could not read probe file: {}", e)),
    }
    removed.map_err(|e| format!("could not remove probe file: {}", e))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl From<Result<(), String>> for CheckStatus {
    fn from(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => CheckStatus {
                ok: true,
                error: None,
            },
            Err(error) => CheckStatus {
                ok: false,
                error: Some(error),
            },
        }
    }
}
