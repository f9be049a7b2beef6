use anyhow::Result;
use axum::Router;
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{
    asset_service::{AssetService, UploadLimits},
    reaper,
    session_registry::SessionRegistry,
    store::LocalStore,
    thumbnail::Bounds,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting asset-store with config: {:?}", cfg);

    // --- Ensure storage directories exist ---
    for dir in [&cfg.asset_dir, &cfg.staging_dir] {
        if !Path::new(dir).exists() {
            fs::create_dir_all(dir)?;
            tracing::info!("Created directory at {}", dir);
        }
    }

    // --- Initialize SQLite connection ---
    tracing::debug!("Connecting using raw URL => {}", cfg.database_url);
    let db = db::connect(&cfg.database_url).await?;
    db::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core service ---
    let service = AssetService::new(
        Arc::new(LocalStore::new(&cfg.asset_dir)),
        Arc::new(LocalStore::new(&cfg.staging_dir)),
        SessionRegistry::new(db.clone()),
        UploadLimits {
            max_upload_bytes: cfg.max_upload_bytes(),
        },
        Bounds {
            max_width: cfg.thumbnail_width,
            max_height: cfg.thumbnail_height,
        },
    );

    // --- Background session reaper ---
    reaper::spawn(service.clone(), cfg.session_ttl(), cfg.reap_interval());

    // --- Build router ---
    let app: Router =
        routes::routes::routes(routes::routes::body_limit(cfg.max_upload_bytes())).with_state(service);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
