use anyhow::{Context, Result};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub asset_dir: String,
    pub staging_dir: String,
    pub database_url: String,
    pub max_upload_mb: u64,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
    pub session_ttl_secs: u64,
    pub reap_interval_secs: u64,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Asset store backend for the content editor")]
pub struct Args {
    /// Host to bind to (overrides ASSET_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides ASSET_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Root directory served as /assets (overrides ASSET_STORE_ASSET_DIR)
    #[arg(long)]
    pub asset_dir: Option<String>,

    /// Scratch directory for in-flight upload chunks (overrides ASSET_STORE_STAGING_DIR)
    #[arg(long)]
    pub staging_dir: Option<String>,

    /// Database URL (overrides ASSET_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Largest accepted file in MiB (overrides ASSET_STORE_MAX_UPLOAD_MB)
    #[arg(long)]
    pub max_upload_mb: Option<u64>,

    /// Thumbnail bounding box width (overrides ASSET_STORE_THUMBNAIL_WIDTH)
    #[arg(long)]
    pub thumbnail_width: Option<u32>,

    /// Thumbnail bounding box height (overrides ASSET_STORE_THUMBNAIL_HEIGHT)
    #[arg(long)]
    pub thumbnail_height: Option<u32>,

    /// Idle time after which an upload session is reaped (overrides ASSET_STORE_SESSION_TTL_SECS)
    #[arg(long)]
    pub session_ttl_secs: Option<u64>,

    /// Reaper period (overrides ASSET_STORE_REAP_INTERVAL_SECS)
    #[arg(long)]
    pub reap_interval_secs: Option<u64>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("ASSET_STORE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_or("ASSET_STORE_PORT", 3000u16)?;
        let env_assets =
            env::var("ASSET_STORE_ASSET_DIR").unwrap_or_else(|_| "./data/assets".into());
        let env_staging =
            env::var("ASSET_STORE_STAGING_DIR").unwrap_or_else(|_| "./data/staging".into());
        let env_db = env::var("ASSET_STORE_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/asset_store.db".into());
        let env_max_upload = env_or("ASSET_STORE_MAX_UPLOAD_MB", 100u64)?;
        let env_thumb_w = env_or("ASSET_STORE_THUMBNAIL_WIDTH", 200u32)?;
        let env_thumb_h = env_or("ASSET_STORE_THUMBNAIL_HEIGHT", 200u32)?;
        let env_ttl = env_or("ASSET_STORE_SESSION_TTL_SECS", 24 * 60 * 60u64)?;
        let env_reap = env_or("ASSET_STORE_REAP_INTERVAL_SECS", 15 * 60u64)?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            asset_dir: args.asset_dir.unwrap_or(env_assets),
            staging_dir: args.staging_dir.unwrap_or(env_staging),
            database_url: args.database_url.unwrap_or(env_db),
            max_upload_mb: args.max_upload_mb.unwrap_or(env_max_upload),
            thumbnail_width: args.thumbnail_width.unwrap_or(env_thumb_w),
            thumbnail_height: args.thumbnail_height.unwrap_or(env_thumb_h),
            session_ttl_secs: args.session_ttl_secs.unwrap_or(env_ttl),
            reap_interval_secs: args.reap_interval_secs.unwrap_or(env_reap),
        };

        if cfg.thumbnail_width == 0 || cfg.thumbnail_height == 0 {
            anyhow::bail!("thumbnail bounding box must be non-zero");
        }

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}
