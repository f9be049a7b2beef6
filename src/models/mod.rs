//! Core data models for the asset store.
//!
//! Upload sessions map to the `upload_sessions` table via `sqlx::FromRow`;
//! assets and listings serialize as the JSON bodies the editor consumes.

pub mod asset;
pub mod upload;
