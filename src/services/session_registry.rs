//! Explicit table of chunked upload sessions.
//!
//! A session row is created by the first chunk of an upload, flipped to
//! `assembled` once the file is committed, and deleted by the reaper when it
//! has been idle past the TTL. Chunk payloads live in the staging store.

use crate::models::upload::{SessionState, UploadSession};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

const SESSION_COLUMNS: &str =
    "upload_id, file_name, total_chunks, target_path, state, final_name, created_at, updated_at";

#[derive(Clone)]
pub struct SessionRegistry {
    db: Arc<SqlitePool>,
}

impl SessionRegistry {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Create the session on its first chunk, or bump `updated_at` on an
    /// existing one. Returns the stored row; the first chunk's file name,
    /// total and target path win.
    pub async fn touch(
        &self,
        upload_id: &str,
        file_name: &str,
        total_chunks: u32,
        target_path: &str,
        now: DateTime<Utc>,
    ) -> Result<UploadSession, sqlx::Error> {
        let sql = format!(
            "INSERT INTO upload_sessions ({SESSION_COLUMNS})
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
             ON CONFLICT(upload_id) DO UPDATE SET updated_at = excluded.updated_at
             RETURNING {SESSION_COLUMNS}"
        );
        sqlx::query_as::<_, UploadSession>(&sql)
            .bind(upload_id)
            .bind(file_name)
            .bind(total_chunks as i64)
            .bind(target_path)
            .bind(SessionState::Receiving)
            .bind(now)
            .bind(now)
            .fetch_one(&*self.db)
            .await
    }

    pub async fn get(&self, upload_id: &str) -> Result<Option<UploadSession>, sqlx::Error> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM upload_sessions WHERE upload_id = ?");
        sqlx::query_as::<_, UploadSession>(&sql)
            .bind(upload_id)
            .fetch_optional(&*self.db)
            .await
    }

    /// Record a successful assembly.
    pub async fn mark_assembled(
        &self,
        upload_id: &str,
        final_name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE upload_sessions SET state = ?, final_name = ?, updated_at = ?
             WHERE upload_id = ?",
        )
        .bind(SessionState::Assembled)
        .bind(final_name)
        .bind(now)
        .bind(upload_id)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    pub async fn remove(&self, upload_id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM upload_sessions WHERE upload_id = ?")
            .bind(upload_id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sessions whose last activity is older than `cutoff`.
    pub async fn idle_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<UploadSession>, sqlx::Error> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM upload_sessions
             WHERE updated_at < ? ORDER BY updated_at ASC"
        );
        sqlx::query_as::<_, UploadSession>(&sql)
            .bind(cutoff)
            .fetch_all(&*self.db)
            .await
    }

    /// Cheap connectivity probe for readiness checks.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        let one = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if one == 1 {
            Ok(())
        } else {
            Err(sqlx::Error::Protocol(format!("unexpected probe result {}", one)))
        }
    }
}
