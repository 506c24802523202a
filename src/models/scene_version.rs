//! Legacy flat scene versioning stream keyed by (task, software).
//!
//! Predates the publish registry and is still fed by DCC save hooks, so
//! the upsert semantics are preserved: re-recording the same numbers
//! updates the stored file path in place.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SceneVersion {
    pub id: i64,
    pub task_id: i64,
    pub artist_id: i64,
    pub software: String,
    pub file_path: String,
    pub version: i64,
    pub iteration: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSceneVersion {
    pub task_id: i64,
    pub artist_id: i64,
    pub software: String,
    pub file_path: String,
    pub version: i64,
    pub iteration: i64,
}

impl SceneVersion {
    pub async fn fetch_for_task(
        pool: &SqlitePool,
        task_id: i64,
        software: &str,
    ) -> Result<Vec<SceneVersion>, sqlx::Error> {
        sqlx::query_as::<_, SceneVersion>(
            r"
            SELECT * FROM scene_files
            WHERE task_id = ? AND software = ?
            ORDER BY version DESC, iteration DESC, id DESC
            ",
        )
        .bind(task_id)
        .bind(software)
        .fetch_all(pool)
        .await
    }

    pub async fn max_version(
        pool: &SqlitePool,
        task_id: i64,
        software: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COALESCE(MAX(version), 0) FROM scene_files WHERE task_id = ? AND software = ?",
        )
        .bind(task_id)
        .bind(software)
        .fetch_one(pool)
        .await
    }

    pub async fn max_iteration_for_version(
        pool: &SqlitePool,
        task_id: i64,
        software: &str,
        version: i64,
    ) -> Result<i64, sqlx::Error> {
        if version <= 0 {
            return Ok(0);
        }
        sqlx::query_scalar(
            r"
            SELECT COALESCE(MAX(iteration), 0)
            FROM scene_files
            WHERE task_id = ? AND software = ? AND version = ?
            ",
        )
        .bind(task_id)
        .bind(software)
        .bind(version)
        .fetch_one(pool)
        .await
    }

    /// Insert-or-update keyed by (task, software, version, iteration); a
    /// repeat recording replaces the stored file path.
    pub async fn upsert(pool: &SqlitePool, new: &NewSceneVersion) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO scene_files (task_id, artist_id, software, file_path, version, iteration)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (task_id, software, version, iteration)
            DO UPDATE SET file_path = excluded.file_path, updated_at = CURRENT_TIMESTAMP
            ",
        )
        .bind(new.task_id)
        .bind(new.artist_id)
        .bind(&new.software)
        .bind(&new.file_path)
        .bind(new.version)
        .bind(new.iteration)
        .execute(pool)
        .await?;
        Ok(())
    }
}
