use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, Transaction};

use crate::error::PipelineError;
use crate::models::target::TargetRef;

/// Review status of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublishStatus {
    Draft,
    Pending,
    Approved,
    Deprecated,
    Published,
    Failed,
}

impl PublishStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStatus::Draft => "draft",
            PublishStatus::Pending => "pending",
            PublishStatus::Approved => "approved",
            PublishStatus::Deprecated => "deprecated",
            PublishStatus::Published => "published",
            PublishStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PublishStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(PublishStatus::Draft),
            "pending" => Ok(PublishStatus::Pending),
            "approved" => Ok(PublishStatus::Approved),
            "deprecated" => Ok(PublishStatus::Deprecated),
            "published" => Ok(PublishStatus::Published),
            "failed" => Ok(PublishStatus::Failed),
            other => Err(PipelineError::Validation(format!(
                "unknown publish status '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for PublishStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of delivered production data against a task.
///
/// Only `is_latest` and `updated_at` ever change after insert; records are
/// never deleted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishRecord {
    pub id: i64,
    pub project_id: Option<i64>,
    pub target: TargetRef,
    pub task_id: Option<i64>,
    pub software: String,
    pub source_version: i64,
    pub source_iteration: i64,
    pub label: String,
    pub status: PublishStatus,
    pub item_path: String,
    pub asset_path: String,
    pub preview_path: String,
    pub comment: String,
    pub metadata: serde_json::Value,
    pub is_latest: bool,
    pub published_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl PublishRecord {
    /// Ranking key: streams are totally ordered by (version, iteration, id).
    pub fn rank(&self) -> (i64, i64, i64) {
        (self.source_version, self.source_iteration, self.id)
    }
}

impl<'r> FromRow<'r, SqliteRow> for PublishRecord {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let target_kind: String = row.try_get("target_kind")?;
        let target_id: i64 = row.try_get("target_id")?;
        let target =
            TargetRef::from_parts(&target_kind, target_id).map_err(|e| sqlx::Error::ColumnDecode {
                index: "target_kind".to_string(),
                source: Box::new(e),
            })?;

        let status_raw: String = row.try_get("status")?;
        let status: PublishStatus = status_raw.parse().map_err(|e: PipelineError| {
            sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: Box::new(e),
            }
        })?;

        let metadata_raw: String = row.try_get("metadata")?;
        let metadata =
            serde_json::from_str(&metadata_raw).unwrap_or_else(|_| serde_json::json!({}));

        Ok(PublishRecord {
            id: row.try_get("id")?,
            project_id: row.try_get("project_id")?,
            target,
            task_id: row.try_get("task_id")?,
            software: row.try_get("software")?,
            source_version: row.try_get("source_version")?,
            source_iteration: row.try_get("source_iteration")?,
            label: row.try_get("label")?,
            status,
            item_path: row.try_get("item_path")?,
            asset_path: row.try_get("asset_path")?,
            preview_path: row.try_get("preview_path")?,
            comment: row.try_get("comment")?,
            metadata,
            is_latest: row.try_get("is_latest")?,
            published_at: row.try_get("published_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fully resolved publish ready for insertion.
#[derive(Debug, Clone)]
pub struct NewPublish {
    pub project_id: Option<i64>,
    pub target: TargetRef,
    pub task_id: Option<i64>,
    pub software: String,
    pub source_version: i64,
    pub source_iteration: i64,
    pub label: String,
    pub status: PublishStatus,
    pub item_path: String,
    pub asset_path: String,
    pub preview_path: String,
    pub comment: String,
    pub metadata: serde_json::Value,
}

impl PublishRecord {
    /// Insert within a transaction; the stream-numbers unique index turns a
    /// racing duplicate into a constraint error the caller retries on.
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        new: &NewPublish,
    ) -> Result<i64, sqlx::Error> {
        let metadata = serde_json::to_string(&new.metadata).unwrap_or_else(|_| "{}".to_string());
        let result = sqlx::query(
            r"
            INSERT INTO publishes (
                project_id, target_kind, target_id, task_id, software,
                source_version, source_iteration, label, status,
                item_path, asset_path, preview_path, comment, metadata, is_latest
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ",
        )
        .bind(new.project_id)
        .bind(new.target.kind.as_str())
        .bind(new.target.id)
        .bind(new.task_id)
        .bind(&new.software)
        .bind(new.source_version)
        .bind(new.source_iteration)
        .bind(&new.label)
        .bind(new.status.as_str())
        .bind(&new.item_path)
        .bind(&new.asset_path)
        .bind(&new.preview_path)
        .bind(&new.comment)
        .bind(metadata)
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_by_id(
        pool: &SqlitePool,
        id: i64,
    ) -> Result<Option<PublishRecord>, sqlx::Error> {
        sqlx::query_as::<_, PublishRecord>("SELECT * FROM publishes WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Recompute the stream's latest pointer: clear every flag, then set it
    /// on the top-ranked row. Ranking is (version, iteration, id) so ties
    /// from explicit numbers resolve by insertion order.
    pub async fn refresh_latest_pointer(
        tx: &mut Transaction<'_, Sqlite>,
        target: TargetRef,
        task_id: Option<i64>,
        software: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            UPDATE publishes
            SET is_latest = 0, updated_at = CURRENT_TIMESTAMP
            WHERE target_kind = ? AND target_id = ?
              AND IFNULL(task_id, 0) = IFNULL(?, 0)
              AND software = ?
              AND is_latest = 1
            ",
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .bind(task_id)
        .bind(software)
        .execute(&mut **tx)
        .await?;

        sqlx::query(
            r"
            UPDATE publishes
            SET is_latest = 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = (
                SELECT id FROM publishes
                WHERE target_kind = ? AND target_id = ?
                  AND IFNULL(task_id, 0) = IFNULL(?, 0)
                  AND software = ?
                ORDER BY source_version DESC, source_iteration DESC, id DESC
                LIMIT 1
            )
            ",
        )
        .bind(target.kind.as_str())
        .bind(target.id)
        .bind(task_id)
        .bind(software)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in ["draft", "pending", "approved", "deprecated", "published", "failed"] {
            let parsed: PublishStatus = status.parse().unwrap();
            assert_eq!(parsed.as_str(), status);
        }
        assert!("wip".parse::<PublishStatus>().is_err());
    }
}
