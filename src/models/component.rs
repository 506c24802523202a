use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, Transaction};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    Scene,
    Cache,
    Preview,
    Image,
    Data,
}

impl ComponentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentType::Scene => "scene",
            ComponentType::Cache => "cache",
            ComponentType::Preview => "preview",
            ComponentType::Image => "image",
            ComponentType::Data => "data",
        }
    }
}

impl std::str::FromStr for ComponentType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scene" => Ok(ComponentType::Scene),
            "cache" => Ok(ComponentType::Cache),
            "preview" => Ok(ComponentType::Preview),
            "image" => Ok(ComponentType::Image),
            "data" => Ok(ComponentType::Data),
            other => Err(PipelineError::Validation(format!(
                "unknown component type '{other}'"
            ))),
        }
    }
}

/// One delivered file belonging to a publish; deleted with its parent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublishComponent {
    pub id: i64,
    pub publish_id: i64,
    pub name: String,
    pub component_type: ComponentType,
    pub file_path: String,
    pub file_size: Option<i64>,
    pub hash_md5: String,
    pub frame_start: Option<i64>,
    pub frame_end: Option<i64>,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
}

impl<'r> FromRow<'r, SqliteRow> for PublishComponent {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let type_raw: String = row.try_get("component_type")?;
        let component_type: ComponentType =
            type_raw.parse().map_err(|e: PipelineError| sqlx::Error::ColumnDecode {
                index: "component_type".to_string(),
                source: Box::new(e),
            })?;

        let metadata_raw: String = row.try_get("metadata")?;
        let metadata =
            serde_json::from_str(&metadata_raw).unwrap_or_else(|_| serde_json::json!({}));

        Ok(PublishComponent {
            id: row.try_get("id")?,
            publish_id: row.try_get("publish_id")?,
            name: row.try_get("name")?,
            component_type,
            file_path: row.try_get("file_path")?,
            file_size: row.try_get("file_size")?,
            hash_md5: row.try_get("hash_md5")?,
            frame_start: row.try_get("frame_start")?,
            frame_end: row.try_get("frame_end")?,
            metadata,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Component declaration inside a create-publish request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComponent {
    pub name: String,
    #[serde(default = "default_component_type")]
    pub component_type: ComponentType,
    pub file_path: String,
    #[serde(default)]
    pub file_size: Option<i64>,
    #[serde(default)]
    pub hash_md5: Option<String>,
    #[serde(default)]
    pub frame_start: Option<i64>,
    #[serde(default)]
    pub frame_end: Option<i64>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn default_component_type() -> ComponentType {
    ComponentType::Scene
}

impl PublishComponent {
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        publish_id: i64,
        new: &NewComponent,
    ) -> Result<i64, sqlx::Error> {
        let metadata = new
            .metadata
            .as_ref()
            .map(|m| serde_json::to_string(m).unwrap_or_else(|_| "{}".to_string()))
            .unwrap_or_else(|| "{}".to_string());

        let result = sqlx::query(
            r"
            INSERT INTO publish_components (
                publish_id, name, component_type, file_path,
                file_size, hash_md5, frame_start, frame_end, metadata
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(publish_id)
        .bind(&new.name)
        .bind(new.component_type.as_str())
        .bind(&new.file_path)
        .bind(new.file_size)
        .bind(new.hash_md5.as_deref().unwrap_or(""))
        .bind(new.frame_start)
        .bind(new.frame_end)
        .bind(metadata)
        .execute(&mut **tx)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn for_publish(
        pool: &SqlitePool,
        publish_id: i64,
    ) -> Result<Vec<PublishComponent>, sqlx::Error> {
        sqlx::query_as::<_, PublishComponent>(
            "SELECT * FROM publish_components WHERE publish_id = ? ORDER BY name, id",
        )
        .bind(publish_id)
        .fetch_all(pool)
        .await
    }
}
