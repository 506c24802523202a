use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{FromRow, Row, Sqlite, Transaction};

use crate::error::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkType {
    Dependency,
    Input,
    Upstream,
    RenderedFrom,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::Dependency => "dependency",
            LinkType::Input => "input",
            LinkType::Upstream => "upstream",
            LinkType::RenderedFrom => "rendered_from",
        }
    }
}

impl std::str::FromStr for LinkType {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dependency" => Ok(LinkType::Dependency),
            "input" => Ok(LinkType::Input),
            "upstream" => Ok(LinkType::Upstream),
            "rendered_from" => Ok(LinkType::RenderedFrom),
            other => Err(PipelineError::Validation(format!(
                "unknown link type '{other}'"
            ))),
        }
    }
}

/// Directed dependency edge between two publish records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VersionLink {
    pub id: i64,
    pub source_id: i64,
    pub target_id: i64,
    pub link_type: LinkType,
    pub notes: String,
    pub created_at: NaiveDateTime,
}

impl<'r> FromRow<'r, SqliteRow> for VersionLink {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let type_raw: String = row.try_get("link_type")?;
        let link_type: LinkType =
            type_raw.parse().map_err(|e: PipelineError| sqlx::Error::ColumnDecode {
                index: "link_type".to_string(),
                source: Box::new(e),
            })?;

        Ok(VersionLink {
            id: row.try_get("id")?,
            source_id: row.try_get("source_id")?,
            target_id: row.try_get("target_id")?,
            link_type,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Link declaration inside a create-publish request; the source is the
/// publish being created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLink {
    pub target_publish_id: i64,
    #[serde(default = "default_link_type")]
    pub link_type: LinkType,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_link_type() -> LinkType {
    LinkType::Dependency
}

impl VersionLink {
    /// Idempotent on (source, target, type).
    pub async fn insert_tx(
        tx: &mut Transaction<'_, Sqlite>,
        source_id: i64,
        new: &NewLink,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            INSERT INTO version_links (source_id, target_id, link_type, notes)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (source_id, target_id, link_type) DO NOTHING
            ",
        )
        .bind(source_id)
        .bind(new.target_publish_id)
        .bind(new.link_type.as_str())
        .bind(new.notes.as_deref().unwrap_or(""))
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    pub async fn for_source(
        pool: &SqlitePool,
        source_id: i64,
    ) -> Result<Vec<VersionLink>, sqlx::Error> {
        sqlx::query_as::<_, VersionLink>(
            "SELECT * FROM version_links WHERE source_id = ? ORDER BY id",
        )
        .bind(source_id)
        .fetch_all(pool)
        .await
    }
}
