use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::error::{PipelineError, Result};

/// The four kinds of production entity a publish can land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Project,
    Sequence,
    Shot,
    Asset,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::Project => "project",
            TargetKind::Sequence => "sequence",
            TargetKind::Shot => "shot",
            TargetKind::Asset => "asset",
        }
    }

    fn table(&self) -> &'static str {
        match self {
            TargetKind::Project => "projects",
            TargetKind::Sequence => "sequences",
            TargetKind::Shot => "shots",
            TargetKind::Asset => "assets",
        }
    }
}

impl std::str::FromStr for TargetKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "project" => Ok(TargetKind::Project),
            "sequence" => Ok(TargetKind::Sequence),
            "shot" => Ok(TargetKind::Shot),
            "asset" => Ok(TargetKind::Asset),
            other => Err(PipelineError::Validation(format!(
                "unknown target kind '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A publish target: one of the four entity kinds plus its numeric id.
/// Dispatched by explicit matching everywhere it is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetRef {
    pub kind: TargetKind,
    pub id: i64,
}

impl TargetRef {
    pub fn new(kind: TargetKind, id: i64) -> Self {
        Self { kind, id }
    }

    pub fn from_parts(kind: &str, id: i64) -> Result<Self> {
        if id < 1 {
            return Err(PipelineError::Validation(format!(
                "target id must be positive, got {id}"
            )));
        }
        Ok(Self::new(kind.parse()?, id))
    }

    /// Check the referenced entity row exists in the production store.
    pub async fn exists(&self, pool: &SqlitePool) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE id = ?)",
            self.kind.table()
        );
        let found: bool = sqlx::query_scalar(&sql).bind(self.id).fetch_one(pool).await?;
        Ok(found)
    }
}

impl std::fmt::Display for TargetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}
