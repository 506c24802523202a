//! # Version Allocation
//!
//! Computes the next (version, iteration) pair for a numbering scope. The
//! allocator is a pure read over persisted state; making its answer safe
//! under concurrency is the registry's job (unique stream index plus a
//! bounded retry loop around the insert).

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};

use crate::error::{PipelineError, Result};
use crate::models::{SceneVersion, TargetRef};

/// Which number advances on the next save/publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bump {
    Version,
    #[default]
    Iteration,
}

impl std::str::FromStr for Bump {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "version" => Ok(Bump::Version),
            "iteration" => Ok(Bump::Iteration),
            other => Err(PipelineError::Validation(format!("unknown bump '{other}'"))),
        }
    }
}

/// A numbering scope: the legacy scene stream keyed by (task, software),
/// or a publish stream keyed by target plus optional task and software
/// filters.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamScope {
    Scene {
        task_id: i64,
        software: String,
    },
    Publish {
        target: TargetRef,
        task_id: Option<i64>,
        software: Option<String>,
    },
}

pub struct VersionAllocator;

impl VersionAllocator {
    /// Next numbers for the scope. Empty scope yields (1, 1) regardless of
    /// bump; `Version` advances the major number and resets the iteration;
    /// `Iteration` advances within the current max version.
    pub async fn next(pool: &SqlitePool, scope: &StreamScope, bump: Bump) -> Result<(i64, i64)> {
        let current_version = Self::max_version(pool, scope).await?;
        if bump == Bump::Version || current_version == 0 {
            return Ok((current_version + 1, 1));
        }
        let latest_iteration =
            Self::max_iteration_for_version(pool, scope, current_version).await?;
        Ok((current_version.max(1), latest_iteration + 1))
    }

    async fn max_version(pool: &SqlitePool, scope: &StreamScope) -> Result<i64> {
        match scope {
            StreamScope::Scene { task_id, software } => {
                Ok(SceneVersion::max_version(pool, *task_id, software).await?)
            }
            StreamScope::Publish {
                target,
                task_id,
                software,
            } => {
                let mut query = Self::publish_scope_query(
                    "MAX(source_version)",
                    *target,
                    *task_id,
                    software.as_deref(),
                );
                let max: Option<i64> = query.build_query_scalar().fetch_one(pool).await?;
                Ok(max.unwrap_or(0))
            }
        }
    }

    async fn max_iteration_for_version(
        pool: &SqlitePool,
        scope: &StreamScope,
        version: i64,
    ) -> Result<i64> {
        if version <= 0 {
            return Ok(0);
        }
        match scope {
            StreamScope::Scene { task_id, software } => {
                Ok(SceneVersion::max_iteration_for_version(pool, *task_id, software, version)
                    .await?)
            }
            StreamScope::Publish {
                target,
                task_id,
                software,
            } => {
                let mut query = Self::publish_scope_query(
                    "MAX(source_iteration)",
                    *target,
                    *task_id,
                    software.as_deref(),
                );
                query.push(" AND source_version = ");
                query.push_bind(version);
                let max: Option<i64> = query.build_query_scalar().fetch_one(pool).await?;
                Ok(max.unwrap_or(0))
            }
        }
    }

    fn publish_scope_query(
        aggregate: &str,
        target: TargetRef,
        task_id: Option<i64>,
        software: Option<&str>,
    ) -> QueryBuilder<'static, Sqlite> {
        let mut query =
            QueryBuilder::new(format!("SELECT {aggregate} FROM publishes WHERE target_kind = "));
        query.push_bind(target.kind.as_str());
        query.push(" AND target_id = ");
        query.push_bind(target.id);
        if let Some(task_id) = task_id {
            query.push(" AND task_id = ");
            query.push_bind(task_id);
        }
        if let Some(software) = software {
            query.push(" AND software = ");
            query.push_bind(software.to_ascii_lowercase());
        }
        query
    }
}

/// `v%03d` label used in artifact file names.
pub fn format_version_label(version: i64) -> String {
    format!("v{:03}", version.max(0))
}

/// `i%03d` label used in artifact file names.
pub fn format_iteration_label(iteration: i64) -> String {
    format!("i{:03}", iteration.max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bump_parsing() {
        assert_eq!("version".parse::<Bump>().unwrap(), Bump::Version);
        assert_eq!("Iteration".parse::<Bump>().unwrap(), Bump::Iteration);
        assert!("major".parse::<Bump>().is_err());
        assert_eq!(Bump::default(), Bump::Iteration);
    }

    #[test]
    fn test_labels() {
        assert_eq!(format_version_label(3), "v003");
        assert_eq!(format_iteration_label(12), "i012");
        assert_eq!(format_version_label(-1), "v000");
        assert_eq!(format_version_label(1234), "v1234");
    }
}
