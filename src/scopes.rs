//! # Query Scopes
//!
//! Chainable scope builder for publish queries, so the registry and the
//! rebuilder compose filters without hand-assembling SQL at every call
//! site.

use sqlx::sqlite::SqlitePool;
use sqlx::{QueryBuilder, Sqlite};

use crate::models::{PublishRecord, TargetRef};

/// Query builder for publish scopes.
pub struct PublishScope {
    query: QueryBuilder<'static, Sqlite>,
    has_conditions: bool,
}

impl PublishRecord {
    /// Start building a scoped query
    pub fn scope() -> PublishScope {
        PublishScope {
            query: QueryBuilder::new("SELECT publishes.* FROM publishes"),
            has_conditions: false,
        }
    }
}

impl PublishScope {
    fn push_condition_keyword(&mut self) {
        if self.has_conditions {
            self.query.push(" AND ");
        } else {
            self.query.push(" WHERE ");
            self.has_conditions = true;
        }
    }

    /// Scope: publishes against one target entity
    pub fn for_target(mut self, target: TargetRef) -> Self {
        self.push_condition_keyword();
        self.query.push("target_kind = ");
        self.query.push_bind(target.kind.as_str());
        self.query.push(" AND target_id = ");
        self.query.push_bind(target.id);
        self
    }

    /// Scope: publishes created against one task
    pub fn for_task(mut self, task_id: i64) -> Self {
        self.push_condition_keyword();
        self.query.push("task_id = ");
        self.query.push_bind(task_id);
        self
    }

    /// Scope: publishes belonging to one project
    pub fn for_project(mut self, project_id: i64) -> Self {
        self.push_condition_keyword();
        self.query.push("project_id = ");
        self.query.push_bind(project_id);
        self
    }

    /// Scope: publishes made from one software
    pub fn for_software(mut self, software: &str) -> Self {
        self.push_condition_keyword();
        self.query.push("software = ");
        self.query.push_bind(software.to_ascii_lowercase());
        self
    }

    /// Scope: only records carrying both artifact paths, i.e. the ones
    /// that participate in layer composition.
    pub fn with_asset_paths(mut self) -> Self {
        self.push_condition_keyword();
        self.query.push("item_path != '' AND asset_path != ''");
        self
    }

    /// Scope: only the current latest pointer of each stream
    pub fn latest_only(mut self) -> Self {
        self.push_condition_keyword();
        self.query.push("is_latest = 1");
        self
    }

    /// Order by stream rank, best first.
    pub fn order_by_rank(mut self) -> Self {
        self.query
            .push(" ORDER BY source_version DESC, source_iteration DESC, id DESC");
        self
    }

    /// Order by publish time, newest first.
    pub fn order_by_published(mut self) -> Self {
        self.query.push(" ORDER BY published_at DESC, id DESC");
        self
    }

    /// Build the final query and execute it
    pub async fn all(mut self, pool: &SqlitePool) -> Result<Vec<PublishRecord>, sqlx::Error> {
        self.query
            .build_query_as::<PublishRecord>()
            .fetch_all(pool)
            .await
    }

    /// Get a single result (first match)
    pub async fn first(mut self, pool: &SqlitePool) -> Result<Option<PublishRecord>, sqlx::Error> {
        self.query.push(" LIMIT 1");
        self.query
            .build_query_as::<PublishRecord>()
            .fetch_optional(pool)
            .await
    }
}
