//! # Publish Registry
//!
//! Persists publish records, their components and dependency links, and
//! maintains the single mutable "latest" pointer per stream. Every create
//! is one durable transaction; layer rebuild side effects happen outside
//! that transaction's failure domain.
//!
//! Number allocation uses read-max-then-insert, which is unsafe on its
//! own under concurrency. Safety comes from the unique stream-numbers
//! index: a racing duplicate insert fails with a constraint error and the
//! loop re-queries and re-attempts, bounded by the configured retry
//! limit. Duplicate numbers are structurally impossible, not merely
//! unlikely.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePool;

use crate::config::PipelineConfig;
use crate::error::{is_retryable_conflict, is_unique_violation, PipelineError, Result};
use crate::logging::log_publish_operation;
use crate::models::{
    NewComponent, NewLink, NewPublish, PublishComponent, PublishRecord, PublishStatus, TargetKind,
    TargetRef, Task, VersionLink,
};
use crate::paths;
use crate::scopes::PublishScope;
use crate::versioning::{Bump, StreamScope, VersionAllocator};

/// A fully-tagged publish request. Unknown fields and unknown enum values
/// are rejected at deserialization rather than defaulted silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePublishRequest {
    #[serde(default)]
    pub task_id: Option<i64>,
    #[serde(default)]
    pub target_kind: Option<TargetKind>,
    #[serde(default)]
    pub target_id: Option<i64>,
    pub software: String,
    #[serde(default)]
    pub source_version: Option<i64>,
    #[serde(default)]
    pub source_iteration: Option<i64>,
    #[serde(default)]
    pub bump: Bump,
    #[serde(default)]
    pub item_path: Option<String>,
    #[serde(default, alias = "part_path")]
    pub asset_path: Option<String>,
    #[serde(default)]
    pub preview_path: Option<String>,
    #[serde(default)]
    pub status: Option<PublishStatus>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub components: Vec<NewComponent>,
    #[serde(default)]
    pub links: Vec<NewLink>,
}

/// Filters shared by the list and latest-per-part queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublishFilters {
    #[serde(default)]
    pub target_kind: Option<TargetKind>,
    #[serde(default)]
    pub target_id: Option<i64>,
    #[serde(default)]
    pub task_id: Option<i64>,
    #[serde(default)]
    pub project_id: Option<i64>,
    #[serde(default)]
    pub software: Option<String>,
    /// Restrict to records currently holding their stream's pointer.
    #[serde(default)]
    pub latest_only: bool,
}

impl PublishFilters {
    fn apply(&self, mut scope: PublishScope) -> Result<PublishScope> {
        match (self.target_kind, self.target_id) {
            (Some(kind), Some(id)) => scope = scope.for_target(TargetRef::new(kind, id)),
            (None, None) => {}
            _ => {
                return Err(PipelineError::Validation(
                    "target_kind and target_id must be supplied together".to_string(),
                ))
            }
        }
        if let Some(task_id) = self.task_id {
            scope = scope.for_task(task_id);
        }
        if let Some(project_id) = self.project_id {
            scope = scope.for_project(project_id);
        }
        if let Some(software) = &self.software {
            scope = scope.for_software(software);
        }
        if self.latest_only {
            scope = scope.latest_only();
        }
        Ok(scope)
    }
}

/// One row of a latest-per-part aggregation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartLatest {
    pub part_name: String,
    pub part_usd_path: String,
    pub publish_id: i64,
    pub asset_name: String,
}

/// A record with its nested components, for `include_components` listings.
#[derive(Debug, Clone, Serialize)]
pub struct PublishWithComponents {
    #[serde(flatten)]
    pub record: PublishRecord,
    pub components: Vec<PublishComponent>,
}

#[derive(Clone)]
pub struct PublishRegistry {
    pool: SqlitePool,
    retry_limit: u32,
}

impl PublishRegistry {
    pub fn new(pool: SqlitePool, config: &PipelineConfig) -> Self {
        Self {
            pool,
            retry_limit: config.allocation_retry_limit.max(1),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a publish: validate, resolve numbers, persist the record
    /// plus components and links, and recompute the stream's latest
    /// pointer, all in one transaction.
    pub async fn create(&self, request: &CreatePublishRequest) -> Result<PublishRecord> {
        let software = request.software.trim().to_ascii_lowercase();
        if software.is_empty() {
            return Err(PipelineError::Validation("software is required".to_string()));
        }

        let item_path = paths::normalize_separators(request.item_path.as_deref().unwrap_or(""));
        let asset_path = paths::normalize_separators(request.asset_path.as_deref().unwrap_or(""));
        if item_path.is_empty() != asset_path.is_empty() {
            return Err(PipelineError::Validation(
                "item_path and asset_path must be supplied together or not at all".to_string(),
            ));
        }

        let task = match request.task_id {
            Some(task_id) => Some(
                Task::find_by_id(&self.pool, task_id)
                    .await?
                    .ok_or_else(|| PipelineError::NotFound(format!("task {task_id}")))?,
            ),
            None => None,
        };

        let target = self.resolve_target(request, task.as_ref()).await?;
        let project_id = task.as_ref().and_then(|t| t.project_id).or_else(|| {
            if target.kind == TargetKind::Project {
                Some(target.id)
            } else {
                None
            }
        });

        let explicit = match (request.source_version, request.source_iteration) {
            (Some(version), Some(iteration)) => {
                if version < 1 || iteration < 1 {
                    return Err(PipelineError::Validation(format!(
                        "source numbers must be >= 1, got v{version} i{iteration}"
                    )));
                }
                Some((version, iteration))
            }
            (None, None) => None,
            _ => {
                return Err(PipelineError::Validation(
                    "source_version and source_iteration must be supplied together".to_string(),
                ))
            }
        };

        for link in &request.links {
            if PublishRecord::find_by_id(&self.pool, link.target_publish_id)
                .await?
                .is_none()
            {
                return Err(PipelineError::NotFound(format!(
                    "link target publish {}",
                    link.target_publish_id
                )));
            }
        }

        let scope = StreamScope::Publish {
            target,
            task_id: request.task_id,
            software: Some(software.clone()),
        };

        let mut attempt: u32 = 0;
        loop {
            let (version, iteration) = match explicit {
                Some(pair) => pair,
                None => VersionAllocator::next(&self.pool, &scope, request.bump).await?,
            };

            let label = request
                .label
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("s{version:03}-i{iteration:03}"));

            let new = NewPublish {
                project_id,
                target,
                task_id: request.task_id,
                software: software.clone(),
                source_version: version,
                source_iteration: iteration,
                label,
                status: request.status.unwrap_or(PublishStatus::Pending),
                item_path: item_path.clone(),
                asset_path: asset_path.clone(),
                preview_path: paths::normalize_separators(
                    request.preview_path.as_deref().unwrap_or(""),
                ),
                comment: request.comment.clone().unwrap_or_default(),
                metadata: request.metadata.clone().unwrap_or_else(|| serde_json::json!({})),
            };

            let mut tx = self.pool.begin().await?;
            let publish_id = match PublishRecord::insert_tx(&mut tx, &new).await {
                Ok(id) => id,
                Err(e) if is_retryable_conflict(&e) => {
                    drop(tx);
                    // Explicit numbers hitting the unique index are a real
                    // duplicate, not contention; retrying would silently
                    // change numbers the caller asked for by name.
                    if explicit.is_some() && is_unique_violation(&e) {
                        return Err(PipelineError::Conflict(format!(
                            "numbers v{version} i{iteration} already exist for stream {target}/{software}"
                        )));
                    }
                    attempt += 1;
                    if attempt >= self.retry_limit {
                        return Err(PipelineError::Conflict(format!(
                            "allocation retries exhausted after {attempt} attempts for stream {target}/{software}"
                        )));
                    }
                    tracing::debug!(
                        target = %target,
                        software = %software,
                        attempt = attempt,
                        "allocation conflict, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            for component in &request.components {
                PublishComponent::insert_tx(&mut tx, publish_id, component).await?;
            }
            for link in &request.links {
                VersionLink::insert_tx(&mut tx, publish_id, link).await?;
            }
            PublishRecord::refresh_latest_pointer(&mut tx, target, request.task_id, &software)
                .await?;
            tx.commit().await?;

            log_publish_operation(
                "create",
                Some(publish_id),
                request.task_id,
                Some(&software),
                "committed",
                None,
            );

            return PublishRecord::find_by_id(&self.pool, publish_id)
                .await?
                .ok_or_else(|| {
                    PipelineError::NotFound(format!("publish {publish_id} after create"))
                });
        }
    }

    async fn resolve_target(
        &self,
        request: &CreatePublishRequest,
        task: Option<&Task>,
    ) -> Result<TargetRef> {
        let target = match (request.target_kind, request.target_id) {
            (Some(kind), Some(id)) => {
                if id < 1 {
                    return Err(PipelineError::Validation(format!(
                        "target id must be positive, got {id}"
                    )));
                }
                TargetRef::new(kind, id)
            }
            (None, None) => {
                // No explicit target: fall back to the task's project.
                let task = task.ok_or_else(|| {
                    PipelineError::Validation(
                        "either a target or a task is required".to_string(),
                    )
                })?;
                let project_id = task.project_id.ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "task {} has no project; supply an explicit target",
                        task.id
                    ))
                })?;
                TargetRef::new(TargetKind::Project, project_id)
            }
            _ => {
                return Err(PipelineError::Validation(
                    "target_kind and target_id must be supplied together".to_string(),
                ))
            }
        };

        if !target.exists(&self.pool).await? {
            return Err(PipelineError::NotFound(format!("target {target}")));
        }
        Ok(target)
    }

    /// List publish records matching the filters, newest first.
    pub async fn list(&self, filters: &PublishFilters) -> Result<Vec<PublishRecord>> {
        let scope = filters.apply(PublishRecord::scope())?.order_by_published();
        Ok(scope.all(&self.pool).await?)
    }

    /// List with nested components.
    pub async fn list_with_components(
        &self,
        filters: &PublishFilters,
    ) -> Result<Vec<PublishWithComponents>> {
        let records = self.list(filters).await?;
        let mut detailed = Vec::with_capacity(records.len());
        for record in records {
            let components = PublishComponent::for_publish(&self.pool, record.id).await?;
            detailed.push(PublishWithComponents { record, components });
        }
        Ok(detailed)
    }

    /// One row per distinct (asset, part) key in scope, each referencing
    /// the highest-ranked record's stable path, sorted by part name.
    pub async fn latest_per_part(
        &self,
        filters: &PublishFilters,
        asset: Option<&str>,
    ) -> Result<Vec<PartLatest>> {
        let scope = filters
            .apply(PublishRecord::scope())?
            .with_asset_paths()
            .order_by_rank();
        let records = scope.all(&self.pool).await?;

        let mut winners: HashMap<(String, String), PartLatest> = HashMap::new();
        for record in &records {
            let (asset_name, part_name) =
                paths::derive_asset_part(&record.metadata, &record.asset_path, &record.item_path);
            if let Some(wanted) = asset {
                if !asset_name.eq_ignore_ascii_case(wanted) {
                    continue;
                }
            }
            let key = (
                asset_name.to_ascii_lowercase(),
                part_name.to_ascii_lowercase(),
            );
            // Records arrive best-rank first; the first hit per key wins.
            winners.entry(key).or_insert_with(|| PartLatest {
                part_usd_path: paths::stable_part_path(&record.asset_path, &part_name),
                part_name,
                publish_id: record.id,
                asset_name,
            });
        }

        let mut rows: Vec<PartLatest> = winners.into_values().collect();
        rows.sort_by(|a, b| {
            a.part_name
                .cmp(&b.part_name)
                .then_with(|| a.asset_name.cmp(&b.asset_name))
        });
        Ok(rows)
    }

    /// The record currently holding the pointer for the filtered scope,
    /// best rank first when several streams match.
    pub async fn latest(&self, filters: &PublishFilters) -> Result<Option<PublishRecord>> {
        let scope = filters
            .apply(PublishRecord::scope())?
            .latest_only()
            .order_by_rank();
        Ok(scope.first(&self.pool).await?)
    }

    /// Thin wrapper over the allocator scoped to this registry's storage.
    pub async fn next_numbers(&self, scope: &StreamScope, bump: Bump) -> Result<(i64, i64)> {
        VersionAllocator::next(&self.pool, scope, bump).await
    }

    /// Every record that can participate in layer composition.
    pub(crate) async fn composition_candidates(&self) -> Result<Vec<PublishRecord>> {
        Ok(PublishRecord::scope()
            .with_asset_paths()
            .order_by_rank()
            .all(&self.pool)
            .await?)
    }
}
