//! # Service Facade
//!
//! The typed entry points a host process (CLI, DCC plugin, RPC shim)
//! calls into. Mutating operations require the shared-secret token when
//! one is configured; reads are open. The facade owns the composition
//! side effect: a publish record is durable before any layer is rewritten,
//! and layer trouble surfaces as a warning on the response, never as a
//! failure of the publish itself.

use serde::{Deserialize, Serialize};

use crate::composition::CompositionRebuilder;
use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::logging::log_error;
use crate::models::{NewSceneVersion, PublishRecord, SceneVersion, Task, VersionLink};
use crate::paths;
use crate::registry::{
    CreatePublishRequest, PartLatest, PublishFilters, PublishRegistry, PublishWithComponents,
};
use crate::versioning::{format_iteration_label, format_version_label, Bump, StreamScope};

/// What a create call hands back: the durable record, the derived part
/// coordinates, display labels, and any composition warning.
#[derive(Debug, Clone, Serialize)]
pub struct CreatePublishResponse {
    pub publish: PublishRecord,
    pub links: Vec<VersionLink>,
    pub part_name: String,
    pub part_usd_path: String,
    pub version_label: String,
    pub iteration_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuild_warning: Option<String>,
}

/// Listing shape selected by the request flags.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PublishListing {
    Records(Vec<PublishRecord>),
    Detailed(Vec<PublishWithComponents>),
    LatestPerPart(Vec<PartLatest>),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPublishesRequest {
    #[serde(flatten)]
    pub filters: PublishFilters,
    #[serde(default)]
    pub include_components: bool,
    #[serde(default)]
    pub latest_per_part: bool,
    #[serde(default)]
    pub asset: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneNextRequest {
    pub task_id: i64,
    pub software: String,
    #[serde(default)]
    pub bump: Bump,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordSceneRequest {
    pub task_id: i64,
    #[serde(default)]
    pub artist_id: Option<i64>,
    pub software: String,
    pub file_path: String,
    pub version: i64,
    pub iteration: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextNumbersResponse {
    pub version: i64,
    pub iteration: i64,
    pub version_label: String,
    pub iteration_label: String,
}

pub struct PublishApi {
    registry: PublishRegistry,
    rebuilder: CompositionRebuilder,
    token: Option<String>,
}

impl PublishApi {
    pub fn new(registry: PublishRegistry, config: &PipelineConfig) -> Self {
        let rebuilder = CompositionRebuilder::new(registry.clone());
        Self {
            registry,
            rebuilder,
            token: config.api_token.clone(),
        }
    }

    pub fn registry(&self) -> &PublishRegistry {
        &self.registry
    }

    fn authorize(&self, token: Option<&str>) -> Result<()> {
        match &self.token {
            None => Ok(()),
            Some(expected) if token == Some(expected.as_str()) => Ok(()),
            Some(_) => Err(PipelineError::Unauthorized(
                "missing or invalid token".to_string(),
            )),
        }
    }

    /// Create a publish, then rebuild the affected layer cascade. The
    /// record is committed before composition starts.
    pub async fn create_publish(
        &self,
        token: Option<&str>,
        request: &CreatePublishRequest,
    ) -> Result<CreatePublishResponse> {
        self.authorize(token)?;
        let publish = self.registry.create(request).await?;

        // The record is already committed; composition trouble is reported,
        // never propagated as a failure of the publish.
        let rebuild_warning = if publish.asset_path.is_empty() {
            None
        } else {
            match self.rebuilder.rebuild(&publish).await {
                Ok(warning) => warning,
                Err(e) => {
                    log_error("composition", "rebuild", &e.to_string(), None);
                    Some(e.to_string())
                }
            }
        };

        let (_, part_name) =
            paths::derive_asset_part(&publish.metadata, &publish.asset_path, &publish.item_path);
        let part_usd_path = if publish.asset_path.is_empty() {
            String::new()
        } else {
            paths::stable_part_path(&publish.asset_path, &part_name)
        };
        let links = VersionLink::for_source(self.registry.pool(), publish.id).await?;

        Ok(CreatePublishResponse {
            version_label: format_version_label(publish.source_version),
            iteration_label: format_iteration_label(publish.source_iteration),
            publish,
            links,
            part_name,
            part_usd_path,
            rebuild_warning,
        })
    }

    pub async fn list_publishes(&self, request: &ListPublishesRequest) -> Result<PublishListing> {
        if request.latest_per_part {
            let rows = self
                .registry
                .latest_per_part(&request.filters, request.asset.as_deref())
                .await?;
            return Ok(PublishListing::LatestPerPart(rows));
        }
        if request.include_components {
            let rows = self.registry.list_with_components(&request.filters).await?;
            return Ok(PublishListing::Detailed(rows));
        }
        Ok(PublishListing::Records(self.registry.list(&request.filters).await?))
    }

    /// Preview the numbers a publish into `scope` would take. Advisory
    /// only; the create path re-resolves under its own conflict handling.
    pub async fn next_numbers(&self, scope: &StreamScope, bump: Bump) -> Result<NextNumbersResponse> {
        let (version, iteration) = self.registry.next_numbers(scope, bump).await?;
        Ok(NextNumbersResponse {
            version,
            iteration,
            version_label: format_version_label(version),
            iteration_label: format_iteration_label(iteration),
        })
    }

    /// Scene files for a task and software, newest numbers first.
    pub async fn scenes(&self, task_id: i64, software: &str) -> Result<Vec<SceneVersion>> {
        let software = software.trim().to_ascii_lowercase();
        Ok(SceneVersion::fetch_for_task(self.registry.pool(), task_id, &software).await?)
    }

    /// Next numbers in the scene stream for a task and software.
    pub async fn scenes_next(&self, request: &SceneNextRequest) -> Result<NextNumbersResponse> {
        let software = request.software.trim().to_ascii_lowercase();
        if software.is_empty() {
            return Err(PipelineError::Validation("software is required".to_string()));
        }
        let scope = StreamScope::Scene {
            task_id: request.task_id,
            software,
        };
        self.next_numbers(&scope, request.bump).await
    }

    /// Record a saved scene file. Idempotent on the stream numbers: a
    /// repeat save of the same numbers replaces the stored path.
    pub async fn scenes_record(
        &self,
        token: Option<&str>,
        request: &RecordSceneRequest,
    ) -> Result<()> {
        self.authorize(token)?;
        let software = request.software.trim().to_ascii_lowercase();
        if software.is_empty() {
            return Err(PipelineError::Validation("software is required".to_string()));
        }
        if request.version < 1 || request.iteration < 1 {
            return Err(PipelineError::Validation(format!(
                "scene numbers must be >= 1, got v{} i{}",
                request.version, request.iteration
            )));
        }
        let task = Task::find_by_id(self.registry.pool(), request.task_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("task {}", request.task_id)))?;
        let artist_id = request.artist_id.or(task.artist_id).ok_or_else(|| {
            PipelineError::Validation(format!(
                "task {} has no artist; supply artist_id",
                task.id
            ))
        })?;

        SceneVersion::upsert(
            self.registry.pool(),
            &NewSceneVersion {
                task_id: request.task_id,
                artist_id,
                software,
                file_path: paths::normalize_separators(&request.file_path),
                version: request.version,
                iteration: request.iteration,
            },
        )
        .await?;
        Ok(())
    }
}
