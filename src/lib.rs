//! # Pipeline Core
//!
//! Publish versioning and hierarchical layer composition for a
//! show / sequence / shot production pipeline.
//!
//! ## Architecture
//!
//! - **Versioning**: monotonic (version, iteration) allocation over two
//!   numbering scopes, the per-task scene stream and the per-target
//!   publish stream
//! - **Registry**: durable publish records with components and dependency
//!   links, one mutable `is_latest` pointer per stream, allocation made
//!   race-safe by a unique index plus bounded retry
//! - **Paths**: parsing of the conventional task workspace layout into
//!   hierarchy coordinates
//! - **Composition**: deterministic regeneration of the asset, artist,
//!   department, shot and sequence USD layers after every publish
//! - **Api**: the typed facade host processes call, with shared-secret
//!   authorization on mutations
//!
//! ## Example
//!
//! ```rust,no_run
//! use pipeline_core::api::PublishApi;
//! use pipeline_core::config::PipelineConfig;
//! use pipeline_core::database::{DatabaseConnection, DatabaseMigrations};
//! use pipeline_core::registry::PublishRegistry;
//!
//! # async fn example() -> pipeline_core::error::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let connection = DatabaseConnection::connect(&config).await?;
//! DatabaseMigrations::run_all(connection.pool()).await?;
//! let registry = PublishRegistry::new(connection.pool().clone(), &config);
//! let api = PublishApi::new(registry, &config);
//! # let _ = api;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod composition;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod paths;
pub mod registry;
pub mod scopes;
pub mod versioning;

pub use api::PublishApi;
pub use composition::{CompositionRebuilder, LayerWriter};
pub use config::PipelineConfig;
pub use database::{DatabaseConnection, DatabaseMigrations};
pub use error::{PipelineError, Result};
pub use models::{
    ComponentType, LinkType, NewComponent, NewLink, PublishComponent, PublishRecord,
    PublishStatus, SceneVersion, TargetKind, TargetRef, VersionLink,
};
pub use registry::{CreatePublishRequest, PublishFilters, PublishRegistry};
pub use versioning::{Bump, StreamScope, VersionAllocator};
