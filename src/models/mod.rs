//! Data layer: publish records, components, dependency links, the legacy
//! scene stream, and the narrow entity views the engine resolves against.

pub mod component;
pub mod link;
pub mod publish;
pub mod scene_version;
pub mod target;
pub mod task;

pub use component::{ComponentType, NewComponent, PublishComponent};
pub use link::{LinkType, NewLink, VersionLink};
pub use publish::{NewPublish, PublishRecord, PublishStatus};
pub use scene_version::{NewSceneVersion, SceneVersion};
pub use target::{TargetKind, TargetRef};
pub use task::Task;
