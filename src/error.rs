//! Structured error handling for the publish engine.
//!
//! The taxonomy separates synchronous rejections (validation, lookup
//! failures) from internal races that are retried before surfacing, and
//! from the non-fatal filesystem/path conditions that become warnings on
//! an otherwise successful publish.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed or missing required fields; the publish is never created.
    #[error("validation error: {0}")]
    Validation(String),

    /// Unknown task, target, or publish id; the publish is never created.
    #[error("not found: {0}")]
    NotFound(String),

    /// Two allocators raced for the same numbers and retries were
    /// exhausted. Transient; the caller may retry.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The store is unavailable or rejected the operation. Aborts the
    /// whole publish with no partial state.
    #[error("persistence error: {0}")]
    Persistence(#[from] sqlx::Error),

    /// A path does not match the expected convention. Non-fatal: the
    /// rebuild is skipped and a warning is attached to the response.
    #[error("path parse error: {0}")]
    PathParse(String),

    /// A composition layer could not be written. Non-fatal per level.
    #[error("filesystem error at {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Shared-secret token missing or wrong.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed environment or settings value.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl PipelineError {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Filesystem {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A unique-constraint hit: another writer already holds these numbers.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}

/// Whether a store error is worth re-attempting inside the allocation
/// retry loop: a unique-constraint hit (another writer took the numbers
/// first) or a lock contention timeout.
pub(crate) fn is_retryable_conflict(err: &sqlx::Error) -> bool {
    if is_unique_violation(err) {
        return true;
    }
    match err {
        sqlx::Error::Database(db) => db.message().contains("database is locked"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::Validation("software is required".to_string());
        assert_eq!(err.to_string(), "validation error: software is required");

        let err = PipelineError::Conflict("allocation retries exhausted".to_string());
        assert!(err.to_string().starts_with("conflict:"));
    }

    #[test]
    fn test_filesystem_error_carries_path() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = PipelineError::filesystem("/shared/usd/shot/0020.usd", io);
        assert!(err.to_string().contains("/shared/usd/shot/0020.usd"));
    }
}
