use std::collections::HashMap;

use crate::error::{PipelineError, Result};

/// Runtime settings for the engine: store location, pool sizing, the
/// allocation retry bound, and the shared-secret token for write calls.
///
/// Context always travels as an explicit value; nothing in the engine
/// reads ambient environment state after construction.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Upper bound on waiting for a pool connection, in milliseconds.
    pub acquire_timeout_ms: u64,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
    /// Bounded retries for the read-max-then-insert allocation loop.
    pub allocation_retry_limit: u32,
    /// Shared-secret token required on write calls; `None` disables the
    /// check (same-origin deployments).
    pub api_token: Option<String>,
    pub custom_settings: HashMap<String, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            acquire_timeout_ms: 5_000,
            busy_timeout_ms: 5_000,
            allocation_retry_limit: 5,
            api_token: None,
            custom_settings: HashMap::new(),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(db_url) = std::env::var("PIPELINE_DATABASE_URL") {
            config.database_url = db_url;
        } else if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(max_connections) = std::env::var("PIPELINE_MAX_CONNECTIONS") {
            config.max_connections = max_connections.parse().map_err(|e| {
                PipelineError::Configuration(format!("Invalid max_connections: {e}"))
            })?;
        }

        if let Ok(retry_limit) = std::env::var("PIPELINE_ALLOCATION_RETRY_LIMIT") {
            config.allocation_retry_limit = retry_limit.parse().map_err(|e| {
                PipelineError::Configuration(format!("Invalid allocation_retry_limit: {e}"))
            })?;
        }

        if let Ok(busy_timeout) = std::env::var("PIPELINE_BUSY_TIMEOUT_MS") {
            config.busy_timeout_ms = busy_timeout.parse().map_err(|e| {
                PipelineError::Configuration(format!("Invalid busy_timeout_ms: {e}"))
            })?;
        }

        if let Ok(token) = std::env::var("PIPELINE_API_TOKEN") {
            let token = token.trim().to_string();
            if !token.is_empty() {
                config.api_token = Some(token);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.allocation_retry_limit, 5);
        assert!(config.api_token.is_none());
    }
}
