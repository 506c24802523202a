//! # Structured Logging Module
//!
//! Environment-aware structured logging for tracing publish creation,
//! number allocation, and layer rebuild cascades.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(EnvFilter::new(log_level)),
        );

        // Use try_init to avoid panic if global subscriber already set
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("PIPELINE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for publish operations
pub fn log_publish_operation(
    operation: &str,
    publish_id: Option<i64>,
    task_id: Option<i64>,
    software: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        publish_id = publish_id,
        task_id = task_id,
        software = software,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "PUBLISH_OPERATION"
    );
}

/// Log structured data for layer rebuild operations
pub fn log_rebuild_operation(
    level: &str,
    layer_path: &str,
    child_count: usize,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        level = %level,
        layer_path = %layer_path,
        child_count = child_count,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "REBUILD_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
