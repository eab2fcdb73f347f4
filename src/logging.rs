//! # Structured Logging Module
//!
//! Environment-aware structured logging for long provisioning runs. Console
//! output is human readable by default and switches to JSON lines when
//! `CLOUD_DEPLOY_LOG_FORMAT=json`.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let layer = if json_output() {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A subscriber installed by the host process wins.
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json_output(),
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("CLOUD_DEPLOY_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

fn json_output() -> bool {
    std::env::var("CLOUD_DEPLOY_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for pipeline step transitions
pub fn log_step_operation(
    run_id: &str,
    step_index: usize,
    step_count: usize,
    step_name: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        run_id = %run_id,
        step = step_index,
        steps = step_count,
        step_name = %step_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔧 STEP_OPERATION"
    );
}

/// Log structured data for remote resource mutations
pub fn log_resource_operation(
    operation: &str,
    resource: &str,
    name: &str,
    project_id: Option<&str>,
    status: &str,
) {
    tracing::info!(
        operation = %operation,
        resource = %resource,
        name = %name,
        project_id = project_id,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "☁️ RESOURCE_OPERATION"
    );
}

/// Log structured error information
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_is_quieter_than_development() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("staging"), "debug");
    }

    #[test]
    fn initialization_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_step_operation("run", 1, 8, "project", "complete", None);
        log_resource_operation("create", "bucket", "assets", Some("demo-123456"), "reused");
        log_error("pipeline", "deploy", "boom", Some("test"));
    }
}
