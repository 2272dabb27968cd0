//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.
//!
//! `RUST_LOG` wins when set; otherwise the configured `LOG_LEVEL` is used as
//! the default directive. JSON output is enabled with `LOG_JSON=true`.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{CampeiroError, Result};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Create a tracing span for request tracking.
///
/// The request id is supplied by the caller so the span, the `x-request-id`
/// response header and the request context all agree.
///
/// ```rust,ignore
/// let span = request_span!("GET", "/auth/login", request_id);
/// ```
#[macro_export]
macro_rules! request_span {
    ($method:expr, $path:expr, $request_id:expr) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %$request_id,
            user_id = tracing::field::Empty
        )
    };
    ($method:expr, $path:expr, $request_id:expr, $($field:tt)*) => {
        tracing::info_span!(
            "http_request",
            method = %$method,
            path = %$path,
            request_id = %$request_id,
            user_id = tracing::field::Empty,
            $($field)*
        )
    };
}

/// Create a tracing span for storage operations.
///
/// ```rust,ignore
/// let span = db_span!("update_many", model = "sessions");
/// ```
#[macro_export]
macro_rules! db_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "db_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global tracing subscriber.
///
/// Returns an error if a subscriber is already installed, which integration
/// tests treat as benign.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            CampeiroError::config(format!("Invalid log level '{}': {}", config.log_level, e))
        })?,
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if config.json_logging {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
    };

    installed.map_err(|e| CampeiroError::config(format!("Failed to install subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        environment = %config.environment,
        server_address = %config.server.bind_address(),
        database_type = "sqlite",
        auto_migrate = config.database.auto_migrate,
        access_token_ttl_seconds = config.auth.access_token_ttl_seconds,
        refresh_session_days = config.auth.refresh_session_days,
        cookie_domain = %config.auth.cookie_domain,
        metrics_enabled = config.observability.metrics_bind_address().is_some(),
        "Campeiro API configuration"
    );
}
