//! # Observability Infrastructure
//!
//! Structured logging and Prometheus metrics for the Campeiro API. The
//! persisted audit trail lives in [`crate::audit`]; this module covers the
//! operator-facing signals.

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, log_config_info};
pub use metrics::{init_metrics, MetricsRecorder};

use crate::config::ObservabilityConfig;
use crate::errors::Result;
use ::tracing::info;

/// Initialize logging and, when a port is configured, the metrics exporter
pub fn init_observability(config: &ObservabilityConfig) -> Result<()> {
    init_logging(config)?;

    if config.metrics_bind_address().is_some() {
        init_metrics(config)?;
    }

    info!(
        service_name = %config.service_name,
        log_level = %config.log_level,
        json_logging = config.json_logging,
        metrics_enabled = config.metrics_bind_address().is_some(),
        "Observability initialized successfully"
    );

    Ok(())
}
