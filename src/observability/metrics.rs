//! # Metrics Collection
//!
//! Prometheus metrics for authentication, sessions and the audit pipeline.

use crate::config::ObservabilityConfig;
use crate::errors::{CampeiroError, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Metrics recorder that tracks application metrics
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorder;

impl MetricsRecorder {
    /// Create a new metrics recorder instance
    pub fn new() -> Self {
        Self
    }

    /// Record a completed HTTP exchange
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration: f64) {
        counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "path" => normalize_path_for_metrics(path),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            "http_request_duration_seconds",
            "method" => method.to_string(),
            "path" => normalize_path_for_metrics(path)
        )
        .record(duration);
    }

    /// Record authentication attempt outcome
    pub fn record_authentication(&self, status: &str) {
        let labels = [("status", status.to_string())];
        counter!("auth_authentications_total", &labels).increment(1);
    }

    /// Record a session lifecycle event (created, rotated, revoked, rejected)
    pub fn record_session_event(&self, event: &str) {
        let labels = [("event", event.to_string())];
        counter!("auth_session_events_total", &labels).increment(1);
    }

    /// Record an audit write attempt
    pub fn record_audit_write(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        let labels = [("status", status.to_string())];
        counter!("audit_writes_total", &labels).increment(1);
    }

    /// Register baseline metrics so Prometheus exports appear before events occur.
    pub fn register_metrics(&self) {
        describe_counter!(
            "auth_authentications_total",
            Unit::Count,
            "Authentication attempts grouped by outcome"
        );
        describe_counter!(
            "auth_session_events_total",
            Unit::Count,
            "Refresh session lifecycle events"
        );
        describe_counter!("audit_writes_total", Unit::Count, "Audit log writes grouped by outcome");
        describe_counter!("http_requests_total", Unit::Count, "Completed HTTP exchanges");
        describe_histogram!(
            "http_request_duration_seconds",
            Unit::Seconds,
            "Duration of HTTP exchanges until the response body finished"
        );

        for status in ["success", "failure"] {
            counter!("auth_authentications_total", "status" => status).absolute(0);
        }
        for event in ["created", "rotated", "revoked", "rejected"] {
            counter!("auth_session_events_total", "event" => event).absolute(0);
        }
        counter!("audit_writes_total", "status" => "success").absolute(0);
        counter!("audit_writes_total", "status" => "error").absolute(0);
    }
}

/// Global metrics recorder instance
static METRICS: OnceLock<MetricsRecorder> = OnceLock::new();

/// Initialize metrics collection and Prometheus exporter
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        CampeiroError::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| {
            CampeiroError::config(format!("Failed to initialize metrics exporter: {}", e))
        })?;

    let recorder = METRICS.get_or_init(MetricsRecorder::new);
    recorder.register_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}

/// Get the global metrics recorder
pub fn get_metrics() -> Option<&'static MetricsRecorder> {
    METRICS.get()
}

/// Record an HTTP exchange using the global metrics recorder
pub fn record_http_request(method: &str, path: &str, status: u16, duration: f64) {
    if let Some(metrics) = get_metrics() {
        metrics.record_http_request(method, path, status, duration);
    }
}

/// Record authentication attempt outcome via the global recorder
pub fn record_authentication(status: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_authentication(status);
    }
}

/// Record a session lifecycle event via the global recorder
pub fn record_session_event(event: &str) {
    if let Some(metrics) = get_metrics() {
        metrics.record_session_event(event);
    }
}

/// Record an audit write outcome via the global recorder
pub fn record_audit_write(success: bool) {
    if let Some(metrics) = get_metrics() {
        metrics.record_audit_write(success);
    }
}

/// Replace id-like path segments so label cardinality stays bounded.
pub fn normalize_path_for_metrics(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_uuid = segment.len() == 36
                && segment.chars().all(|c| c.is_ascii_hexdigit() || c == '-');
            let is_numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());
            if is_uuid || is_numeric {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
