//! Fire-and-forget persistence of audit entries.
//!
//! Each entry is tagged with the request context current at the time of the
//! call and written on a background task. Sink failures are logged and
//! discarded; callers never observe them.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::task::TaskTracker;
use tracing::{debug, warn, Instrument};

use crate::audit::redaction::mask_sensitive;
use crate::context::{self, ContextSnapshot, RequestContext};
use crate::observability::metrics;
use crate::storage::{AuditLevel, AuditLogRepository, NewAuditLogEntry};

/// User id recorded when no user is attributed to the request
pub const ANONYMOUS_USER_ID: &str = "00000000-0000-0000-0000-000000000000";
/// Address recorded when the caller address is unknown
pub const UNKNOWN_IP: &str = "unknown";

#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditLogRepository>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder").field("pending", &self.tracker.len()).finish()
    }
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditLogRepository>) -> Self {
        Self { sink, tracker: TaskTracker::new() }
    }

    /// Record an entry tagged with the current request context
    pub fn record(&self, level: AuditLevel, event: &str, detail: Value) {
        let snapshot = context::current_snapshot();
        self.submit(build_entry(snapshot, level, event, detail));
    }

    /// Record an entry tagged with an explicitly held context.
    ///
    /// For code running after the request scope has ended, such as response
    /// body completion.
    pub fn record_with_context(
        &self,
        ctx: Option<&RequestContext>,
        level: AuditLevel,
        event: &str,
        detail: Value,
    ) {
        let snapshot = ctx.map(RequestContext::snapshot);
        self.submit(build_entry(snapshot, level, event, detail));
    }

    pub fn info(&self, event: &str, detail: Value) {
        self.record(AuditLevel::Info, event, detail);
    }

    pub fn warn(&self, event: &str, detail: Value) {
        self.record(AuditLevel::Warn, event, detail);
    }

    pub fn error(&self, event: &str, detail: Value) {
        self.record(AuditLevel::Error, event, detail);
    }

    /// Entries submitted but not yet written
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Wait until every entry submitted so far has been written or dropped
    pub async fn flush(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    fn submit(&self, entry: NewAuditLogEntry) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(level = %entry.level, "no runtime available, dropping audit entry");
            metrics::record_audit_write(false);
            return;
        };

        let sink = Arc::clone(&self.sink);
        let task = async move {
            match sink.record(entry).await {
                Ok(id) => {
                    metrics::record_audit_write(true);
                    debug!(audit_id = id, "audit entry written");
                }
                Err(err) => {
                    metrics::record_audit_write(false);
                    warn!(error = %err, "failed to write audit entry");
                }
            }
        };
        self.tracker.spawn_on(task.in_current_span(), &handle);
    }
}

fn build_entry(
    snapshot: Option<ContextSnapshot>,
    level: AuditLevel,
    event: &str,
    mut detail: Value,
) -> NewAuditLogEntry {
    mask_sensitive(&mut detail);

    let user_id = snapshot
        .as_ref()
        .and_then(|ctx| ctx.user_id.clone())
        .unwrap_or_else(|| ANONYMOUS_USER_ID.to_string());
    let ip_address =
        snapshot.as_ref().and_then(|ctx| ctx.ip.clone()).unwrap_or_else(|| UNKNOWN_IP.to_string());
    let message = json!({ "event": event, "detail": detail, "context": snapshot });

    NewAuditLogEntry { level, message: message.to_string(), user_id, ip_address }
}
