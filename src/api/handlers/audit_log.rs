//! Audit log API handlers
//!
//! Admin-only read access to the audit trail. Entries are never created,
//! edited or deleted through the API.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use tracing::instrument;

use crate::{
    api::{error::ApiError, routes::ApiState},
    auth::AuthenticatedUser,
    storage::{AuditLogEntry, AuditLogFilters},
};

/// List audit entries, newest first
///
/// **Admin only**
#[utoipa::path(
    get,
    path = "/logs",
    params(AuditLogFilters),
    responses(
        (status = 200, description = "Audit entries, newest first", body = [AuditLogEntry]),
        (status = 400, description = "Invalid query parameters"),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin role required")
    ),
    security(("bearerAuth" = [])),
    tag = "audit"
)]
#[instrument(skip(state), fields(caller = %caller.id, level = ?filters.level))]
pub async fn list_audit_logs(
    State(state): State<ApiState>,
    Extension(caller): Extension<AuthenticatedUser>,
    WithRejection(Query(filters), _): WithRejection<Query<AuditLogFilters>, ApiError>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    let entries = state.audit_log.list(&filters).await?;
    Ok(Json(entries))
}

/// Fetch one audit entry
///
/// **Admin only**
#[utoipa::path(
    get,
    path = "/logs/{id}",
    params(("id" = i64, Path, description = "Audit entry id")),
    responses(
        (status = 200, description = "Audit entry", body = AuditLogEntry),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden - admin role required"),
        (status = 404, description = "No such entry")
    ),
    security(("bearerAuth" = [])),
    tag = "audit"
)]
#[instrument(skip(state), fields(caller = %caller.id))]
pub async fn get_audit_log(
    State(state): State<ApiState>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(id): Path<i64>,
) -> Result<Json<AuditLogEntry>, ApiError> {
    state
        .audit_log
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Audit log entry {} not found", id)))
}
