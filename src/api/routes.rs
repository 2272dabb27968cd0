use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::audit::{record_http_exchange, AuditRecorder};
use crate::auth::{require_admin, require_auth, AuthGate, AuthService};
use crate::config::AppConfig;
use crate::context::establish_request_context;
use crate::storage::{AuditLogRepository, RecordStore};

use super::{
    docs,
    handlers::{
        get_audit_log, health_handler, list_audit_logs, login_handler, logout_handler,
        refresh_handler, register_handler, revoke_all_sessions_handler,
    },
};

/// Shared state of every handler
#[derive(Clone)]
pub struct ApiState {
    pub config: Arc<AppConfig>,
    /// Audited persistence client handed to business handlers
    pub store: Arc<dyn RecordStore>,
    pub auth: Arc<AuthService>,
    pub gate: AuthGate,
    pub audit_log: Arc<dyn AuditLogRepository>,
    pub recorder: AuditRecorder,
}

/// Every route, without the request-scoped layers
pub fn api_routes(state: &ApiState) -> Router<ApiState> {
    let auth_layer = middleware::from_fn_with_state(state.gate.clone(), require_auth);

    let public = Router::new()
        .route("/health", get(health_handler))
        .route("/api-docs/openapi.json", get(docs::openapi_json))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/logout", post(logout_handler));

    let authenticated = Router::new()
        .route("/auth/sessions/revoke-all", post(revoke_all_sessions_handler))
        .route_layer(auth_layer.clone());

    let admin = Router::new()
        .route("/logs", get(list_audit_logs))
        .route("/logs/{id}", get(get_audit_log))
        .route_layer(middleware::from_fn(require_admin))
        .route_layer(auth_layer);

    public.merge(authenticated).merge(admin)
}

/// Install the request context and HTTP audit layers around `routes`.
///
/// The context layer is outermost so the audit middleware, the auth
/// middleware and the handlers all see the same context.
pub fn with_request_layers(routes: Router<ApiState>, state: ApiState) -> Router {
    routes
        .layer(middleware::from_fn_with_state(state.recorder.clone(), record_http_exchange))
        .layer(middleware::from_fn(establish_request_context))
        .with_state(state)
}

pub fn build_router(state: ApiState) -> Router {
    let routes = api_routes(&state);
    with_request_layers(routes, state)
}
