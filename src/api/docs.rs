use axum::Json;
use utoipa::{Modify, OpenApi};

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::handlers::health::health_handler,
        crate::api::handlers::auth::register_handler,
        crate::api::handlers::auth::login_handler,
        crate::api::handlers::auth::refresh_handler,
        crate::api::handlers::auth::logout_handler,
        crate::api::handlers::auth::revoke_all_sessions_handler,
        crate::api::handlers::audit_log::list_audit_logs,
        crate::api::handlers::audit_log::get_audit_log
    ),
    components(
        schemas(
            crate::api::handlers::health::HealthResponse,
            crate::api::handlers::auth::AuthResponseBody,
            crate::api::handlers::auth::RefreshResponseBody,
            crate::auth::RegisterRequest,
            crate::auth::LoginRequest,
            crate::auth::PublicUser,
            crate::auth::Role,
            crate::storage::AuditLogEntry,
            crate::storage::AuditLevel
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and refresh sessions"),
        (name = "audit", description = "Read access to the audit trail"),
        (name = "health", description = "Liveness")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};

        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}

/// Serve the OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
