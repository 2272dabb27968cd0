//! HTTP request handlers organized by resource type

pub mod audit_log;
pub mod auth;
pub mod health;

pub use audit_log::{get_audit_log, list_audit_logs};
pub use auth::{
    login_handler, logout_handler, refresh_handler, register_handler,
    revoke_all_sessions_handler, AuthResponseBody, RefreshResponseBody, REFRESH_COOKIE_NAME,
};
pub use health::{health_handler, HealthResponse};
