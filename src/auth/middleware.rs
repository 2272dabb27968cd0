//! Axum middleware for authentication and authorization.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Extension, State},
    http::{header::AUTHORIZATION, HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::api::error::ApiError;
use crate::auth::jwt::TokenService;
use crate::auth::models::{AuthenticatedUser, Role};
use crate::config::Environment;
use crate::context;
use crate::errors::AuthErrorType;

pub const TEST_USER_ID_HEADER: &str = "x-test-user-id";
pub const TEST_ROLE_HEADER: &str = "x-test-role";
pub const DEFAULT_TEST_USER_ID: &str = "b05fb3d1-3d58-4c2a-9cde-7b5a8a0f0aaa";

/// What the authentication middleware needs to resolve a caller
#[derive(Clone)]
pub struct AuthGate {
    tokens: Arc<TokenService>,
    environment: Environment,
}

impl AuthGate {
    pub fn new(tokens: Arc<TokenService>, environment: Environment) -> Self {
        Self { tokens, environment }
    }

    /// Resolve the caller from request headers
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthenticatedUser, ApiError> {
        if self.environment.is_test() {
            if let Some(user) = test_identity(headers)? {
                return Ok(user);
            }
        }

        let token = bearer_token(headers)?;
        let claims = self.tokens.verify_access(token).map_err(|err| {
            let reason = err.auth_error_type().unwrap_or(AuthErrorType::InvalidToken);
            ApiError::unauthorized("invalid token", reason)
        })?;
        Ok(AuthenticatedUser::new(claims.sub, claims.role))
    }
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("not authenticated", AuthErrorType::MissingToken))?;

    match header.strip_prefix("Bearer ").map(str::trim) {
        Some(token) if !token.is_empty() => Ok(token),
        _ => Err(ApiError::unauthorized("not authenticated", AuthErrorType::MissingToken)),
    }
}

/// Identity injected by test harnesses; only consulted in the test environment.
fn test_identity(headers: &HeaderMap) -> Result<Option<AuthenticatedUser>, ApiError> {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    let (user_id, role) = (header(TEST_USER_ID_HEADER), header(TEST_ROLE_HEADER));
    if user_id.is_none() && role.is_none() {
        return Ok(None);
    }

    let role = match role {
        Some(raw) => raw.parse::<Role>().map_err(|err| ApiError::bad_request(err.to_string()))?,
        None => Role::Admin,
    };
    let user_id = user_id.unwrap_or(DEFAULT_TEST_USER_ID);
    debug!(user_id, role = %role, "using injected test identity");
    Ok(Some(AuthenticatedUser::new(user_id, role)))
}

/// Require a valid access token and expose the caller as an [`AuthenticatedUser`] extension.
pub async fn require_auth(
    State(gate): State<AuthGate>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    match gate.authenticate(request.headers()) {
        Ok(user) => {
            context::annotate_user(&user.id);
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(err) => {
            warn!(path = %request.uri().path(), error = ?err, "authentication failed");
            Err(err)
        }
    }
}

/// Require the authenticated caller to be an administrator. Runs after [`require_auth`].
pub async fn require_admin(
    Extension(user): Extension<AuthenticatedUser>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    if user.has_role(Role::Admin) {
        return Ok(next.run(request).await);
    }

    warn!(user_id = %user.id, role = %user.role, required = %Role::Admin, "role check failed");
    Err(ApiError::forbidden("forbidden"))
}
