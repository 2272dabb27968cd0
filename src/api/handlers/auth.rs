use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar, SameSite},
    WithRejection,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::api::error::ApiError;
use crate::api::routes::ApiState;
use crate::auth::{
    AuthOutcome, AuthenticatedUser, ClientInfo, IssuedSession, LoginRequest, PublicUser,
    RegisterRequest,
};

/// Name of the cookie carrying the refresh token
pub const REFRESH_COOKIE_NAME: &str = "rtok";
/// The refresh cookie is only sent to the auth endpoints
pub const REFRESH_COOKIE_PATH: &str = "/auth";

/// Body returned by register and login.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponseBody {
    pub user: PublicUser,
    pub access_token: String,
    pub session_id: String,
}

/// Body returned by refresh.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponseBody {
    pub access_token: String,
    pub session_id: String,
}

/// JSON body plus the refresh cookie to set or clear
pub struct WithRefreshCookie<T> {
    status: StatusCode,
    body: Option<T>,
    cookie: Cookie<'static>,
}

impl<T: Serialize> IntoResponse for WithRefreshCookie<T> {
    fn into_response(self) -> Response {
        let mut response = match self.body {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        };

        if let Ok(cookie_value) = self.cookie.to_string().parse() {
            response.headers_mut().append(header::SET_COOKIE, cookie_value);
        }

        response
    }
}

fn refresh_cookie(state: &ApiState, value: String, expires_at: DateTime<Utc>) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, value))
        .domain(state.config.auth.cookie_domain.clone())
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(state.config.environment.is_production())
        .same_site(SameSite::Lax)
        .expires(time::OffsetDateTime::from_unix_timestamp(expires_at.timestamp()).ok())
        .into()
}

fn cleared_refresh_cookie(state: &ApiState) -> Cookie<'static> {
    Cookie::build((REFRESH_COOKIE_NAME, ""))
        .domain(state.config.auth.cookie_domain.clone())
        .path(REFRESH_COOKIE_PATH)
        .http_only(true)
        .secure(state.config.environment.is_production())
        .same_site(SameSite::Lax)
        .max_age(time::Duration::ZERO)
        .expires(time::OffsetDateTime::UNIX_EPOCH)
        .into()
}

fn session_response(
    state: &ApiState,
    status: StatusCode,
    outcome: AuthOutcome,
) -> WithRefreshCookie<AuthResponseBody> {
    let AuthOutcome { user, issued } = outcome;
    let cookie = refresh_cookie(state, issued.refresh_token, issued.session.expires_at);
    WithRefreshCookie {
        status,
        body: Some(AuthResponseBody {
            user,
            access_token: issued.access_token,
            session_id: issued.session.id,
        }),
        cookie,
    }
}

fn refresh_token(jar: &CookieJar) -> Option<&str> {
    jar.get(REFRESH_COOKIE_NAME).map(Cookie::value).filter(|value| !value.is_empty())
}

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created and session opened", body = AuthResponseBody),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Email already registered")
    ),
    tag = "auth"
)]
pub async fn register_handler(
    State(state): State<ApiState>,
    WithRejection(Json(payload), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> Result<WithRefreshCookie<AuthResponseBody>, ApiError> {
    let outcome = state.auth.register(payload, &ClientInfo::from_current_request()).await?;
    Ok(session_response(&state, StatusCode::CREATED, outcome))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = AuthResponseBody),
        (status = 400, description = "Validation error"),
        (status = 401, description = "Invalid email or password")
    ),
    tag = "auth"
)]
pub async fn login_handler(
    State(state): State<ApiState>,
    WithRejection(Json(payload), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> Result<WithRefreshCookie<AuthResponseBody>, ApiError> {
    let outcome = state.auth.login(payload, &ClientInfo::from_current_request()).await?;
    Ok(session_response(&state, StatusCode::OK, outcome))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Session rotated", body = RefreshResponseBody),
        (status = 401, description = "Missing or invalid refresh session")
    ),
    tag = "auth"
)]
pub async fn refresh_handler(
    State(state): State<ApiState>,
    jar: CookieJar,
) -> Result<WithRefreshCookie<RefreshResponseBody>, ApiError> {
    let IssuedSession { session, access_token, refresh_token: rotated } = state
        .auth
        .refresh(refresh_token(&jar), &ClientInfo::from_current_request())
        .await?;

    Ok(WithRefreshCookie {
        status: StatusCode::OK,
        cookie: refresh_cookie(&state, rotated, session.expires_at),
        body: Some(RefreshResponseBody { access_token, session_id: session.id }),
    })
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 204, description = "Session revoked and cookie cleared")
    ),
    tag = "auth"
)]
pub async fn logout_handler(
    State(state): State<ApiState>,
    jar: CookieJar,
) -> Result<WithRefreshCookie<()>, ApiError> {
    state.auth.logout(refresh_token(&jar)).await?;

    Ok(WithRefreshCookie {
        status: StatusCode::NO_CONTENT,
        body: None,
        cookie: cleared_refresh_cookie(&state),
    })
}

#[utoipa::path(
    post,
    path = "/auth/sessions/revoke-all",
    responses(
        (status = 204, description = "Every session of the caller revoked"),
        (status = 401, description = "Not authenticated")
    ),
    security(("bearerAuth" = [])),
    tag = "auth"
)]
pub async fn revoke_all_sessions_handler(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthenticatedUser>,
) -> Result<WithRefreshCookie<()>, ApiError> {
    state.auth.revoke_all(&user.id).await?;

    Ok(WithRefreshCookie {
        status: StatusCode::NO_CONTENT,
        body: None,
        cookie: cleared_refresh_cookie(&state),
    })
}
