//! Refresh session lifecycle.
//!
//! A session is created on register/login and on every rotation. It only ever
//! moves from active to revoked (explicitly) or expired (by time); a rotated
//! session is never reactivated.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::auth::jwt::TokenService;
use crate::auth::models::{ClientInfo, Role};
use crate::errors::{AuthErrorType, CampeiroError, Result};
use crate::observability::metrics;
use crate::storage::{SessionRepository, UserRepository};

/// Model name of session records in the record store
pub const SESSIONS_MODEL: &str = "sessions";

/// Outward message for every refresh rejection
pub const INVALID_SESSION_MESSAGE: &str = "Invalid session";

/// Stored representation of a refresh session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub is_revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Session lifecycle state at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    Revoked,
    Expired,
}

impl Session {
    /// Revocation wins over expiry when both apply
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        if self.is_revoked {
            SessionState::Revoked
        } else if self.expires_at <= now {
            SessionState::Expired
        } else {
            SessionState::Active
        }
    }

    pub fn is_active(&self) -> bool {
        self.state_at(Utc::now()) == SessionState::Active
    }
}

/// New session payload
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub expires_at: DateTime<Utc>,
}

/// A session together with the credentials bound to it
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub access_token: String,
    pub refresh_token: String,
}

/// Session state machine over the session repository
#[derive(Clone)]
pub struct SessionService {
    sessions: Arc<dyn SessionRepository>,
    users: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
    window: Duration,
}

impl SessionService {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        users: Arc<dyn UserRepository>,
        tokens: Arc<TokenService>,
        window: Duration,
    ) -> Self {
        Self { sessions, users, tokens, window }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Open a new session for `user_id` and issue its credential pair
    #[instrument(skip(self, client), fields(user_id = %user_id))]
    pub async fn create_session(
        &self,
        user_id: &str,
        role: Role,
        client: &ClientInfo,
    ) -> Result<IssuedSession> {
        let expires_at = Utc::now() + self.window;
        self.open(user_id, role, client, expires_at).await
    }

    /// Exchange a refresh token for a new session and credential pair.
    ///
    /// The predecessor is revoked before the successor is created. The revoke
    /// only succeeds on an active session, so concurrent rotations of one
    /// session produce at most one successor.
    #[instrument(skip(self, refresh_token, client))]
    pub async fn rotate(&self, refresh_token: &str, client: &ClientInfo) -> Result<IssuedSession> {
        let claims = self.tokens.verify_refresh(refresh_token).map_err(|err| {
            reject(err.auth_error_type().unwrap_or(AuthErrorType::InvalidToken))
        })?;

        let session = match self.sessions.get_session(&claims.sid).await? {
            Some(session) => session,
            None => return Err(reject(AuthErrorType::SessionNotFound)),
        };

        if session.user_id != claims.sub {
            warn!(
                session_id = %session.id,
                token_subject = %claims.sub,
                "refresh token names a session owned by another user"
            );
            return Err(reject(AuthErrorType::SessionOwnerMismatch));
        }

        match session.state_at(Utc::now()) {
            SessionState::Active => {}
            SessionState::Revoked => return Err(reject(AuthErrorType::SessionRevoked)),
            SessionState::Expired => return Err(reject(AuthErrorType::SessionExpired)),
        }

        let user = match self.users.get_user(&claims.sub).await? {
            Some(user) => user,
            None => return Err(reject(AuthErrorType::InvalidToken)),
        };

        if !self.sessions.revoke_if_active(&session.id).await? {
            warn!(session_id = %session.id, "session revoked concurrently during rotation");
            return Err(reject(AuthErrorType::SessionRevoked));
        }

        let issued = self.open(&user.id, user.role, client, session.expires_at).await?;
        metrics::record_session_event("rotated");
        info!(
            previous_session_id = %session.id,
            session_id = %issued.session.id,
            user_id = %user.id,
            "session rotated"
        );
        Ok(issued)
    }

    /// Revoke the session named by a refresh token.
    ///
    /// Absent or unverifiable tokens are not errors; returns whether a session
    /// was actually revoked by this call.
    #[instrument(skip(self, refresh_token))]
    pub async fn revoke(&self, refresh_token: Option<&str>) -> Result<bool> {
        let Some(token) = refresh_token else {
            return Ok(false);
        };

        let claims = match self.tokens.verify_refresh(token) {
            Ok(claims) => claims,
            Err(err) => {
                info!(reason = ?err.auth_error_type(), "logout with unverifiable refresh token");
                return Ok(false);
            }
        };

        let revoked = self.sessions.revoke_if_active(&claims.sid).await?;
        if revoked {
            metrics::record_session_event("revoked");
            info!(session_id = %claims.sid, user_id = %claims.sub, "session revoked");
        }
        Ok(revoked)
    }

    /// Revoke every active session of a user
    #[instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: &str) -> Result<u64> {
        let count = self.sessions.revoke_all_for_user(user_id).await?;
        if count > 0 {
            metrics::record_session_event("revoked");
        }
        info!(user_id = %user_id, revoked = count, "revoked all sessions");
        Ok(count)
    }

    async fn open(
        &self,
        user_id: &str,
        role: Role,
        client: &ClientInfo,
        expires_at: DateTime<Utc>,
    ) -> Result<IssuedSession> {
        let session = self
            .sessions
            .create_session(NewSession {
                user_id: user_id.to_string(),
                user_agent: client.user_agent.clone(),
                ip_address: client.ip_address.clone(),
                expires_at,
            })
            .await?;

        let access_token = self.tokens.issue_access(user_id, role)?;
        let refresh_token = self.tokens.issue_refresh(user_id, &session.id)?;
        metrics::record_session_event("created");

        Ok(IssuedSession { session, access_token, refresh_token })
    }
}

fn reject(reason: AuthErrorType) -> CampeiroError {
    metrics::record_session_event("rejected");
    info!(reason = %reason, "refresh rejected");
    CampeiroError::auth(INVALID_SESSION_MESSAGE, reason)
}
