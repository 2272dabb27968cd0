//! Register, login, refresh and logout flows.

use std::fmt;
use std::sync::{Arc, LazyLock};

use argon2::Argon2;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::auth::hashing;
use crate::auth::models::{ClientInfo, NewUser, PublicUser, Role, User, USERS_MODEL};
use crate::auth::session::{IssuedSession, SessionService};
use crate::context;
use crate::errors::{AuthErrorType, CampeiroError, Result};
use crate::observability::metrics;
use crate::storage::UserRepository;

/// Outward message for every failed login
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid email or password";

static CPF_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{11}$").unwrap());
static PHONE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{10,11}$").unwrap());

/// Verified against when the email is unknown so both failure paths cost one
/// Argon2 verification.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| {
    hashing::hash_password(&hashing::password_hasher(), "dummy_startup_value")
        .unwrap_or_else(|_| "$argon2id$v=19$m=768,t=1,p=1$dW5rbm93bg$dW5rbm93bg".to_string())
});

/// Account registration payload.
#[derive(Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    /// Eleven digits, no punctuation.
    #[validate(regex(path = *CPF_REGEX, message = "cpf must contain exactly 11 digits"))]
    pub cpf: String,
    /// Ten or eleven digits including area code.
    #[validate(regex(path = *PHONE_REGEX, message = "phone must contain 10 or 11 digits"))]
    pub phone: String,
    #[validate(length(min = 6, message = "password must be at least 6 characters"))]
    pub password: String,
}

impl fmt::Debug for RegisterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterRequest")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("cpf", &"***")
            .field("phone", &self.phone)
            .field("password", &"***")
            .finish()
    }
}

/// Email/password credentials.
#[derive(Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    #[validate(length(min = 1, message = "password is required"))]
    pub password: String,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .field("password", &"***")
            .finish()
    }
}

/// Result of a successful register or login
#[derive(Debug, Clone)]
pub struct AuthOutcome {
    pub user: PublicUser,
    pub issued: IssuedSession,
}

/// Orchestrates account and session flows.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    sessions: SessionService,
    hasher: Argon2<'static>,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserRepository>, sessions: SessionService) -> Self {
        Self { users, sessions, hasher: hashing::password_hasher() }
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    /// Create a `client` account and open its first session
    #[instrument(skip(self, request, client), fields(email = %request.email))]
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<AuthOutcome> {
        request.validate()?;

        let email = User::normalize_email(&request.email);
        if self.users.get_user_by_email(&email).await?.is_some() {
            info!("registration rejected, email already registered");
            return Err(CampeiroError::conflict("Email already registered", USERS_MODEL));
        }

        let password_hash = hashing::hash_password(&self.hasher, &request.password)?;
        let user = self
            .users
            .create_user(NewUser {
                name: request.name,
                email,
                cpf: request.cpf,
                phone: request.phone,
                role: Role::Client,
                password_hash,
            })
            .await?;

        let issued = self.sessions.create_session(&user.id, user.role, client).await?;
        context::annotate_user(&user.id);
        info!(user_id = %user.id, session_id = %issued.session.id, "user registered");

        Ok(AuthOutcome { user: user.to_public(), issued })
    }

    /// Authenticate with email and password.
    ///
    /// Unknown emails and wrong passwords fail with the same error.
    #[instrument(skip(self, request, client), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest, client: &ClientInfo) -> Result<AuthOutcome> {
        request.validate()?;

        let email = User::normalize_email(&request.email);
        let user = match self.users.get_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                let _ = hashing::verify_password(&self.hasher, &request.password, &DUMMY_HASH);
                metrics::record_authentication("failure");
                warn!("login failed: unknown email");
                return Err(invalid_credentials());
            }
        };

        if !hashing::verify_password(&self.hasher, &request.password, &user.password_hash) {
            metrics::record_authentication("failure");
            warn!(user_id = %user.id, "login failed: wrong password");
            return Err(invalid_credentials());
        }

        let issued = self.sessions.create_session(&user.id, user.role, client).await?;
        context::annotate_user(&user.id);
        metrics::record_authentication("success");
        info!(user_id = %user.id, session_id = %issued.session.id, "user logged in");

        Ok(AuthOutcome { user: user.to_public(), issued })
    }

    /// Rotate the session named by a refresh token
    #[instrument(skip(self, refresh_token, client))]
    pub async fn refresh(
        &self,
        refresh_token: Option<&str>,
        client: &ClientInfo,
    ) -> Result<IssuedSession> {
        let Some(token) = refresh_token.filter(|token| !token.is_empty()) else {
            metrics::record_session_event("rejected");
            return Err(CampeiroError::auth(
                "Refresh token missing",
                AuthErrorType::MissingToken,
            ));
        };

        let issued = self.sessions.rotate(token, client).await?;
        context::annotate_user(&issued.session.user_id);
        Ok(issued)
    }

    /// Revoke the session named by a refresh token, if any
    #[instrument(skip(self, refresh_token))]
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<()> {
        self.sessions.revoke(refresh_token).await?;
        Ok(())
    }

    /// Revoke every active session of `user_id`
    #[instrument(skip(self))]
    pub async fn revoke_all(&self, user_id: &str) -> Result<u64> {
        self.sessions.revoke_all(user_id).await
    }
}

fn invalid_credentials() -> CampeiroError {
    CampeiroError::auth(INVALID_CREDENTIALS_MESSAGE, AuthErrorType::InvalidCredentials)
}
