//! Access and refresh credentials (HS256 JWTs).
//!
//! Access tokens are short-lived and stateless. Refresh tokens carry no `exp`;
//! the session record they name is the authority on expiry and revocation.
//! The two kinds are signed with different secrets.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};

use crate::auth::models::Role;
use crate::config::AuthConfig;
use crate::errors::{AuthErrorType, CampeiroError, Result};

/// Claims of an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of a refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    pub sid: String,
    pub iat: i64,
}

/// Issues and verifies access and refresh tokens
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_validation: Validation,
    refresh_validation: Validation,
    access_ttl: Duration,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService").field("access_ttl", &self.access_ttl).finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        let mut access_validation = Validation::new(Algorithm::HS256);
        access_validation.leeway = 0;
        access_validation.set_required_spec_claims(&["exp", "sub"]);

        let mut refresh_validation = Validation::new(Algorithm::HS256);
        refresh_validation.leeway = 0;
        refresh_validation.validate_exp = false;
        refresh_validation.set_required_spec_claims(&["sub"]);

        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            access_validation,
            refresh_validation,
            access_ttl: config.access_token_ttl(),
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Issue an access token for `subject` valid for the configured lifetime
    pub fn issue_access(&self, subject: &str, role: Role) -> Result<String> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: subject.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| CampeiroError::internal(format!("Failed to sign access token: {}", e)))
    }

    /// Issue a refresh token bound to one session
    pub fn issue_refresh(&self, subject: &str, session_id: &str) -> Result<String> {
        let claims = RefreshClaims {
            sub: subject.to_string(),
            sid: session_id.to_string(),
            iat: Utc::now().timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| CampeiroError::internal(format!("Failed to sign refresh token: {}", e)))
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims> {
        decode::<AccessClaims>(token, &self.access_decoding, &self.access_validation)
            .map(|data| data.claims)
            .map_err(|e| verification_error("access", e))
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &self.refresh_validation)
            .map(|data| data.claims)
            .map_err(|e| verification_error("refresh", e))
    }
}

fn verification_error(kind: &str, err: jsonwebtoken::errors::Error) -> CampeiroError {
    let error_type = match err.kind() {
        ErrorKind::ExpiredSignature => AuthErrorType::ExpiredToken,
        _ => AuthErrorType::InvalidToken,
    };
    tracing::debug!(token_kind = kind, error = %err, "token verification failed");
    CampeiroError::auth(format!("Invalid {} token", kind), error_type)
}
