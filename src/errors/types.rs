//! # Error Types
//!
//! Error types for the Campeiro session and audit services using `thiserror`.

use std::collections::BTreeMap;
use std::fmt;

/// Custom result type for Campeiro operations
pub type Result<T> = std::result::Result<T, CampeiroError>;

/// Main error type for the Campeiro services
#[derive(thiserror::Error, Debug)]
pub enum CampeiroError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Payload validation failures, keyed by field
    #[error("Validation error: {message}")]
    InvalidInput {
        message: String,
        fields: BTreeMap<String, Vec<String>>,
    },

    /// Authentication errors. `message` is what callers see; `error_type`
    /// carries the precise reason for logs and the audit trail.
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        error_type: AuthErrorType,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} with ID '{id}'")]
    NotFound {
        resource_type: String,
        id: String,
    },

    /// Resource conflict errors (e.g., duplicate unique field)
    #[error("Resource conflict: {message}")]
    Conflict {
        message: String,
        resource_type: String,
    },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Authentication error subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorType {
    InvalidToken,
    ExpiredToken,
    MissingToken,
    InvalidCredentials,
    InsufficientPermissions,
    SessionNotFound,
    SessionRevoked,
    SessionExpired,
    SessionOwnerMismatch,
}

impl AuthErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthErrorType::InvalidToken => "invalid_token",
            AuthErrorType::ExpiredToken => "expired_token",
            AuthErrorType::MissingToken => "missing_token",
            AuthErrorType::InvalidCredentials => "invalid_credentials",
            AuthErrorType::InsufficientPermissions => "insufficient_permissions",
            AuthErrorType::SessionNotFound => "session_not_found",
            AuthErrorType::SessionRevoked => "session_revoked",
            AuthErrorType::SessionExpired => "session_expired",
            AuthErrorType::SessionOwnerMismatch => "session_owner_mismatch",
        }
    }
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CampeiroError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an authentication error
    pub fn auth<S: Into<String>>(message: S, error_type: AuthErrorType) -> Self {
        Self::Auth { message: message.into(), error_type }
    }

    /// Create an internal server error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Wrap a sqlx error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Wrap a serde_json error with context
    pub fn serialization<S: Into<String>>(source: serde_json::Error, context: S) -> Self {
        Self::Serialization { source, context: context.into() }
    }

    /// The authentication reason, if this is an authentication error
    pub fn auth_error_type(&self) -> Option<AuthErrorType> {
        match self {
            CampeiroError::Auth { error_type, .. } => Some(*error_type),
            _ => None,
        }
    }

    /// Check if this error is an authentication failure
    pub fn is_auth(&self) -> bool {
        matches!(self, CampeiroError::Auth { .. })
    }

    /// Add context to an error (used by ErrorContext trait)
    pub(crate) fn add_context(&mut self, context: String) {
        match self {
            CampeiroError::Io { context: ctx, .. }
            | CampeiroError::Database { context: ctx, .. }
            | CampeiroError::Serialization { context: ctx, .. } => {
                *ctx = format!("{}: {}", context, ctx);
            }
            CampeiroError::Config { message, .. }
            | CampeiroError::Validation { message, .. }
            | CampeiroError::InvalidInput { message, .. }
            | CampeiroError::Internal { message, .. } => {
                *message = format!("{}: {}", context, message);
            }
            CampeiroError::Auth { .. }
            | CampeiroError::NotFound { .. }
            | CampeiroError::Conflict { .. } => {}
        }
    }
}

/// Extension trait for attaching context to fallible operations
pub trait ErrorContext<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|mut err| {
            err.add_context(context.into());
            err
        })
    }
}

impl From<std::io::Error> for CampeiroError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for CampeiroError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON processing failed".to_string() }
    }
}

impl From<sqlx::Error> for CampeiroError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<sqlx::migrate::MigrateError> for CampeiroError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::config_with_source("Database migration failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for CampeiroError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::InvalidInput { message: errors.to_string(), fields: field_messages(&errors) }
    }
}

/// Messages of every failing field, falling back to the rule code
pub fn field_messages(errors: &validator::ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|err| {
                    err.message.as_ref().map(|m| m.to_string()).unwrap_or_else(|| err.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}
