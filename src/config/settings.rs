//! # Configuration Settings
//!
//! Defines the configuration structure for the Campeiro API.

use crate::errors::{CampeiroError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

const DEV_ACCESS_SECRET: &str = "campeiro-development-access-secret-change-me";
const DEV_REFRESH_SECRET: &str = "campeiro-development-refresh-secret-change-me";

/// Deployment environment. Controls the `Secure` cookie attribute and gates the
/// test-only identity injection in the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Environment::Test)
    }
}

impl FromStr for Environment {
    type Err = CampeiroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(CampeiroError::config(format!("Unknown environment '{}'", other))),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// Deployment environment
    pub environment: Environment,

    /// Server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Authentication configuration
    #[validate(nested)]
    pub auth: AuthConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load the whole configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let environment = match std::env::var("CAMPEIRO_ENV") {
            Ok(value) => value.parse()?,
            Err(_) => Environment::default(),
        };

        let config = Self {
            environment,
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env(),
            auth: AuthConfig::from_env(environment)?,
            observability: ObservabilityConfig::from_env(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(CampeiroError::from)?;
        self.validate_custom()
    }

    /// Custom validation logic that goes beyond what the validator crate can do
    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(CampeiroError::validation("Database URL must start with 'sqlite:'"));
        }

        if self.auth.access_token_secret == self.auth.refresh_token_secret {
            return Err(CampeiroError::validation(
                "Access and refresh token secrets must differ",
            ));
        }

        if self.environment.is_production()
            && (self.auth.access_token_secret == DEV_ACCESS_SECRET
                || self.auth.refresh_token_secret == DEV_REFRESH_SECRET)
        {
            return Err(CampeiroError::validation(
                "Development token secrets cannot be used in production",
            ));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 3333 }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let host = std::env::var("SERVER_HOST").unwrap_or(defaults.host);
        let port = match std::env::var("SERVER_PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|e| CampeiroError::config(format!("Invalid SERVER_PORT: {}", e)))?,
            Err(_) => defaults.port,
        };
        Ok(Self { host, port })
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/campeiro.db".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this points at an in-memory SQLite database
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }

    /// Create DatabaseConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_connections);

        let min_connections = std::env::var("DATABASE_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.min_connections);

        let connect_timeout_seconds = std::env::var("DATABASE_CONNECT_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.connect_timeout_seconds);

        let idle_timeout_seconds = std::env::var("DATABASE_IDLE_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.idle_timeout_seconds);

        let auto_migrate = std::env::var("DATABASE_AUTO_MIGRATE")
            .map(|s| s.to_lowercase() == "true" || s == "1")
            .unwrap_or(defaults.auto_migrate);

        Self {
            url,
            max_connections,
            min_connections,
            connect_timeout_seconds,
            idle_timeout_seconds,
            auto_migrate,
        }
    }
}

/// Authentication configuration: token secrets, lifetimes and cookie scope
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AuthConfig {
    /// HMAC secret for access tokens
    #[validate(length(min = 32, message = "Access token secret must be at least 32 characters"))]
    pub access_token_secret: String,

    /// Access token lifetime in seconds
    #[validate(range(
        min = 1,
        max = 86400,
        message = "Access token lifetime must be between 1 second and 24 hours"
    ))]
    pub access_token_ttl_seconds: i64,

    /// HMAC secret for refresh tokens
    #[validate(length(min = 32, message = "Refresh token secret must be at least 32 characters"))]
    pub refresh_token_secret: String,

    /// Session (refresh) lifetime in days
    #[validate(range(min = 1, max = 365, message = "Session lifetime must be between 1 and 365 days"))]
    pub refresh_session_days: i64,

    /// Domain attribute of the refresh cookie
    #[validate(length(min = 1, message = "Cookie domain cannot be empty"))]
    pub cookie_domain: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_token_secret: DEV_ACCESS_SECRET.to_string(),
            access_token_ttl_seconds: 15 * 60,
            refresh_token_secret: DEV_REFRESH_SECRET.to_string(),
            refresh_session_days: 30,
            cookie_domain: "localhost".to_string(),
        }
    }
}

impl AuthConfig {
    /// Access token lifetime
    pub fn access_token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.access_token_ttl_seconds)
    }

    /// Session lifetime
    pub fn refresh_session_window(&self) -> chrono::Duration {
        chrono::Duration::days(self.refresh_session_days)
    }

    fn from_env(environment: Environment) -> Result<Self> {
        let defaults = Self::default();

        let access_token_secret = secret_from_env("JWT_ACCESS_SECRET", environment)?
            .unwrap_or(defaults.access_token_secret);
        let refresh_token_secret = secret_from_env("JWT_REFRESH_SECRET", environment)?
            .unwrap_or(defaults.refresh_token_secret);

        let access_token_ttl_seconds = match std::env::var("JWT_ACCESS_EXPIRES") {
            Ok(raw) => parse_duration_spec(&raw)?,
            Err(_) => defaults.access_token_ttl_seconds,
        };

        let refresh_session_days = match std::env::var("JWT_REFRESH_EXPIRES_DAYS") {
            Ok(raw) => raw.trim().parse::<i64>().map_err(|e| {
                CampeiroError::config(format!("Invalid JWT_REFRESH_EXPIRES_DAYS: {}", e))
            })?,
            Err(_) => defaults.refresh_session_days,
        };

        let cookie_domain = std::env::var("COOKIE_DOMAIN").unwrap_or(defaults.cookie_domain);

        Ok(Self {
            access_token_secret,
            access_token_ttl_seconds,
            refresh_token_secret,
            refresh_session_days,
            cookie_domain,
        })
    }
}

fn secret_from_env(name: &str, environment: Environment) -> Result<Option<String>> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(Some(value)),
        _ if environment.is_production() => {
            Err(CampeiroError::config(format!("{} must be set in production", name)))
        }
        _ => {
            tracing::warn!(variable = name, "token secret not set, using development default");
            Ok(None)
        }
    }
}

/// Parse a lifetime such as `900`, `30s`, `15m`, `1h` or `7d` into seconds.
pub fn parse_duration_spec(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    let invalid = || CampeiroError::config(format!("Invalid duration '{}'", raw));

    let (digits, multiplier) = match raw.char_indices().last() {
        Some((idx, 's')) => (&raw[..idx], 1),
        Some((idx, 'm')) => (&raw[..idx], 60),
        Some((idx, 'h')) => (&raw[..idx], 3600),
        Some((idx, 'd')) => (&raw[..idx], 86400),
        Some(_) => (raw, 1),
        None => return Err(invalid()),
    };

    let value = digits.trim().parse::<i64>().map_err(|_| invalid())?;
    if value <= 0 {
        return Err(invalid());
    }
    value.checked_mul(multiplier).ok_or_else(invalid)
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Service name attached to metrics
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level (trace, debug, info, warn, error) used when RUST_LOG is unset
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Prometheus listener port (0 = disabled)
    pub metrics_port: u16,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "campeiro".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            metrics_port: 0,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }

    /// Create ObservabilityConfig from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("SERVICE_NAME").unwrap_or(defaults.service_name),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: std::env::var("LOG_JSON")
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(defaults.json_logging),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse::<u16>().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }
}
