//! # Configuration Management
//!
//! Environment-driven configuration for the Campeiro API. `main` loads a `.env`
//! file with `dotenvy` first, then calls [`AppConfig::from_env`].

pub mod settings;

pub use settings::{
    parse_duration_spec, AppConfig, AuthConfig, DatabaseConfig, Environment,
    ObservabilityConfig, ServerConfig,
};
