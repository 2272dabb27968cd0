//! # Campeiro
//!
//! Session backbone and audit pipeline of the Foco Campeiro marketplace API.
//!
//! ## Architecture
//!
//! ```text
//! HTTP request → request context → HTTP audit → auth middleware → handler
//!                                                                    ↓
//!                               audit recorder ← audited record store → storage
//! ```
//!
//! ## Core Components
//!
//! - **Authentication**: access/refresh tokens, Argon2 password hashing, and a
//!   refresh-session state machine with single-use rotation
//! - **Request context**: per-request correlation data propagated through the
//!   task tree
//! - **Audit trail**: a record store decorator capturing redacted writes and a
//!   middleware recording every HTTP exchange
//! - **Persistence**: a generic JSON record store over SQLite (`sqlx`) or memory
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use campeiro::{api, startup, storage, Config, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_env()?;
//!     let pool = storage::create_pool(&config.database).await?;
//!     let server = config.server.clone();
//!     let state = startup::build_sqlite_state(config, pool);
//!     api::start_api_server(&server, api::build_router(state)).await
//! }
//! ```

pub mod api;
pub mod audit;
pub mod auth;
pub mod config;
pub mod context;
pub mod errors;
pub mod observability;
pub mod startup;
pub mod storage;

// Re-export commonly used types and traits
pub use config::{AppConfig as Config, Environment};
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
