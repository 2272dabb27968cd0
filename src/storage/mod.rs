//! # Storage and Persistence
//!
//! Database connectivity, the generic [`RecordStore`] with its SQLite and
//! in-memory backends, and the typed repositories built on top of them.

pub mod memory;
pub mod pool;
pub mod repositories;
pub mod sqlx_store;
pub mod store;

pub use crate::config::DatabaseConfig;

pub use memory::MemoryRecordStore;
pub use pool::{create_pool, get_pool_stats, DbPool, PoolStats};
pub use repositories::{
    AuditLevel, AuditLogEntry, AuditLogFilters, AuditLogRepository, MemoryAuditLog,
    NewAuditLogEntry, SessionRepository, SqlxAuditLogRepository, StoreSessionRepository,
    StoreUserRepository, UserRepository,
};
pub use sqlx_store::SqlxRecordStore;
pub use store::{Filter, Record, RecordStore, WriteAction};

use crate::errors::{CampeiroError, Result};

/// Run embedded database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| CampeiroError::database(e, "Database connectivity check failed"))?;

    Ok(())
}
