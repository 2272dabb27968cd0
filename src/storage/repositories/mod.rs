//! Repository modules for data access
//!
//! Users and sessions are typed views over the generic record store; the audit
//! log has its own table and never goes through the record store.

pub mod audit_log;
pub mod session;
pub mod user;

pub use audit_log::{
    AuditLevel, AuditLogEntry, AuditLogFilters, AuditLogRepository, MemoryAuditLog,
    NewAuditLogEntry, SqlxAuditLogRepository, MAX_AUDIT_PAGE,
};
pub use session::{SessionRepository, StoreSessionRepository};
pub use user::{StoreUserRepository, UserRepository};
