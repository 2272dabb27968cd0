//! Composition of the application state.
//!
//! Wires the audit recorder, the audited record store, the repositories and
//! the authentication services together. `main` uses the SQLite backends;
//! tests and embedders can pass in-memory ones.

use std::sync::Arc;

use tracing::info;

use crate::api::ApiState;
use crate::audit::{AuditPolicy, AuditRecorder, AuditedStore};
use crate::auth::{AuthGate, AuthService, SessionService, TokenService};
use crate::config::AppConfig;
use crate::storage::{
    AuditLogRepository, DbPool, RecordStore, SqlxAuditLogRepository, SqlxRecordStore,
    StoreSessionRepository, StoreUserRepository,
};

/// Build the handler state over `store`, auditing writes into `audit_log`
pub fn build_state<S>(
    config: AppConfig,
    store: S,
    audit_log: Arc<dyn AuditLogRepository>,
    policy: AuditPolicy,
) -> ApiState
where
    S: RecordStore + 'static,
{
    let recorder = AuditRecorder::new(Arc::clone(&audit_log));
    let store: Arc<dyn RecordStore> = Arc::new(AuditedStore::new(store, recorder.clone(), policy));

    let tokens = Arc::new(TokenService::new(&config.auth));
    let users = Arc::new(StoreUserRepository::new(Arc::clone(&store)));
    let sessions = Arc::new(StoreSessionRepository::new(Arc::clone(&store)));
    let session_service = SessionService::new(
        sessions,
        users.clone(),
        Arc::clone(&tokens),
        config.auth.refresh_session_window(),
    );
    let auth = Arc::new(AuthService::new(users, session_service));
    let gate = AuthGate::new(tokens, config.environment);

    info!(environment = %config.environment, "application state ready");

    ApiState { config: Arc::new(config), store, auth, gate, audit_log, recorder }
}

/// Application state over the SQLite pool
pub fn build_sqlite_state(config: AppConfig, pool: DbPool) -> ApiState {
    let audit_log: Arc<dyn AuditLogRepository> =
        Arc::new(SqlxAuditLogRepository::new(pool.clone()));
    build_state(config, SqlxRecordStore::new(pool), audit_log, AuditPolicy::default())
}
