//! Refresh session repository over the record store.

use crate::auth::session::{NewSession, Session, SESSIONS_MODEL};
use crate::errors::{ErrorContext, Result};
use crate::storage::store::{from_record, to_record, Filter, Record, RecordStore};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new active session
    async fn create_session(&self, session: NewSession) -> Result<Session>;

    /// Get a session by ID
    async fn get_session(&self, id: &str) -> Result<Option<Session>>;

    /// Revoke the session only if it is still active.
    ///
    /// Returns `true` when this call performed the transition.
    async fn revoke_if_active(&self, id: &str) -> Result<bool>;

    /// Revoke every active session of a user, returning how many were revoked
    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64>;

    /// All sessions of a user, oldest first
    async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<Session>>;
}

#[derive(Clone)]
pub struct StoreSessionRepository {
    store: Arc<dyn RecordStore>,
}

impl StoreSessionRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

fn revoked_patch() -> Record {
    let mut patch = Record::new();
    patch.insert("isRevoked".to_string(), Value::Bool(true));
    patch
}

#[async_trait]
impl SessionRepository for StoreSessionRepository {
    #[instrument(skip(self, session), fields(user_id = %session.user_id), name = "db_create_session")]
    async fn create_session(&self, session: NewSession) -> Result<Session> {
        let session = Session {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: session.user_id,
            user_agent: session.user_agent,
            ip_address: session.ip_address,
            expires_at: session.expires_at,
            is_revoked: false,
            created_at: Utc::now(),
        };

        let created = self.store.create(SESSIONS_MODEL, to_record(&session)?).await?;
        from_record(created).context("decoding created session")
    }

    #[instrument(skip(self), name = "db_get_session")]
    async fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.store
            .find_unique(SESSIONS_MODEL, id)
            .await?
            .map(from_record)
            .transpose()
            .context("decoding stored session")
    }

    #[instrument(skip(self), name = "db_revoke_session")]
    async fn revoke_if_active(&self, id: &str) -> Result<bool> {
        let filter = Filter::by_id(id).eq("isRevoked", false);
        let count = self.store.update_many(SESSIONS_MODEL, &filter, revoked_patch()).await?;
        Ok(count > 0)
    }

    #[instrument(skip(self), name = "db_revoke_user_sessions")]
    async fn revoke_all_for_user(&self, user_id: &str) -> Result<u64> {
        let filter = Filter::new().eq("userId", user_id).eq("isRevoked", false);
        self.store.update_many(SESSIONS_MODEL, &filter, revoked_patch()).await
    }

    #[instrument(skip(self), name = "db_list_user_sessions")]
    async fn list_user_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let filter = Filter::new().eq("userId", user_id);
        self.store
            .find_many(SESSIONS_MODEL, &filter)
            .await?
            .into_iter()
            .map(from_record)
            .collect()
    }
}
