//! User repository over the record store.

use crate::auth::models::{NewUser, User, USERS_MODEL};
use crate::errors::{CampeiroError, ErrorContext, Result};
use crate::storage::store::{from_record, to_record, Filter, RecordStore};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::instrument;

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Get a user by ID
    async fn get_user(&self, id: &str) -> Result<Option<User>>;

    /// Get a user by (normalized) email
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;
}

/// [`UserRepository`] storing users as `users` records.
///
/// Built over the audited store so account writes reach the audit trail.
#[derive(Clone)]
pub struct StoreUserRepository {
    store: Arc<dyn RecordStore>,
}

impl StoreUserRepository {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl UserRepository for StoreUserRepository {
    #[instrument(skip(self, user), fields(user_email = %user.email), name = "db_create_user")]
    async fn create_user(&self, user: NewUser) -> Result<User> {
        let now = Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            name: user.name,
            email: User::normalize_email(&user.email),
            cpf: user.cpf,
            phone: user.phone,
            role: user.role,
            password_hash: user.password_hash,
            created_at: now,
            updated_at: now,
        };

        let created = match self.store.create(USERS_MODEL, to_record(&user)?).await {
            Ok(created) => created,
            Err(CampeiroError::Conflict { .. }) => {
                return Err(CampeiroError::conflict("Email already registered", USERS_MODEL));
            }
            Err(err) => return Err(err),
        };
        from_record(created).context("decoding created user")
    }

    #[instrument(skip(self), name = "db_get_user")]
    async fn get_user(&self, id: &str) -> Result<Option<User>> {
        self.store.find_unique(USERS_MODEL, id).await?.map(from_record).transpose()
    }

    #[instrument(skip(self, email), name = "db_get_user_by_email")]
    async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let filter = Filter::new().eq("email", User::normalize_email(email));
        self.store.find_first(USERS_MODEL, &filter).await?.map(from_record).transpose()
    }
}
