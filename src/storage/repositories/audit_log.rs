//! Audit log repository: the append-only sink behind the audit recorder.

use crate::errors::{CampeiroError, Result};
use crate::storage::DbPool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

/// Hard cap on entries returned by one listing
pub const MAX_AUDIT_PAGE: i64 = 200;

/// Severity of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    Info,
    Warn,
    Error,
}

impl AuditLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditLevel::Info => "info",
            AuditLevel::Warn => "warn",
            AuditLevel::Error => "error",
        }
    }
}

impl Display for AuditLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuditLevel {
    type Err = CampeiroError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "info" => Ok(AuditLevel::Info),
            "warn" => Ok(AuditLevel::Warn),
            "error" => Ok(AuditLevel::Error),
            other => Err(CampeiroError::validation_field(
                format!("Unknown audit level '{}'", other),
                "level",
            )),
        }
    }
}

/// Entry handed to the sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAuditLogEntry {
    pub level: AuditLevel,
    pub message: String,
    pub user_id: String,
    pub ip_address: String,
}

/// Persisted audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: i64,
    pub level: AuditLevel,
    /// JSON document `{event, detail, context}`
    pub message: String,
    pub user_id: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Parsed form of [`AuditLogEntry::message`]
    pub fn message_json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.message).ok()
    }
}

/// Listing filters; results are always newest first
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AuditLogFilters {
    /// Only entries attributed to this user
    pub user_id: Option<String>,
    /// Only entries of this level
    pub level: Option<AuditLevel>,
    /// Page size, capped at 200
    pub limit: Option<i64>,
}

impl AuditLogFilters {
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(MAX_AUDIT_PAGE).clamp(1, MAX_AUDIT_PAGE)
    }
}

#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Append an entry, returning its id
    async fn record(&self, entry: NewAuditLogEntry) -> Result<i64>;

    /// Entries matching the filters, newest first
    async fn list(&self, filters: &AuditLogFilters) -> Result<Vec<AuditLogEntry>>;

    /// One entry by id
    async fn get(&self, id: i64) -> Result<Option<AuditLogEntry>>;
}

#[derive(Debug, Clone, FromRow)]
struct AuditLogRow {
    pub id: i64,
    pub level: String,
    pub message: String,
    pub user_id: String,
    pub ip_address: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<AuditLogRow> for AuditLogEntry {
    type Error = CampeiroError;

    fn try_from(row: AuditLogRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            level: row.level.parse()?,
            message: row.message,
            user_id: row.user_id,
            ip_address: row.ip_address,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqlxAuditLogRepository {
    pool: DbPool,
}

impl SqlxAuditLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogRepository for SqlxAuditLogRepository {
    #[instrument(skip(self, entry), fields(level = %entry.level), name = "db_record_audit")]
    async fn record(&self, entry: NewAuditLogEntry) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO audit_log (level, message, user_id, ip_address, created_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(entry.level.as_str())
        .bind(&entry.message)
        .bind(&entry.user_id)
        .bind(&entry.ip_address)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|err| CampeiroError::database(err, "Failed to write audit entry"))?;

        Ok(result.last_insert_rowid())
    }

    #[instrument(skip(self), name = "db_list_audit")]
    async fn list(&self, filters: &AuditLogFilters) -> Result<Vec<AuditLogEntry>> {
        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT id, level, message, user_id, ip_address, created_at FROM audit_log WHERE 1 = 1",
        );
        if let Some(user_id) = &filters.user_id {
            builder.push(" AND user_id = ");
            builder.push_bind(user_id.clone());
        }
        if let Some(level) = filters.level {
            builder.push(" AND level = ");
            builder.push_bind(level.as_str());
        }
        builder.push(" ORDER BY id DESC LIMIT ");
        builder.push_bind(filters.effective_limit());

        let rows = builder
            .build_query_as::<AuditLogRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|err| CampeiroError::database(err, "Failed to list audit entries"))?;

        rows.into_iter().map(AuditLogEntry::try_from).collect()
    }

    #[instrument(skip(self), name = "db_get_audit")]
    async fn get(&self, id: i64) -> Result<Option<AuditLogEntry>> {
        let row = sqlx::query_as::<_, AuditLogRow>(
            "SELECT id, level, message, user_id, ip_address, created_at FROM audit_log WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|err| CampeiroError::database(err, "Failed to fetch audit entry"))?;

        row.map(AuditLogEntry::try_from).transpose()
    }
}

/// In-memory audit sink for tests and embedding
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry in insertion order
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl AuditLogRepository for MemoryAuditLog {
    async fn record(&self, entry: NewAuditLogEntry) -> Result<i64> {
        let mut entries = self.entries.write().await;
        let id = entries.len() as i64 + 1;
        entries.push(AuditLogEntry {
            id,
            level: entry.level,
            message: entry.message,
            user_id: entry.user_id,
            ip_address: entry.ip_address,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn list(&self, filters: &AuditLogFilters) -> Result<Vec<AuditLogEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .rev()
            .filter(|e| filters.user_id.as_ref().map_or(true, |user| &e.user_id == user))
            .filter(|e| filters.level.map_or(true, |level| e.level == level))
            .take(filters.effective_limit() as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<AuditLogEntry>> {
        Ok(self.entries.read().await.iter().find(|e| e.id == id).cloned())
    }
}
