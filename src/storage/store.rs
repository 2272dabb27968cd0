//! # Generic Record Store
//!
//! Model-agnostic persistence interface. Records are flat JSON objects keyed by
//! an `id` string and grouped by model name (`users`, `sessions`, `orders`...).
//! Typed repositories and business handlers both go through this trait, which
//! is what lets [`crate::audit::AuditedStore`] observe every write in one place.

use crate::errors::{CampeiroError, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// A stored document
pub type Record = Map<String, Value>;

/// Name of the primary key field every record carries
pub const ID_FIELD: &str = "id";

/// Fields unique within their model. The SQLite schema carries a matching
/// unique index for each entry.
pub const UNIQUE_FIELDS: &[(&str, &str)] = &[("users", "email")];

/// Unique fields declared for `model`
pub fn unique_fields(model: &str) -> impl Iterator<Item = &'static str> + '_ {
    UNIQUE_FIELDS.iter().filter(move |(owner, _)| *owner == model).map(|(_, field)| *field)
}

/// Mutating operations, named the way they appear in audit entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteAction {
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
}

impl WriteAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteAction::Create => "create",
            WriteAction::CreateMany => "createMany",
            WriteAction::Update => "update",
            WriteAction::UpdateMany => "updateMany",
            WriteAction::Upsert => "upsert",
            WriteAction::Delete => "delete",
            WriteAction::DeleteMany => "deleteMany",
        }
    }

    /// Whether the operation targets one existing record by key
    pub fn targets_single_record(&self) -> bool {
        matches!(self, WriteAction::Update | WriteAction::Upsert | WriteAction::Delete)
    }
}

impl std::fmt::Display for WriteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conjunction of field equality tests. An empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Record,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter matching a single record by primary key
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().eq(ID_FIELD, id.into())
    }

    /// Add an equality condition
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(field.into(), value.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| record.get(field).unwrap_or(&Value::Null) == expected)
    }

    pub fn conditions(&self) -> &Record {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// JSON form used in audit entries
    pub fn to_value(&self) -> Value {
        Value::Object(self.conditions.clone())
    }
}

/// Generic persistence collaborator.
///
/// Single-record operations that target a missing key fail with
/// [`CampeiroError::NotFound`]; batch operations report how many records they
/// touched. Every operation is atomic with respect to concurrent operations on
/// the same model.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record. A missing `id` is generated; a duplicate one, or a
    /// duplicate value of a [`UNIQUE_FIELDS`] entry, is a conflict.
    async fn create(&self, model: &str, data: Record) -> Result<Record>;

    /// Insert several records, returning how many were written
    async fn create_many(&self, model: &str, data: Vec<Record>) -> Result<u64>;

    /// Look a record up by primary key
    async fn find_unique(&self, model: &str, id: &str) -> Result<Option<Record>>;

    /// First record matching the filter, in insertion order
    async fn find_first(&self, model: &str, filter: &Filter) -> Result<Option<Record>>;

    /// Every record matching the filter, in insertion order
    async fn find_many(&self, model: &str, filter: &Filter) -> Result<Vec<Record>>;

    /// Shallow-merge `data` into the record with the given key
    async fn update(&self, model: &str, id: &str, data: Record) -> Result<Record>;

    /// Shallow-merge `data` into every matching record. The match and the
    /// write happen atomically, so this doubles as a compare-and-set.
    async fn update_many(&self, model: &str, filter: &Filter, data: Record) -> Result<u64>;

    /// Update the keyed record if it exists, otherwise create it from `create`
    async fn upsert(&self, model: &str, id: &str, create: Record, update: Record)
        -> Result<Record>;

    /// Remove the keyed record, returning it
    async fn delete(&self, model: &str, id: &str) -> Result<Record>;

    /// Remove every matching record
    async fn delete_many(&self, model: &str, filter: &Filter) -> Result<u64>;
}

/// Serialize a typed value into a record
pub fn to_record<T: Serialize>(value: &T) -> Result<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(CampeiroError::internal(format!(
            "expected a JSON object for a record, got {}",
            json_type_name(&other)
        ))),
    }
}

/// Deserialize a record into a typed value
pub fn from_record<T: DeserializeOwned>(record: Record) -> Result<T> {
    serde_json::from_value(Value::Object(record))
        .map_err(|e| CampeiroError::serialization(e, "decoding stored record"))
}

/// Primary key of a record, if present
pub fn record_id(record: &Record) -> Option<&str> {
    record.get(ID_FIELD).and_then(Value::as_str)
}

/// Make sure the record carries an `id`, generating a v4 UUID when absent
pub(crate) fn ensure_id(record: &mut Record) -> Result<String> {
    match record.get(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::String(_)) | None => {
            let id = uuid::Uuid::new_v4().to_string();
            record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
            Ok(id)
        }
        Some(other) => Err(CampeiroError::validation_field(
            format!("record id must be a string, got {}", json_type_name(other)),
            ID_FIELD,
        )),
    }
}

/// Shallow merge used by every update path. The primary key is immutable.
pub(crate) fn merge_into(target: &mut Record, patch: Record) {
    for (field, value) in patch {
        if field != ID_FIELD {
            target.insert(field, value);
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
