//! Record store decorator that audits writes.
//!
//! Every mutating call on an audited model is passed to the wrapped store
//! unchanged; once it succeeds, a redacted `DB_WRITE` entry describing it is
//! handed to the [`AuditRecorder`]. Reads and writes to unaudited models pass
//! straight through.

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::audit::recorder::AuditRecorder;
use crate::audit::redaction::summarize;
use crate::errors::Result;
use crate::storage::store::{record_id, Filter, Record, RecordStore, WriteAction};

pub const DB_WRITE_EVENT: &str = "DB_WRITE";

/// Which models have their writes audited.
///
/// A model on the deny list is never audited, even if it is also allowed.
#[derive(Debug, Clone)]
pub struct AuditPolicy {
    allow: HashSet<String>,
    deny: HashSet<String>,
}

impl Default for AuditPolicy {
    fn default() -> Self {
        Self::new(
            ["users", "events", "photos", "selections", "selection_items", "orders"],
            ["logs", "sessions"],
        )
    }
}

impl AuditPolicy {
    pub fn new<A, D>(allow: A, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        Self {
            allow: allow.into_iter().map(Into::into).collect(),
            deny: deny.into_iter().map(Into::into).collect(),
        }
    }

    pub fn audits(&self, model: &str) -> bool {
        !self.deny.contains(model) && self.allow.contains(model)
    }
}

/// Outcome of a write, as far as the audit entry is concerned
enum WriteResult<'a> {
    Record(&'a Record),
    Count(u64),
}

/// [`RecordStore`] wrapper emitting an audit entry per successful write
pub struct AuditedStore<S> {
    inner: S,
    recorder: AuditRecorder,
    policy: AuditPolicy,
}

impl<S: RecordStore> AuditedStore<S> {
    pub fn new(inner: S, recorder: AuditRecorder, policy: AuditPolicy) -> Self {
        Self { inner, recorder, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Best-effort pre-image of a keyed write
    async fn before(&self, model: &str, action: WriteAction, id: &str) -> Option<Record> {
        if !action.targets_single_record() {
            return None;
        }
        match self.inner.find_unique(model, id).await {
            Ok(record) => record,
            Err(err) => {
                debug!(model, id, error = %err, "pre-image lookup failed");
                None
            }
        }
    }

    fn emit(
        &self,
        model: &str,
        action: WriteAction,
        filter: Value,
        data: Value,
        result: WriteResult<'_>,
        before: Option<Record>,
    ) {
        let mut detail = Map::new();
        detail.insert("model".into(), json!(model));
        detail.insert("action".into(), json!(action.as_str()));
        insert_some(&mut detail, "where", summarize(&filter));
        insert_some(&mut detail, "data", summarize(&data));
        match result {
            WriteResult::Record(record) => {
                insert_some(&mut detail, "resultId", record_id(record).map(|id| json!(id)));
            }
            WriteResult::Count(count) => {
                detail.insert("count".into(), json!(count));
            }
        }
        insert_some(&mut detail, "before", before.and_then(|record| summarize(&Value::Object(record))));

        self.recorder.info(DB_WRITE_EVENT, Value::Object(detail));
    }
}

fn insert_some(detail: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        detail.insert(key.to_string(), value);
    }
}

fn key_filter(id: &str) -> Value {
    json!({ "id": id })
}

#[async_trait]
impl<S: RecordStore> RecordStore for AuditedStore<S> {
    async fn create(&self, model: &str, data: Record) -> Result<Record> {
        if !self.policy.audits(model) {
            return self.inner.create(model, data).await;
        }
        let snapshot = Value::Object(data.clone());
        let created = self.inner.create(model, data).await?;
        self.emit(model, WriteAction::Create, Value::Null, snapshot, WriteResult::Record(&created), None);
        Ok(created)
    }

    async fn create_many(&self, model: &str, data: Vec<Record>) -> Result<u64> {
        if !self.policy.audits(model) {
            return self.inner.create_many(model, data).await;
        }
        let snapshot = Value::Array(data.iter().cloned().map(Value::Object).collect());
        let count = self.inner.create_many(model, data).await?;
        self.emit(model, WriteAction::CreateMany, Value::Null, snapshot, WriteResult::Count(count), None);
        Ok(count)
    }

    async fn find_unique(&self, model: &str, id: &str) -> Result<Option<Record>> {
        self.inner.find_unique(model, id).await
    }

    async fn find_first(&self, model: &str, filter: &Filter) -> Result<Option<Record>> {
        self.inner.find_first(model, filter).await
    }

    async fn find_many(&self, model: &str, filter: &Filter) -> Result<Vec<Record>> {
        self.inner.find_many(model, filter).await
    }

    async fn update(&self, model: &str, id: &str, data: Record) -> Result<Record> {
        if !self.policy.audits(model) {
            return self.inner.update(model, id, data).await;
        }
        let before = self.before(model, WriteAction::Update, id).await;
        let snapshot = Value::Object(data.clone());
        let updated = self.inner.update(model, id, data).await?;
        self.emit(
            model,
            WriteAction::Update,
            key_filter(id),
            snapshot,
            WriteResult::Record(&updated),
            before,
        );
        Ok(updated)
    }

    async fn update_many(&self, model: &str, filter: &Filter, data: Record) -> Result<u64> {
        if !self.policy.audits(model) {
            return self.inner.update_many(model, filter, data).await;
        }
        let snapshot = Value::Object(data.clone());
        let count = self.inner.update_many(model, filter, data).await?;
        self.emit(
            model,
            WriteAction::UpdateMany,
            filter.to_value(),
            snapshot,
            WriteResult::Count(count),
            None,
        );
        Ok(count)
    }

    async fn upsert(
        &self,
        model: &str,
        id: &str,
        create: Record,
        update: Record,
    ) -> Result<Record> {
        if !self.policy.audits(model) {
            return self.inner.upsert(model, id, create, update).await;
        }
        let before = self.before(model, WriteAction::Upsert, id).await;
        let snapshot = if before.is_some() { update.clone() } else { create.clone() };
        let record = self.inner.upsert(model, id, create, update).await?;
        self.emit(
            model,
            WriteAction::Upsert,
            key_filter(id),
            Value::Object(snapshot),
            WriteResult::Record(&record),
            before,
        );
        Ok(record)
    }

    async fn delete(&self, model: &str, id: &str) -> Result<Record> {
        if !self.policy.audits(model) {
            return self.inner.delete(model, id).await;
        }
        let before = self.before(model, WriteAction::Delete, id).await;
        let deleted = self.inner.delete(model, id).await?;
        self.emit(
            model,
            WriteAction::Delete,
            key_filter(id),
            Value::Null,
            WriteResult::Record(&deleted),
            before,
        );
        Ok(deleted)
    }

    async fn delete_many(&self, model: &str, filter: &Filter) -> Result<u64> {
        if !self.policy.audits(model) {
            return self.inner.delete_many(model, filter).await;
        }
        let count = self.inner.delete_many(model, filter).await?;
        self.emit(
            model,
            WriteAction::DeleteMany,
            filter.to_value(),
            Value::Null,
            WriteResult::Count(count),
            None,
        );
        Ok(count)
    }
}
