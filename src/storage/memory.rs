//! In-memory [`RecordStore`] backed by `dashmap`.
//!
//! Each model is one map entry; operations hold that entry's shard lock for
//! their whole duration, which makes each of them atomic per model. Unique
//! fields are checked under the same lock.

use std::collections::HashSet;

use crate::errors::{CampeiroError, Result};
use crate::storage::store::{
    ensure_id, merge_into, record_id, unique_fields, Filter, Record, RecordStore,
};
use async_trait::async_trait;
use dashmap::DashMap;

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    models: DashMap<String, Vec<Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently stored for a model
    pub fn len(&self, model: &str) -> usize {
        self.models.get(model).map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self, model: &str) -> bool {
        self.len(model) == 0
    }
}

fn position(records: &[Record], id: &str) -> Option<usize> {
    records.iter().position(|record| record_id(record) == Some(id))
}

/// Fails if two records of `model` share a value of a unique field
fn ensure_unique(records: &[Record], model: &str) -> Result<()> {
    for field in unique_fields(model) {
        let mut seen = HashSet::new();
        for value in records.iter().filter_map(|record| record.get(field)) {
            if value.is_null() {
                continue;
            }
            if !seen.insert(value.to_string()) {
                let shown = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
                return Err(CampeiroError::conflict(
                    format!("{} with {} '{}' already exists", model, field, shown),
                    model,
                ));
            }
        }
    }
    Ok(())
}

fn insert(records: &mut Vec<Record>, model: &str, mut data: Record) -> Result<Record> {
    let id = ensure_id(&mut data)?;
    if position(records, &id).is_some() {
        return Err(CampeiroError::conflict(
            format!("{} with id '{}' already exists", model, id),
            model,
        ));
    }
    records.push(data.clone());
    if let Err(err) = ensure_unique(records, model) {
        records.pop();
        return Err(err);
    }
    Ok(data)
}

/// Merge `patch` into the record at `idx`, keeping the old state if a unique
/// field would collide
fn patch_at(records: &mut [Record], model: &str, idx: usize, patch: Record) -> Result<Record> {
    let previous = records[idx].clone();
    merge_into(&mut records[idx], patch);
    if let Err(err) = ensure_unique(records, model) {
        records[idx] = previous;
        return Err(err);
    }
    Ok(records[idx].clone())
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, model: &str, data: Record) -> Result<Record> {
        let mut records = self.models.entry(model.to_string()).or_default();
        insert(&mut records, model, data)
    }

    async fn create_many(&self, model: &str, data: Vec<Record>) -> Result<u64> {
        let mut records = self.models.entry(model.to_string()).or_default();
        let mut staged = records.clone();
        for record in data.iter().cloned() {
            insert(&mut staged, model, record)?;
        }
        *records = staged;
        Ok(data.len() as u64)
    }

    async fn find_unique(&self, model: &str, id: &str) -> Result<Option<Record>> {
        Ok(self.models.get(model).and_then(|records| {
            position(&records, id).map(|idx| records[idx].clone())
        }))
    }

    async fn find_first(&self, model: &str, filter: &Filter) -> Result<Option<Record>> {
        Ok(self
            .models
            .get(model)
            .and_then(|records| records.iter().find(|r| filter.matches(r)).cloned()))
    }

    async fn find_many(&self, model: &str, filter: &Filter) -> Result<Vec<Record>> {
        Ok(self
            .models
            .get(model)
            .map(|records| records.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn update(&self, model: &str, id: &str, data: Record) -> Result<Record> {
        let mut records = self.models.entry(model.to_string()).or_default();
        let idx = position(&records, id).ok_or_else(|| CampeiroError::not_found(model, id))?;
        patch_at(&mut records, model, idx, data)
    }

    async fn update_many(&self, model: &str, filter: &Filter, data: Record) -> Result<u64> {
        let mut records = self.models.entry(model.to_string()).or_default();
        let mut staged = records.clone();
        let mut count = 0;
        for record in staged.iter_mut().filter(|r| filter.matches(r)) {
            merge_into(record, data.clone());
            count += 1;
        }
        if count > 0 {
            ensure_unique(&staged, model)?;
            *records = staged;
        }
        Ok(count)
    }

    async fn upsert(
        &self,
        model: &str,
        id: &str,
        create: Record,
        update: Record,
    ) -> Result<Record> {
        let mut records = self.models.entry(model.to_string()).or_default();
        match position(&records, id) {
            Some(idx) => patch_at(&mut records, model, idx, update),
            None => {
                let mut create = create;
                create.insert("id".to_string(), id.into());
                insert(&mut records, model, create)
            }
        }
    }

    async fn delete(&self, model: &str, id: &str) -> Result<Record> {
        let mut records = self.models.entry(model.to_string()).or_default();
        let idx = position(&records, id).ok_or_else(|| CampeiroError::not_found(model, id))?;
        Ok(records.remove(idx))
    }

    async fn delete_many(&self, model: &str, filter: &Filter) -> Result<u64> {
        let mut records = self.models.entry(model.to_string()).or_default();
        let before = records.len();
        records.retain(|r| !filter.matches(r));
        Ok((before - records.len()) as u64)
    }
}
