//! SQLite-backed [`RecordStore`].
//!
//! Records live as JSON documents in the `records` table. Filters are pushed
//! down with `json_extract` and patches are applied with `json_set`, so every
//! read-modify-write is one statement. `json_set` replaces each patched key
//! wholesale, matching [`crate::storage::store::merge_into`]: a `null` value is
//! stored rather than removing the key, and nested objects are not merged.

use crate::errors::{CampeiroError, Result};
use crate::storage::store::{ensure_id, Filter, Record, RecordStore, ID_FIELD};
use crate::storage::DbPool;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite};
use tracing::{instrument, Instrument};

#[derive(Debug, Clone)]
pub struct SqlxRecordStore {
    pool: DbPool,
}

impl SqlxRecordStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode(model: &str, raw: &str) -> Result<Record> {
    serde_json::from_str(raw)
        .map_err(|e| CampeiroError::serialization(e, format!("decoding {} record", model)))
}

fn encode(record: &Record) -> Result<String> {
    serde_json::to_string(record).map_err(|e| CampeiroError::serialization(e, "encoding record"))
}

/// Append `column` with `patch` shallow-merged in. The primary key never changes.
fn push_merge(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, mut patch: Record) {
    patch.remove(ID_FIELD);
    if patch.is_empty() {
        builder.push(column);
        return;
    }

    builder.push("json_set(");
    builder.push(column);
    for (field, value) in patch {
        builder.push(", ");
        builder.push_bind(format!("$.\"{}\"", field.replace('"', "")));
        builder.push(", json(");
        builder.push_bind(value.to_string());
        builder.push(")");
    }
    builder.push(")");
}

fn db_error(model: &str, operation: &str) -> impl FnOnce(sqlx::Error) -> CampeiroError {
    let context = format!("Failed to {} {} record", operation, model);
    move |err| {
        let is_unique = err
            .as_database_error()
            .map(|db| db.is_unique_violation())
            .unwrap_or(false);
        if is_unique {
            CampeiroError::conflict(context, "records")
        } else {
            CampeiroError::database(err, context)
        }
    }
}

/// Append `AND json_extract(data, '$."field"') = value` for every condition
fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    for (field, value) in filter.conditions() {
        builder.push(" AND json_extract(data, ");
        builder.push_bind(format!("$.\"{}\"", field.replace('"', "")));
        match value {
            Value::Null => {
                builder.push(") IS NULL");
            }
            Value::Bool(flag) => {
                builder.push(") = ");
                builder.push_bind(i64::from(*flag));
            }
            Value::Number(number) => {
                builder.push(") = ");
                match number.as_i64() {
                    Some(int) => builder.push_bind(int),
                    None => builder.push_bind(number.as_f64().unwrap_or(f64::NAN)),
                };
            }
            Value::String(text) => {
                builder.push(") = ");
                builder.push_bind(text.clone());
            }
            Value::Array(_) | Value::Object(_) => {
                builder.push(") = json(");
                builder.push_bind(value.to_string());
                builder.push(")");
            }
        }
    }
}

#[async_trait]
impl RecordStore for SqlxRecordStore {
    #[instrument(skip(self, data), name = "db_record_create")]
    async fn create(&self, model: &str, mut data: Record) -> Result<Record> {
        let id = ensure_id(&mut data)?;
        sqlx::query("INSERT INTO records (model, id, data) VALUES (?, ?, ?)")
            .bind(model)
            .bind(&id)
            .bind(encode(&data)?)
            .execute(&self.pool)
            .await
            .map_err(db_error(model, "create"))?;
        Ok(data)
    }

    #[instrument(skip(self, data), fields(batch = data.len()), name = "db_record_create_many")]
    async fn create_many(&self, model: &str, data: Vec<Record>) -> Result<u64> {
        let mut tx = self.pool.begin().await.map_err(db_error(model, "begin batch for"))?;
        let mut count = 0;
        for mut record in data {
            let id = ensure_id(&mut record)?;
            sqlx::query("INSERT INTO records (model, id, data) VALUES (?, ?, ?)")
                .bind(model)
                .bind(&id)
                .bind(encode(&record)?)
                .execute(&mut *tx)
                .await
                .map_err(db_error(model, "create"))?;
            count += 1;
        }
        tx.commit().await.map_err(db_error(model, "commit batch for"))?;
        Ok(count)
    }

    #[instrument(skip(self), name = "db_record_find_unique")]
    async fn find_unique(&self, model: &str, id: &str) -> Result<Option<Record>> {
        let raw: Option<String> =
            sqlx::query_scalar("SELECT data FROM records WHERE model = ? AND id = ?")
                .bind(model)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error(model, "fetch"))?;
        raw.map(|raw| decode(model, &raw)).transpose()
    }

    async fn find_first(&self, model: &str, filter: &Filter) -> Result<Option<Record>> {
        let span = crate::db_span!("find_first", model = %model);
        async {
            let mut builder = QueryBuilder::<Sqlite>::new("SELECT data FROM records WHERE model = ");
            builder.push_bind(model);
            push_filter(&mut builder, filter);
            builder.push(" ORDER BY seq LIMIT 1");

            let raw: Option<String> = builder
                .build_query_scalar()
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error(model, "fetch"))?;
            raw.map(|raw| decode(model, &raw)).transpose()
        }
        .instrument(span)
        .await
    }

    async fn find_many(&self, model: &str, filter: &Filter) -> Result<Vec<Record>> {
        let span = crate::db_span!("find_many", model = %model);
        async {
            let mut builder = QueryBuilder::<Sqlite>::new("SELECT data FROM records WHERE model = ");
            builder.push_bind(model);
            push_filter(&mut builder, filter);
            builder.push(" ORDER BY seq");

            let rows: Vec<String> = builder
                .build_query_scalar()
                .fetch_all(&self.pool)
                .await
                .map_err(db_error(model, "list"))?;
            rows.iter().map(|raw| decode(model, raw)).collect::<Result<Vec<_>>>()
        }
        .instrument(span)
        .await
    }

    #[instrument(skip(self, data), name = "db_record_update")]
    async fn update(&self, model: &str, id: &str, data: Record) -> Result<Record> {
        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE records SET data = ");
        push_merge(&mut builder, "data", data);
        builder.push(" WHERE model = ");
        builder.push_bind(model);
        builder.push(" AND id = ");
        builder.push_bind(id);
        builder.push(" RETURNING data");

        let raw: Option<String> = builder
            .build_query_scalar()
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error(model, "update"))?;

        match raw {
            Some(raw) => decode(model, &raw),
            None => Err(CampeiroError::not_found(model, id)),
        }
    }

    async fn update_many(&self, model: &str, filter: &Filter, data: Record) -> Result<u64> {
        let span = crate::db_span!("update_many", model = %model);
        async {
            let mut builder = QueryBuilder::<Sqlite>::new("UPDATE records SET data = ");
            push_merge(&mut builder, "data", data);
            builder.push(" WHERE model = ");
            builder.push_bind(model);
            push_filter(&mut builder, filter);

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(db_error(model, "update"))?;
            Ok::<_, CampeiroError>(result.rows_affected())
        }
        .instrument(span)
        .await
    }

    #[instrument(skip(self, create, update), name = "db_record_upsert")]
    async fn upsert(
        &self,
        model: &str,
        id: &str,
        create: Record,
        update: Record,
    ) -> Result<Record> {
        let mut create = create;
        create.insert(ID_FIELD.to_string(), Value::String(id.to_string()));

        let mut builder =
            QueryBuilder::<Sqlite>::new("INSERT INTO records (model, id, data) VALUES (");
        builder.push_bind(model);
        builder.push(", ");
        builder.push_bind(id);
        builder.push(", ");
        builder.push_bind(encode(&create)?);
        builder.push(") ON CONFLICT (model, id) DO UPDATE SET data = ");
        push_merge(&mut builder, "records.data", update);
        builder.push(" RETURNING data");

        let raw: String = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error(model, "upsert"))?;

        decode(model, &raw)
    }

    #[instrument(skip(self), name = "db_record_delete")]
    async fn delete(&self, model: &str, id: &str) -> Result<Record> {
        let raw: Option<String> = sqlx::query_scalar(
            "DELETE FROM records WHERE model = ? AND id = ? RETURNING data",
        )
        .bind(model)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error(model, "delete"))?;

        match raw {
            Some(raw) => decode(model, &raw),
            None => Err(CampeiroError::not_found(model, id)),
        }
    }

    async fn delete_many(&self, model: &str, filter: &Filter) -> Result<u64> {
        let span = crate::db_span!("delete_many", model = %model);
        async {
            let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM records WHERE model = ");
            builder.push_bind(model);
            push_filter(&mut builder, filter);

            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(db_error(model, "delete"))?;
            Ok::<_, CampeiroError>(result.rows_affected())
        }
        .instrument(span)
        .await
    }
}
