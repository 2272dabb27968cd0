use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
};
use campeiro::{
    api::build_router,
    config::{AppConfig, DatabaseConfig, Environment},
    errors::CampeiroError,
    startup::build_sqlite_state,
    storage::{
        create_pool, get_pool_stats, store::to_record, AuditLevel, AuditLogFilters,
        AuditLogRepository, DbPool, Filter, MemoryRecordStore, NewAuditLogEntry, RecordStore,
        SqlxAuditLogRepository, SqlxRecordStore,
    },
};
use serde_json::{json, Value};
use tower::ServiceExt;

fn memory_config() -> DatabaseConfig {
    DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        auto_migrate: true,
        ..Default::default()
    }
}

async fn pool() -> DbPool {
    create_pool(&memory_config()).await.expect("in-memory pool")
}

fn record(value: Value) -> campeiro::storage::Record {
    to_record(&value).expect("object")
}

#[tokio::test]
async fn record_crud_roundtrip() {
    let store = SqlxRecordStore::new(pool().await);

    let created = store
        .create("photos", record(json!({ "title": "Rodeio", "price": 40, "tags": ["gaucho"] })))
        .await
        .unwrap();
    let id = created["id"].as_str().unwrap().to_string();

    let found = store.find_unique("photos", &id).await.unwrap().unwrap();
    assert_eq!(found, created);
    assert!(store.find_unique("events", &id).await.unwrap().is_none());

    let updated = store.update("photos", &id, record(json!({ "price": 55 }))).await.unwrap();
    assert_eq!(updated["price"], 55);
    assert_eq!(updated["title"], "Rodeio");
    assert_eq!(updated["id"], json!(id));

    let deleted = store.delete("photos", &id).await.unwrap();
    assert_eq!(deleted["price"], 55);
    assert!(store.find_unique("photos", &id).await.unwrap().is_none());
}

#[tokio::test]
async fn missing_and_duplicate_records() {
    let store = SqlxRecordStore::new(pool().await);

    let missing = store.update("photos", "nope", record(json!({ "price": 1 }))).await;
    assert!(matches!(missing, Err(CampeiroError::NotFound { .. })));
    let missing = store.delete("photos", "nope").await;
    assert!(matches!(missing, Err(CampeiroError::NotFound { .. })));

    store.create("photos", record(json!({ "id": "p1" }))).await.unwrap();
    let duplicate = store.create("photos", record(json!({ "id": "p1" }))).await;
    assert!(matches!(duplicate, Err(CampeiroError::Conflict { .. })));

    // same id under another model is a different record
    store.create("orders", record(json!({ "id": "p1" }))).await.unwrap();
}

#[tokio::test]
async fn filters_match_json_fields() {
    let store = SqlxRecordStore::new(pool().await);
    store
        .create_many(
            "sessions",
            vec![
                record(json!({ "id": "s1", "userId": "u1", "isRevoked": false })),
                record(json!({ "id": "s2", "userId": "u1", "isRevoked": true })),
                record(json!({ "id": "s3", "userId": "u2", "isRevoked": false })),
            ],
        )
        .await
        .unwrap();

    let active = store
        .find_many("sessions", &Filter::new().eq("userId", "u1").eq("isRevoked", false))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0]["id"], "s1");

    let first = store.find_first("sessions", &Filter::new().eq("userId", "u2")).await.unwrap();
    assert_eq!(first.unwrap()["id"], "s3");

    let everything = store.find_many("sessions", &Filter::new()).await.unwrap();
    let ids: Vec<_> = everything.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["s1", "s2", "s3"]);
}

#[tokio::test]
async fn conditional_update_applies_once() {
    let store = SqlxRecordStore::new(pool().await);
    store
        .create("sessions", record(json!({ "id": "s1", "isRevoked": false })))
        .await
        .unwrap();

    let guard = Filter::by_id("s1").eq("isRevoked", false);
    let first = store.update_many("sessions", &guard, record(json!({ "isRevoked": true }))).await;
    let second = store.update_many("sessions", &guard, record(json!({ "isRevoked": true }))).await;

    assert_eq!(first.unwrap(), 1);
    assert_eq!(second.unwrap(), 0);
    let stored = store.find_unique("sessions", "s1").await.unwrap().unwrap();
    assert_eq!(stored["isRevoked"], true);
}

#[tokio::test]
async fn upsert_creates_then_patches() {
    let store = SqlxRecordStore::new(pool().await);

    let created = store
        .upsert(
            "selections",
            "sel-1",
            record(json!({ "name": "Favoritas", "count": 0 })),
            record(json!({ "count": 1 })),
        )
        .await
        .unwrap();
    assert_eq!(created["count"], 0);
    assert_eq!(created["id"], "sel-1");

    let patched = store
        .upsert(
            "selections",
            "sel-1",
            record(json!({ "name": "Ignored", "count": 0 })),
            record(json!({ "count": 1 })),
        )
        .await
        .unwrap();
    assert_eq!(patched["count"], 1);
    assert_eq!(patched["name"], "Favoritas");
}

#[tokio::test]
async fn updates_merge_shallowly_like_the_memory_store() {
    let sqlite = SqlxRecordStore::new(pool().await);
    let memory = MemoryRecordStore::new();
    let seed = json!({
        "id": "e1",
        "title": "Rodeio",
        "address": { "city": "Bage", "zip": "96400" },
    });
    let patch = json!({ "title": null, "address": { "city": "Pelotas" }, "id": "other" });
    let expected = json!({ "id": "e1", "title": null, "address": { "city": "Pelotas" } });

    let stores: [&dyn RecordStore; 2] = [&sqlite, &memory];
    for store in stores {
        store.create("events", record(seed.clone())).await.unwrap();
        let updated = store.update("events", "e1", record(patch.clone())).await.unwrap();
        assert_eq!(Value::Object(updated), expected);

        let stored = store.find_unique("events", "e1").await.unwrap().unwrap();
        assert_eq!(Value::Object(stored), expected);

        let count = store
            .update_many("events", &Filter::by_id("e1"), record(json!({ "address": null })))
            .await
            .unwrap();
        assert_eq!(count, 1);

        let upserted = store
            .upsert(
                "events",
                "e1",
                record(json!({ "title": "unused" })),
                record(json!({ "tags": ["crioulo"], "title": "Rodeio" })),
            )
            .await
            .unwrap();
        assert_eq!(
            Value::Object(upserted),
            json!({ "id": "e1", "title": "Rodeio", "address": null, "tags": ["crioulo"] })
        );

        let untouched = store.update("events", "e1", record(json!({}))).await.unwrap();
        assert_eq!(untouched["title"], "Rodeio");
    }
}

#[tokio::test]
async fn user_emails_are_unique() {
    let store = SqlxRecordStore::new(pool().await);
    store
        .create("users", record(json!({ "id": "u1", "email": "ana@example.com" })))
        .await
        .unwrap();
    store
        .create("users", record(json!({ "id": "u2", "email": "bia@example.com" })))
        .await
        .unwrap();

    let duplicate = store.create("users", record(json!({ "email": "ana@example.com" }))).await;
    assert!(matches!(duplicate, Err(CampeiroError::Conflict { .. })));

    let renamed = store.update("users", "u2", record(json!({ "email": "ana@example.com" }))).await;
    assert!(matches!(renamed, Err(CampeiroError::Conflict { .. })));
    let kept = store.find_unique("users", "u2").await.unwrap().unwrap();
    assert_eq!(kept["email"], "bia@example.com");

    // the constraint only covers accounts
    store.create("orders", record(json!({ "email": "ana@example.com" }))).await.unwrap();
    store.create("orders", record(json!({ "email": "ana@example.com" }))).await.unwrap();
}

#[tokio::test]
async fn delete_many_counts_matches() {
    let store = SqlxRecordStore::new(pool().await);
    let inserted = store
        .create_many(
            "selection_items",
            vec![
                record(json!({ "selectionId": "a" })),
                record(json!({ "selectionId": "a" })),
                record(json!({ "selectionId": "b" })),
            ],
        )
        .await
        .unwrap();
    assert_eq!(inserted, 3);

    let removed = store
        .delete_many("selection_items", &Filter::new().eq("selectionId", "a"))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.find_many("selection_items", &Filter::new()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_many_is_all_or_nothing() {
    let store = SqlxRecordStore::new(pool().await);

    let result = store
        .create_many(
            "orders",
            vec![record(json!({ "id": "o1" })), record(json!({ "id": "o1" }))],
        )
        .await;

    assert!(result.is_err());
    assert!(store.find_many("orders", &Filter::new()).await.unwrap().is_empty());
}

fn audit_entry(level: AuditLevel, user_id: &str, event: &str) -> NewAuditLogEntry {
    NewAuditLogEntry {
        level,
        message: json!({ "event": event, "detail": {}, "context": null }).to_string(),
        user_id: user_id.to_string(),
        ip_address: "10.0.0.1".to_string(),
    }
}

#[tokio::test]
async fn audit_log_lists_newest_first_with_filters() {
    let repo = SqlxAuditLogRepository::new(pool().await);
    let first = repo.record(audit_entry(AuditLevel::Info, "u1", "HTTP")).await.unwrap();
    repo.record(audit_entry(AuditLevel::Error, "u1", "HTTP_ERROR")).await.unwrap();
    let last = repo.record(audit_entry(AuditLevel::Info, "u2", "HTTP")).await.unwrap();
    assert!(last > first);

    let all = repo.list(&AuditLogFilters::default()).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].id, last);
    assert_eq!(all[2].id, first);

    let by_user = repo
        .list(&AuditLogFilters { user_id: Some("u1".into()), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(by_user.len(), 2);

    let errors = repo
        .list(&AuditLogFilters { level: Some(AuditLevel::Error), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].message_json().unwrap()["event"], "HTTP_ERROR");

    let limited = repo
        .list(&AuditLogFilters { limit: Some(1), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let fetched = repo.get(first).await.unwrap().unwrap();
    assert_eq!(fetched.user_id, "u1");
    assert_eq!(fetched.ip_address, "10.0.0.1");
    assert_eq!(fetched.level, AuditLevel::Info);
    assert!(repo.get(first + 100).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_backed_application_persists_sessions_and_audit() {
    let pool = pool().await;
    let config = AppConfig {
        environment: Environment::Test,
        database: memory_config(),
        ..AppConfig::default()
    };
    let state = build_sqlite_state(config, pool.clone());

    let body = json!({
        "name": "Ana",
        "email": "ana@example.com",
        "cpf": "52998224725",
        "phone": "53999887766",
        "password": "s3cret!",
    });
    let register = Request::post("/auth/register")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = build_router(state.clone()).oneshot(register).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
    let pair = cookie.split(';').next().unwrap().to_string();
    to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let refresh = Request::post("/auth/refresh").header(header::COOKIE, &pair).body(Body::empty()).unwrap();
    let response = build_router(state.clone()).oneshot(refresh).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let replay = Request::post("/auth/refresh").header(header::COOKIE, &pair).body(Body::empty()).unwrap();
    let response = build_router(state.clone()).oneshot(replay).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    to_bytes(response.into_body(), usize::MAX).await.unwrap();

    state.recorder.flush().await;

    let entries = state.audit_log.list(&AuditLogFilters::default()).await.unwrap();
    let events: Vec<_> = entries
        .iter()
        .filter_map(|entry| entry.message_json())
        .map(|message| message["event"].as_str().unwrap_or_default().to_string())
        .collect();
    assert!(events.iter().any(|event| event == "DB_WRITE"));
    assert_eq!(events.iter().filter(|event| *event == "HTTP").count(), 3);
    assert!(events.iter().any(|event| event == "HTTP_ERROR"));
    assert!(entries.iter().all(|entry| !entry.message.contains("52998224725")));

    let stats = get_pool_stats(&pool);
    assert!(stats.size >= 1);
}

#[tokio::test]
async fn file_database_survives_reopen() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let config = DatabaseConfig {
        url: format!("sqlite://{}", dir.path().join("campeiro.db").display()),
        max_connections: 2,
        ..Default::default()
    };

    let pool = create_pool(&config).await.unwrap();
    let store = SqlxRecordStore::new(pool.clone());
    store.create("events", record(json!({ "id": "e1", "name": "Rodeio Crioulo" }))).await.unwrap();
    pool.close().await;

    let reopened = create_pool(&config).await.unwrap();
    let store = SqlxRecordStore::new(reopened);
    let event = store.find_unique("events", "e1").await.unwrap().unwrap();
    assert_eq!(event["name"], "Rodeio Crioulo");
}
