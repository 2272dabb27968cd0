use std::collections::HashSet;
use std::time::Duration;

use axum::{
    http::{HeaderMap, Method, StatusCode},
    routing::get,
    Json,
};
use campeiro::{
    api::{api_routes, with_request_layers},
    audit::{ANONYMOUS_USER_ID, DB_WRITE_EVENT, HTTP_EVENT},
    context,
    storage::AuditLevel,
};
use serde_json::{json, Value};

use crate::support::{json_request, request, send_to, TestApp, CLIENT_IP, CPF, PASSWORD};

#[tokio::test]
async fn registration_write_is_audited_without_secrets() {
    let app = TestApp::new();
    let registered = app.register("ana@example.com").await;
    assert_eq!(registered.status, StatusCode::CREATED);

    let writes = app.audit_events(DB_WRITE_EVENT).await;
    let user_write = writes
        .iter()
        .find(|message| message["detail"]["model"] == "users")
        .expect("user creation audited");
    let detail = &user_write["detail"];
    assert_eq!(detail["action"], "create");
    assert_eq!(detail["resultId"], json!(registered.user_id()));
    assert_eq!(detail["data"]["passwordHash"], "***");
    assert_eq!(detail["data"]["cpf"], "***");
    assert_eq!(detail["data"]["email"], "ana@example.com");

    assert!(
        writes.iter().all(|message| message["detail"]["model"] != "sessions"),
        "session writes are not audited"
    );

    for entry in app.audit_entries().await {
        assert!(!entry.message.contains(PASSWORD), "password leaked: {}", entry.message);
        assert!(!entry.message.contains(CPF), "cpf leaked: {}", entry.message);
        assert!(!entry.message.contains("$argon2"), "hash leaked: {}", entry.message);
    }
}

#[tokio::test]
async fn http_entry_is_attributed_to_the_caller() {
    let app = TestApp::new();
    let registered = app.register("bia@example.com").await;
    let request_id = registered.headers["x-request-id"].to_str().unwrap().to_string();

    let entries = app.audit_entries().await;
    let entry = entries
        .iter()
        .find(|entry| {
            entry.message_json().is_some_and(|message| {
                message["event"] == HTTP_EVENT && message["detail"]["path"] == "/auth/register"
            })
        })
        .expect("HTTP entry for register");

    assert_eq!(entry.level, AuditLevel::Info);
    assert_eq!(entry.user_id, registered.user_id());
    assert_eq!(entry.ip_address, CLIENT_IP);

    let message = entry.message_json().unwrap();
    assert_eq!(message["detail"]["method"], "POST");
    assert_eq!(message["detail"]["status"], 201);
    assert!(message["detail"]["ms"].is_u64());
    assert_eq!(message["context"]["requestId"], json!(request_id));
}

#[tokio::test]
async fn anonymous_requests_use_placeholder_identity() {
    let app = TestApp::new();

    let health = app.send(request(Method::GET, "/health").body(Default::default()).unwrap()).await;
    assert_eq!(health.status, StatusCode::OK);

    let entries = app.audit_entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user_id, ANONYMOUS_USER_ID);
    assert_eq!(entries[0].ip_address, CLIENT_IP);
}

#[tokio::test]
async fn failed_requests_get_an_error_entry() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/register",
            json!({
                "name": "Caio",
                "email": "caio@example.com",
                "cpf": "abc",
                "phone": "53999887766",
                "password": PASSWORD,
            }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let entries = app.audit_entries().await;
    let error = entries
        .iter()
        .find(|entry| entry.level == AuditLevel::Error)
        .expect("error entry");
    let message = error.message_json().unwrap();
    assert_eq!(message["event"], "VALIDATION_ERROR");
    assert_eq!(message["detail"]["method"], "POST");
    assert_eq!(message["detail"]["path"], "/auth/register");
    assert!(message["detail"]["fieldErrors"].get("cpf").is_some());

    let http = app.audit_events(HTTP_EVENT).await;
    assert_eq!(http.len(), 1);
    assert_eq!(http[0]["detail"]["status"], 400);
}

#[tokio::test]
async fn undecodable_bodies_are_audited_as_validation_errors() {
    let app = TestApp::new();

    let response = app
        .send(json_request(
            Method::POST,
            "/auth/register",
            json!({ "name": "Ana", "email": "ana@example.com", "password": PASSWORD }),
        ))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let errors = app.audit_events("VALIDATION_ERROR").await;
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["detail"]["path"], "/auth/register");
    assert!(errors[0]["detail"]["fieldErrors"].get("cpf").is_some());
    for entry in app.audit_entries().await {
        assert!(!entry.message.contains(PASSWORD), "password leaked: {}", entry.message);
    }
}

#[tokio::test]
async fn audit_sink_failures_do_not_reach_clients() {
    let app = TestApp::with_failing_sink();

    let registered = app.register("dani@example.com").await;
    assert_eq!(registered.status, StatusCode::CREATED);
    assert!(registered.refresh_token().is_some());

    let rotated = app.refresh(registered.refresh_token().as_deref()).await;
    assert_eq!(rotated.status, StatusCode::OK);

    let rejected = app.refresh(registered.refresh_token().as_deref()).await;
    assert_eq!(rejected.status, StatusCode::UNAUTHORIZED);
    assert_eq!(rejected.body["message"], "Invalid session");

    app.state.recorder.flush().await;
}

async fn whoami(headers: HeaderMap) -> Json<Value> {
    let header = |name: &str| {
        headers.get(name).and_then(|value| value.to_str().ok()).unwrap_or_default().to_string()
    };
    let delay = header("x-delay-ms").parse().unwrap_or(0);

    context::annotate_user(&header("x-caller"));
    tokio::time::sleep(Duration::from_millis(delay)).await;

    let own = context::current_snapshot().expect("request context");
    let inherited = context::spawn_in_current_context(async { context::current_snapshot() })
        .await
        .expect("inherited task");
    let detached = tokio::spawn(async { context::current().is_none() }).await.expect("detached task");

    Json(json!({ "own": own, "inherited": inherited, "detached": detached }))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_keep_their_own_context() {
    let app = TestApp::new();
    let router = with_request_layers(
        api_routes(&app.state).route("/whoami", get(whoami)),
        app.state.clone(),
    );

    let calls: Vec<_> = (0..16u64)
        .map(|n| {
            let whoami_request = request(Method::GET, "/whoami")
                .header("x-caller", format!("user-{}", n))
                .header("x-delay-ms", ((16 - n) * 3).to_string())
                .body(Default::default())
                .unwrap();
            tokio::spawn(send_to(router.clone(), whoami_request))
        })
        .collect();

    let mut request_ids = HashSet::new();
    for (n, call) in calls.into_iter().enumerate() {
        let response = call.await.unwrap();
        assert_eq!(response.status, StatusCode::OK);

        let own = &response.body["own"];
        assert_eq!(own["userId"], json!(format!("user-{}", n)));
        assert_eq!(own["path"], "/whoami");
        assert_eq!(response.body["inherited"], *own);
        assert_eq!(response.body["detached"], true);
        assert_eq!(own["requestId"], json!(response.headers["x-request-id"].to_str().unwrap()));
        assert!(request_ids.insert(own["requestId"].as_str().unwrap().to_string()));
    }

    for entry in app.audit_entries().await {
        let message = entry.message_json().unwrap();
        assert_eq!(message["event"], HTTP_EVENT);
        assert_eq!(message["context"]["userId"], json!(entry.user_id));
    }
}
