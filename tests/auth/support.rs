use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, request::Builder, HeaderMap, Method, Request, StatusCode},
    Router,
};
use campeiro::{
    api::{build_router, ApiState},
    audit::AuditPolicy,
    auth::{Role, TokenService},
    config::{AppConfig, Environment},
    errors::{CampeiroError, Result},
    startup::build_state,
    storage::{
        AuditLogEntry, AuditLogFilters, AuditLogRepository, MemoryAuditLog, MemoryRecordStore,
        NewAuditLogEntry, StoreSessionRepository,
    },
};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const CLIENT_IP: &str = "203.0.113.7";
pub const PASSWORD: &str = "s3cret!";
pub const CPF: &str = "52998224725";

pub struct TestApp {
    pub state: ApiState,
    pub audit: Arc<MemoryAuditLog>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_environment(Environment::Test)
    }

    pub fn with_environment(environment: Environment) -> Self {
        let audit = Arc::new(MemoryAuditLog::new());
        let state = state_with_sink(environment, audit.clone());
        Self { state, audit }
    }

    /// App whose audit sink rejects every write
    pub fn with_failing_sink() -> Self {
        let state = state_with_sink(Environment::Test, Arc::new(FailingSink));
        Self { state, audit: Arc::new(MemoryAuditLog::new()) }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub fn tokens(&self) -> &TokenService {
        self.state.auth.sessions().tokens()
    }

    pub fn sessions(&self) -> StoreSessionRepository {
        StoreSessionRepository::new(self.state.store.clone())
    }

    pub fn admin_token(&self) -> String {
        self.tokens().issue_access("admin-1", Role::Admin).expect("sign admin token")
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        send_to(self.router(), request).await
    }

    /// Audit entries written so far, in insertion order
    pub async fn audit_entries(&self) -> Vec<AuditLogEntry> {
        self.state.recorder.flush().await;
        self.audit.entries().await
    }

    /// Parsed messages of every audit entry for `event`
    pub async fn audit_events(&self, event: &str) -> Vec<Value> {
        self.audit_entries()
            .await
            .iter()
            .filter_map(AuditLogEntry::message_json)
            .filter(|message| message["event"] == event)
            .collect()
    }

    pub async fn register(&self, email: &str) -> TestResponse {
        self.send(json_request(Method::POST, "/auth/register", register_body(email))).await
    }

    pub async fn refresh(&self, refresh_token: Option<&str>) -> TestResponse {
        self.send(cookie_request("/auth/refresh", refresh_token)).await
    }

    pub async fn logout(&self, refresh_token: Option<&str>) -> TestResponse {
        self.send(cookie_request("/auth/logout", refresh_token)).await
    }
}

fn state_with_sink(environment: Environment, sink: Arc<dyn AuditLogRepository>) -> ApiState {
    let config = AppConfig { environment, ..AppConfig::default() };
    build_state(config, MemoryRecordStore::new(), sink, AuditPolicy::default())
}

pub async fn send_to(router: Router, request: Request<Body>) -> TestResponse {
    let response = router.oneshot(request).await.expect("router is infallible");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    TestResponse { status, headers, body }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }

    /// Value of the refresh cookie set by this response
    pub fn refresh_token(&self) -> Option<String> {
        let raw = self.set_cookie()?;
        let pair = raw.split(';').next()?;
        pair.strip_prefix("rtok=").filter(|value| !value.is_empty()).map(str::to_string)
    }

    pub fn session_id(&self) -> String {
        self.body["sessionId"].as_str().expect("sessionId in body").to_string()
    }

    pub fn user_id(&self) -> String {
        self.body["user"]["id"].as_str().expect("user.id in body").to_string()
    }

    pub fn access_token(&self) -> String {
        self.body["accessToken"].as_str().expect("accessToken in body").to_string()
    }
}

pub fn register_body(email: &str) -> Value {
    json!({
        "name": "Ana",
        "email": email,
        "cpf": CPF,
        "phone": "53999887766",
        "password": PASSWORD,
    })
}

pub fn request(method: Method, path: &str) -> Builder {
    Request::builder().method(method).uri(path).header("x-forwarded-for", CLIENT_IP)
}

pub fn json_request(method: Method, path: &str, body: Value) -> Request<Body> {
    request(method, path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("valid request")
}

pub fn cookie_request(path: &str, refresh_token: Option<&str>) -> Request<Body> {
    let mut builder = request(Method::POST, path);
    if let Some(token) = refresh_token {
        builder = builder.header(header::COOKIE, format!("rtok={}", token));
    }
    builder.body(Body::empty()).expect("valid request")
}

pub fn bearer_request(method: Method, path: &str, token: &str) -> Request<Body> {
    request(method, path)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("valid request")
}

pub struct FailingSink;

#[async_trait::async_trait]
impl AuditLogRepository for FailingSink {
    async fn record(&self, _entry: NewAuditLogEntry) -> Result<i64> {
        Err(CampeiroError::internal("audit sink unavailable"))
    }

    async fn list(&self, _filters: &AuditLogFilters) -> Result<Vec<AuditLogEntry>> {
        Ok(Vec::new())
    }

    async fn get(&self, _id: i64) -> Result<Option<AuditLogEntry>> {
        Ok(None)
    }
}
