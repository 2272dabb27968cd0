//! # Request Context
//!
//! Per-request correlation data (request id, caller address, user agent,
//! method, path and the authenticated user id) visible to every piece of code
//! running inside one request's call graph.
//!
//! The context lives in a `tokio::task_local!` slot that is installed around
//! the downstream future by [`establish_request_context`]. Work that leaves
//! the task (spawned futures, response body completion) must carry it
//! explicitly: use [`spawn_in_current_context`] or keep the `Arc` returned by
//! [`current`].

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Response header echoing the request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

tokio::task_local! {
    static REQUEST_CONTEXT: Arc<RequestContext>;
}

/// Correlation data for one inbound request
#[derive(Debug)]
pub struct RequestContext {
    request_id: Uuid,
    ip: Option<String>,
    user_agent: Option<String>,
    method: String,
    path: String,
    user_id: OnceLock<String>,
}

/// Owned, serializable copy of a [`RequestContext`] taken at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSnapshot {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub method: String,
    pub path: String,
}

impl RequestContext {
    /// Create a context with a fresh v4 request id
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            ip: None,
            user_agent: None,
            method: method.into(),
            path: path.into(),
            user_id: OnceLock::new(),
        }
    }

    pub fn with_ip(mut self, ip: Option<String>) -> Self {
        self.ip = ip;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn ip(&self) -> Option<&str> {
        self.ip.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.get().map(String::as_str)
    }

    /// Record the authenticated user. The id can be set once per request;
    /// returns `false` if a different id was already recorded.
    pub fn set_user_id(&self, user_id: impl Into<String>) -> bool {
        let user_id = user_id.into();
        match self.user_id.set(user_id.clone()) {
            Ok(()) => {
                tracing::Span::current().record("user_id", user_id.as_str());
                true
            }
            Err(_) => self.user_id() == Some(user_id.as_str()),
        }
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            request_id: self.request_id.to_string(),
            user_id: self.user_id().map(str::to_string),
            ip: self.ip.clone(),
            user_agent: self.user_agent.clone(),
            method: self.method.clone(),
            path: self.path.clone(),
        }
    }
}

/// The context of the request the calling code is serving, if any
pub fn current() -> Option<Arc<RequestContext>> {
    REQUEST_CONTEXT.try_with(Arc::clone).ok()
}

/// Snapshot of the current context, if any
pub fn current_snapshot() -> Option<ContextSnapshot> {
    REQUEST_CONTEXT.try_with(|ctx| ctx.snapshot()).ok()
}

/// Annotate the current request with the authenticated user id.
///
/// Outside a request scope this is a no-op.
pub fn annotate_user(user_id: &str) {
    let _ = REQUEST_CONTEXT.try_with(|ctx| {
        if !ctx.set_user_id(user_id) {
            tracing::warn!(
                request_id = %ctx.request_id(),
                existing = ?ctx.user_id(),
                attempted = %user_id,
                "request already attributed to another user"
            );
        }
    });
}

/// Run `fut` with `ctx` as the current request context
pub async fn scope<F>(ctx: Arc<RequestContext>, fut: F) -> F::Output
where
    F: Future,
{
    REQUEST_CONTEXT.scope(ctx, fut).await
}

/// Spawn a task that inherits the caller's request context and span
pub fn spawn_in_current_context<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let span = tracing::Span::current();
    match current() {
        Some(ctx) => tokio::spawn(REQUEST_CONTEXT.scope(ctx, fut).instrument(span)),
        None => tokio::spawn(fut.instrument(span)),
    }
}

/// Axum middleware establishing the request context and the request span.
///
/// Must be the outermost request-scoped layer so the audit recorder and the
/// authentication middleware observe the same context.
pub async fn establish_request_context(request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let ip = peer.or_else(|| forwarded_for(request.headers()));
    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);

    let ctx = Arc::new(
        RequestContext::new(request.method().as_str(), request.uri().path())
            .with_ip(ip)
            .with_user_agent(user_agent),
    );
    let request_id = ctx.request_id();
    let span = crate::request_span!(ctx.method(), ctx.path(), request_id);

    let mut response = scope(ctx, next.run(request)).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

fn forwarded_for(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
