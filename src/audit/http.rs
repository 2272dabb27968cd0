//! One audit entry per completed HTTP exchange.
//!
//! The middleware wraps the response body; the `HTTP` entry is emitted when
//! the body reaches end of stream or is dropped (client gone), so the
//! recorded duration includes streaming. Failed requests additionally get an
//! error-level entry built from the [`ErrorReport`] the API layer attaches.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use bytes::Bytes;
use http_body::{Frame, SizeHint};
use serde_json::{json, Value};

use crate::api::error::ErrorReport;
use crate::audit::recorder::AuditRecorder;
use crate::context::{self, RequestContext};
use crate::observability::metrics;
use crate::storage::AuditLevel;

pub const HTTP_EVENT: &str = "HTTP";

/// Axum middleware recording every response. Install inside the request
/// context layer.
pub async fn record_http_exchange(
    State(recorder): State<AuditRecorder>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let ctx = context::current();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let status = response.status().as_u16();

    if let Some(report) = response.extensions().get::<ErrorReport>() {
        let mut detail = match report.detail.clone() {
            Value::Object(map) => map,
            other => {
                let mut map = serde_json::Map::new();
                map.insert("detail".into(), other);
                map
            }
        };
        detail.insert("method".into(), json!(method));
        detail.insert("path".into(), json!(path));
        recorder.record_with_context(
            ctx.as_deref(),
            AuditLevel::Error,
            report.kind.event(),
            Value::Object(detail),
        );
    }

    let completion = Completion { recorder, ctx, method, path, status, started };
    response.map(|body| Body::new(AuditedBody { inner: body, completion: Some(completion) }))
}

struct Completion {
    recorder: AuditRecorder,
    ctx: Option<Arc<RequestContext>>,
    method: String,
    path: String,
    status: u16,
    started: Instant,
}

impl Completion {
    fn fire(self) {
        let elapsed = self.started.elapsed();
        metrics::record_http_request(
            &self.method,
            &metrics::normalize_path_for_metrics(&self.path),
            self.status,
            elapsed.as_secs_f64(),
        );
        self.recorder.record_with_context(
            self.ctx.as_deref(),
            AuditLevel::Info,
            HTTP_EVENT,
            json!({
                "method": self.method,
                "path": self.path,
                "status": self.status,
                "ms": elapsed.as_millis() as u64,
            }),
        );
    }
}

/// Response body that reports completion exactly once
struct AuditedBody {
    inner: Body,
    completion: Option<Completion>,
}

impl AuditedBody {
    fn complete(&mut self) {
        if let Some(completion) = self.completion.take() {
            completion.fire();
        }
    }
}

impl http_body::Body for AuditedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let poll = Pin::new(&mut this.inner).poll_frame(cx);
        match &poll {
            Poll::Ready(None) | Poll::Ready(Some(Err(_))) => this.complete(),
            Poll::Ready(Some(Ok(_))) if this.inner.is_end_stream() => this.complete(),
            _ => {}
        }
        poll
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for AuditedBody {
    fn drop(&mut self) {
        self.complete();
    }
}
