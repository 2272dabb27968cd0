//! # REST API
//!
//! Axum router, handlers, error mapping and the HTTP server.

pub mod docs;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::{ApiError, ErrorReport, ErrorReportKind};
pub use routes::{api_routes, build_router, with_request_layers, ApiState};
pub use server::{run_http_server, start_api_server};
