use std::collections::BTreeMap;
use std::sync::LazyLock;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::{types::field_messages, AuthErrorType, Error};

/// Outward message of every 500 response
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
/// Outward message of payload validation failures
pub const VALIDATION_FAILED_MESSAGE: &str = "Validation failed";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Validation { message: String, fields: BTreeMap<String, Vec<String>> },
    Conflict(String),
    NotFound(String),
    Unauthorized { message: String, reason: AuthErrorType },
    Forbidden(String),
    ServiceUnavailable(String),
    /// Carries the server-side detail; clients only see [`INTERNAL_ERROR_MESSAGE`].
    Internal(String),
}

/// Which audit event a failed request is recorded under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReportKind {
    Validation,
    Http,
    Uncaught,
}

impl ErrorReportKind {
    pub fn event(&self) -> &'static str {
        match self {
            ErrorReportKind::Validation => "VALIDATION_ERROR",
            ErrorReportKind::Http => "HTTP_ERROR",
            ErrorReportKind::Uncaught => "UNCAUGHT_ERROR",
        }
    }
}

/// Server-side account of a failed request, attached to the response as an
/// extension for the HTTP audit middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub kind: ErrorReportKind,
    pub status: u16,
    pub detail: Value,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Validation { .. } => "validation_error",
            ApiError::Conflict(_) => "conflict",
            ApiError::NotFound(_) => "not_found",
            ApiError::Unauthorized { .. } => "unauthorized",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::Internal(_) => "internal_error",
        }
    }

    /// Full detail for the audit trail, including what the body withholds
    pub fn report(&self) -> ErrorReport {
        let status = self.status_code().as_u16();
        match self {
            ApiError::Validation { message, fields } => ErrorReport {
                kind: ErrorReportKind::Validation,
                status,
                detail: json!({ "message": message, "fieldErrors": fields }),
            },
            ApiError::Unauthorized { message, reason } => ErrorReport {
                kind: ErrorReportKind::Http,
                status,
                detail: json!({ "status": status, "message": message, "reason": reason.as_str() }),
            },
            ApiError::Internal(detail) => ErrorReport {
                kind: ErrorReportKind::Uncaught,
                status,
                detail: json!({ "message": detail }),
            },
            ApiError::BadRequest(message)
            | ApiError::Conflict(message)
            | ApiError::NotFound(message)
            | ApiError::Forbidden(message)
            | ApiError::ServiceUnavailable(message) => ErrorReport {
                kind: ErrorReportKind::Http,
                status,
                detail: json!({ "status": status, "message": message }),
            },
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<BTreeMap<String, Vec<String>>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let report = self.report();
        let error = self.error_kind();

        let body = match self {
            ApiError::Validation { message, fields } => {
                ErrorBody { error, message, errors: Some(fields) }
            }
            ApiError::Unauthorized { message, .. } => ErrorBody { error, message, errors: None },
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed with internal error");
                ErrorBody { error, message: INTERNAL_ERROR_MESSAGE.to_string(), errors: None }
            }
            ApiError::BadRequest(message)
            | ApiError::Conflict(message)
            | ApiError::NotFound(message)
            | ApiError::Forbidden(message)
            | ApiError::ServiceUnavailable(message) => ErrorBody { error, message, errors: None },
        };

        let mut response = (status, Json(body)).into_response();
        response.extensions_mut().insert(report);
        response
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Validation { message, field } => {
                let fields = field.map(|field| (field, vec![message.clone()])).into_iter().collect();
                ApiError::Validation { message, fields }
            }
            Error::InvalidInput { fields, .. } => {
                ApiError::Validation { message: VALIDATION_FAILED_MESSAGE.to_string(), fields }
            }
            Error::Auth { error_type: AuthErrorType::InsufficientPermissions, message } => {
                ApiError::Forbidden(message)
            }
            Error::Auth { message, error_type } => {
                ApiError::Unauthorized { message, reason: error_type }
            }
            Error::NotFound { resource_type, id } => {
                ApiError::NotFound(format!("{} '{}' not found", resource_type, id))
            }
            Error::Conflict { message, .. } => ApiError::Conflict(message),
            other @ (Error::Database { .. }
            | Error::Config { .. }
            | Error::Io { .. }
            | Error::Serialization { .. }
            | Error::Internal { .. }) => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApiError::Validation {
            message: VALIDATION_FAILED_MESSAGE.to_string(),
            fields: field_messages(&errors),
        }
    }
}

static MISSING_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"missing field `([^`]+)`").unwrap());
static FIELD_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z_][\w.\[\]]*): (.+)$").unwrap());

/// Field errors for a request part serde could not decode. `text` is the
/// extractor's message; serde's own detail follows its first `": "`.
fn decode_failure_fields(part: &str, text: &str) -> BTreeMap<String, Vec<String>> {
    let detail = text.split_once(": ").map(|(_, rest)| rest).unwrap_or(text);
    if let Some(captures) = MISSING_FIELD.captures(detail) {
        return BTreeMap::from([(captures[1].to_string(), vec!["is required".to_string()])]);
    }
    if let Some(captures) = FIELD_PATH.captures(detail) {
        return BTreeMap::from([(captures[1].to_string(), vec![captures[2].to_string()])]);
    }
    BTreeMap::from([(part.to_string(), vec![detail.to_string()])])
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let text = rejection.body_text();
        let fields = match rejection {
            JsonRejection::JsonDataError(_) | JsonRejection::JsonSyntaxError(_) => {
                decode_failure_fields("body", &text)
            }
            _ => BTreeMap::from([("body".to_string(), vec![text])]),
        };
        ApiError::Validation { message: "Invalid request body".to_string(), fields }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        let text = rejection.body_text();
        let fields = match rejection {
            QueryRejection::FailedToDeserializeQueryString(_) => {
                decode_failure_fields("query", &text)
            }
            _ => BTreeMap::from([("query".to_string(), vec![text])]),
        };
        ApiError::Validation { message: "Invalid query string".to_string(), fields }
    }
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn service_unavailable<S: Into<String>>(msg: S) -> Self {
        ApiError::ServiceUnavailable(msg.into())
    }

    pub fn unauthorized<S: Into<String>>(msg: S, reason: AuthErrorType) -> Self {
        ApiError::Unauthorized { message: msg.into(), reason }
    }

    pub fn forbidden<S: Into<String>>(msg: S) -> Self {
        ApiError::Forbidden(msg.into())
    }
}
