//! # Audit Trail
//!
//! Transparent auditing of data writes and HTTP exchanges:
//!
//! - [`AuditedStore`] decorates a [`crate::storage::RecordStore`] and emits a
//!   `DB_WRITE` entry per successful write on an audited model.
//! - [`record_http_exchange`] emits an `HTTP` entry per completed response,
//!   plus an error entry for failed requests.
//! - [`AuditRecorder`] tags entries with the request context and writes them
//!   in the background.

pub mod http;
pub mod interceptor;
pub mod recorder;
pub mod redaction;

pub use http::{record_http_exchange, HTTP_EVENT};
pub use interceptor::{AuditPolicy, AuditedStore, DB_WRITE_EVENT};
pub use recorder::{AuditRecorder, ANONYMOUS_USER_ID, UNKNOWN_IP};
pub use redaction::{mask_sensitive, summarize};
