//! # Error Handling
//!
//! Crate-wide error taxonomy. Services return [`CampeiroError`]; the HTTP
//! boundary maps it onto `api::error::ApiError`.

pub mod types;

pub use types::{AuthErrorType, CampeiroError, ErrorContext, Result};

/// Shorthand used across the crate and by embedders
pub type Error = CampeiroError;
