//! Authentication module entry point.
//!
//! Token issuance, password hashing, the refresh-session state machine, the
//! account flows built on top of them, and the axum middleware guarding routes.

pub mod auth_service;
pub mod hashing;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod session;

pub use auth_service::{AuthOutcome, AuthService, LoginRequest, RegisterRequest};
pub use jwt::{AccessClaims, RefreshClaims, TokenService};
pub use middleware::{require_admin, require_auth, AuthGate};
pub use models::{AuthenticatedUser, ClientInfo, PublicUser, Role, User};
pub use session::{IssuedSession, Session, SessionService, SessionState};
