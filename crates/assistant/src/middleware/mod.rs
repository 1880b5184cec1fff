//! HTTP middleware for the assistant.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layers (capture errors, transactions)
//! 2. `TraceLayer` (request span with status and latency)
//! 3. Request ID (correlate logs and Sentry events)

pub mod request_id;
pub mod user;

pub use request_id::request_id_middleware;
pub use user::{CurrentUser, USER_ID_HEADER, UserRejection};
