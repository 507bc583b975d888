//! hope-server: HTTP API behind the Hope foundation portals
//!
//! Volunteers, scholars and sponsors register as users; staff and admins run
//! the back office. The API covers events and check-in, scholarships with
//! sponsor donations and report cards, a community forum, and notifications.
//!
//! Layout:
//! - [`models`] validated input types
//! - [`db`] pool, schema and repositories
//! - [`http`] axum router, identity extraction and error mapping
//! - [`credentials`] argon2 hashing for passwords and MPINs

pub mod credentials;
pub mod db;
pub mod http;
pub mod models;

pub use http::{build_router, run_server, ServerConfig};
