//! HTTP transport for the spool upload engine.
//!
//! This crate provides:
//! - Upload lifecycle endpoints (init, chunk, progress, finish, download, delete)
//! - Owner identity from a gateway-supplied header
//! - Health and Prometheus endpoints

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod metrics;
pub mod routes;
pub mod state;

pub use bootstrap::build_state;
pub use error::ApiError;
pub use identity::{Owner, TraceId};
pub use routes::create_router;
pub use state::AppState;
