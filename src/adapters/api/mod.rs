//! HTTP API Adapter
//!
//! Exposes the engine over axum 0.7. Sub-modules:
//! - `routes`: router, handlers and server loop
//! - `types`: request/response payloads
//! - `error`: engine error to HTTP status mapping

pub mod error;
pub mod routes;
pub mod types;

pub use error::ApiError;
pub use routes::{ApiState, SharedEngine, router, serve};
