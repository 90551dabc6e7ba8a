//! Metrics and Monitoring Adapters
//!
//! Prometheus metrics (an `EventSink`) and the liveness/readiness
//! probes. Both are mounted on the API server.

pub mod health;
pub mod prometheus;

pub use health::HealthState;
pub use prometheus::MetricsRegistry;
