//! Health Probes - Liveness and Readiness
//!
//! `/live` answers as long as the process serves HTTP. `/ready` turns
//! green once the engine has restored or created its markets and goes
//! red again when shutdown begins or the journal reports a fault.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;

/// Shared health flags polled by the readiness probe.
#[derive(Debug)]
pub struct HealthState {
    /// Markets are loaded and trades are accepted.
    pub engine_ready: AtomicBool,
    /// Last persistence health check passed.
    pub storage_healthy: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            engine_ready: AtomicBool::new(false),
            storage_healthy: AtomicBool::new(true),
        }
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_engine_ready(&self, ready: bool) {
        self.engine_ready.store(ready, Ordering::Relaxed);
    }

    pub fn set_storage_healthy(&self, healthy: bool) {
        self.storage_healthy.store(healthy, Ordering::Relaxed);
    }

    pub fn is_ready(&self) -> bool {
        self.engine_ready.load(Ordering::Relaxed) && self.storage_healthy.load(Ordering::Relaxed)
    }
}

/// `/live` and `/ready` routes.
pub fn router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/live", get(liveness))
        .route("/ready", get(readiness))
        .with_state(state)
}

async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_requires_engine_and_storage() {
        let health = HealthState::new();
        assert!(!health.is_ready());
        health.set_engine_ready(true);
        assert!(health.is_ready());
        health.set_storage_healthy(false);
        assert!(!health.is_ready());
    }
}
