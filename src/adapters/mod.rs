//! Adapters Layer - Hexagonal Architecture Outer Ring
//!
//! Implements the port traits defined in `crate::ports` with concrete
//! infrastructure. Each sub-module groups adapters by concern.
//!
//! Adapter categories:
//! - `api`: HTTP surface (axum) with rate-limited trade submission
//! - `clock`: System and manual time sources
//! - `ledger`: In-memory custody ledger
//! - `metrics`: Prometheus metrics and health probes
//! - `persistence`: JSONL trade journal and state snapshots

pub mod api;
pub mod clock;
pub mod ledger;
pub mod metrics;
pub mod persistence;
