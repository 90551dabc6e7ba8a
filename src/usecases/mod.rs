//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain logic with port interfaces. The engine exposes a
//! single use case: `TradeOrchestrator`, which owns every market and is
//! the only component with state-changing entry points.

pub mod trade_orchestrator;

pub use trade_orchestrator::{EngineSettings, OrderKind, TradeOrchestrator, TradeRequest};
