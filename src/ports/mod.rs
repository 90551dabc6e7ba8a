//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the orchestrator requires from
//! the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `Ledger`: Custody of funds and position tokens
//! - `Clock`: Time source for TWAP accrual
//! - `EventSink`: Trade and price observability
//! - `Repository`: Trade journal and snapshot persistence (JSONL-based)

pub mod clock;
pub mod events;
pub mod ledger;
pub mod repository;

pub use clock::Clock;
pub use events::EventSink;
pub use ledger::Ledger;
pub use repository::{EngineSnapshot, MarketSnapshot, Repository, TradeRecord};
