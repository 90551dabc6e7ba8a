//! Domain layer - LMSR pricing math and per-market state.
//!
//! Pure functions and plain data only: no I/O, no clocks, no async.
//! Collaborators (custody ledger, time source, event sinks) live behind
//! the `ports` traits and are driven by the orchestrator in `usecases`.

pub mod error;
pub mod expansion;
pub mod fees;
pub mod fixed_point;
pub mod initializer;
pub mod market;
pub mod quote;
pub mod state_update;
pub mod trade;
pub mod twap;

// Re-export core types for convenience
pub use error::EngineError;
pub use expansion::Expansion;
pub use fees::FeeSchedule;
pub use fixed_point::{MathError, QuoteScale, Rounding, WAD, Wad};
pub use initializer::{MarketParams, OutcomeLimits};
pub use market::MarketState;
pub use quote::Quote;
pub use state_update::StateTransition;
pub use trade::{
    Amount, Fill, MarketId, PositionId, PriceUpdate, Side, TradeEvent, TradeReceipt, TradeSide,
    TraderId,
};
pub use twap::{TwapObservation, TwapState};
