//! Event Port - Trade Observability
//!
//! Sinks receive every committed trade and the resulting price. They are
//! called after state is committed and cannot fail the trade: a sink that
//! needs I/O must hand the event off (channel, buffer) and return.

use crate::domain::error::EngineError;
use crate::domain::trade::{MarketId, PriceUpdate, TradeEvent};

pub trait EventSink: Send + Sync {
  fn on_trade(&self, event: &TradeEvent);

  fn on_price(&self, update: &PriceUpdate);

  /// A trade was refused. Nothing was settled or written.
  fn on_rejected(&self, _market: MarketId, _error: &EngineError) {}
}
