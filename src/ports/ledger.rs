//! Ledger Port - Custody Collaborator Interface
//!
//! The engine never holds funds. Every trade is settled by a custody
//! ledger that pulls or releases quote currency and mints or burns
//! position tokens.
//!
//! Calls are synchronous and take `&mut self`: the orchestrator owns its
//! ledger, so a settlement in progress has no path back into the engine.

use crate::domain::trade::{Fill, MarketId, PositionId};

/// Custody ledger the orchestrator settles trades against.
pub trait Ledger: Send {
  /// Whether `position` is a known instrument of `market`.
  /// Checked before a position may be listed.
  fn position_exists(&self, market: MarketId, position: PositionId) -> bool;

  /// Pull `fill.quote_amount` from the trader and mint `fill.tokens`.
  fn settle_buy(&mut self, fill: &Fill) -> anyhow::Result<()>;

  /// Burn `fill.tokens` and release `fill.quote_amount` to the trader.
  fn settle_sell(&mut self, fill: &Fill) -> anyhow::Result<()>;
}
