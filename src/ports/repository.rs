//! Repository Port - Journal and Snapshot Persistence
//!
//! Trades are appended to a JSONL journal for audit; the full engine
//! state is snapshotted for crash recovery. No database dependency.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::fixed_point::Wad;
use crate::domain::market::MarketState;
use crate::domain::trade::{
  Amount, MarketId, PositionId, Side, TradeEvent, TradeSide, TraderId,
};
use crate::domain::twap::TwapState;

/// One journal line per committed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
  /// Unique trade identifier.
  pub id: String,
  pub trader: TraderId,
  pub market_id: MarketId,
  pub position_id: PositionId,
  pub side: Side,
  pub action: TradeSide,
  pub tokens: Amount,
  /// Fee-inclusive amount paid (buys) or received (sells).
  pub quote_amount: Amount,
  pub fee: Amount,
  /// Engine clock time (unix seconds).
  pub timestamp: u64,
  /// Wall-clock time the record was produced (RFC 3339).
  pub recorded_at: String,
}

impl From<&TradeEvent> for TradeRecord {
  fn from(event: &TradeEvent) -> Self {
    let fill = &event.fill;
    Self {
      id: event.id.to_string(),
      trader: fill.trader.clone(),
      market_id: fill.market_id,
      position_id: fill.position_id,
      side: fill.side,
      action: fill.action,
      tokens: fill.tokens,
      quote_amount: fill.quote_amount,
      fee: fill.fee,
      timestamp: event.timestamp,
      recorded_at: event.recorded_at.to_rfc3339(),
    }
  }
}

/// Pricing and TWAP state of one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
  pub state: MarketState,
  pub twap: TwapState,
}

/// Engine snapshot for crash recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSnapshot {
  /// Version of the state format.
  pub version: String,
  /// Engine clock time of the snapshot (unix seconds).
  pub timestamp: u64,
  pub fee_bps: u32,
  pub dust_tolerance: Wad,
  pub markets: Vec<MarketSnapshot>,
  /// Serialized custody ledger, when the ledger can be persisted.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub custody: Option<serde_json::Value>,
}

/// Trait for persistence providers.
///
/// Uses JSONL (JSON Lines) for the journal. Each line is a self-contained
/// record, so a torn final line loses one trade, not the file.
#[async_trait]
pub trait Repository: Send + Sync + 'static {
  /// Append a trade record to the journal.
  async fn save_trade(&self, record: &TradeRecord) -> anyhow::Result<()>;

  /// Load all trade records, oldest first.
  async fn load_trades(&self) -> anyhow::Result<Vec<TradeRecord>>;

  /// Persist an engine snapshot, replacing the previous one.
  async fn save_snapshot(&self, snapshot: &EngineSnapshot) -> anyhow::Result<()>;

  /// Load the most recent snapshot, if any.
  async fn load_snapshot(&self) -> anyhow::Result<Option<EngineSnapshot>>;

  /// Check if the repository is usable (directory writable).
  async fn is_healthy(&self) -> bool;
}
