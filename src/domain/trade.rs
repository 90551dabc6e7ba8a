//! Core trading domain types.
//!
//! Identifiers, trade direction enums, the `Fill` handed to the custody
//! ledger, and the observability records emitted after every trade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fixed_point::Wad;

// ────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────

/// Market identifier. Each market owns its state namespace exclusively.
pub type MarketId = u64;

/// Externally defined position identifier (sparse, caller-chosen).
pub type PositionId = u64;

/// Trade initiator as known to the custody ledger.
pub type TraderId = String;

/// Amount in base units of the quote currency. Position tokens share this scale:
/// one winning token redeems for one base unit.
pub type Amount = u128;

// ────────────────────────────────────────────
// Enums
// ────────────────────────────────────────────

/// Which side of an outcome a trade backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Backs the outcome occurring.
    Direct,
    /// Backs every other outcome (bets against this one).
    Lay,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => write!(f, "DIRECT"),
            Self::Lay => write!(f, "LAY"),
        }
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

// ────────────────────────────────────────────
// Ledger instruction
// ────────────────────────────────────────────

/// Fund movement the custody ledger must perform for one trade.
///
/// Buys pull `quote_amount` from the trader and mint `tokens`; sells burn
/// `tokens` and release `quote_amount`. `fee` is already included in
/// (buys) or deducted from (sells) `quote_amount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub trader: TraderId,
    pub market_id: MarketId,
    pub position_id: PositionId,
    pub side: Side,
    pub action: TradeSide,
    pub tokens: Amount,
    pub quote_amount: Amount,
    pub fee: Amount,
}

impl Fill {
    pub const fn is_buy(&self) -> bool {
        matches!(self.action, TradeSide::Buy)
    }
}

// ────────────────────────────────────────────
// Observability records
// ────────────────────────────────────────────

/// A completed trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub id: Uuid,
    pub fill: Fill,
    /// Engine clock time of execution (unix seconds).
    pub timestamp: u64,
    pub recorded_at: DateTime<Utc>,
}

/// Direct-side price of a position after a state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub market_id: MarketId,
    pub position_id: PositionId,
    /// Probability in [0, 1].
    pub price: Wad,
    pub timestamp: u64,
}

/// What a trade entry point returns to its caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReceipt {
    pub event: TradeEvent,
    pub price_before: Wad,
    pub price_after: Wad,
}
