//! HTTP API Request/Response Types
//!
//! Quote-currency and token amounts travel as decimals in whole units and
//! are converted to base units with the configured `QuoteScale`.
//! Probabilities are WAD decimal strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::fixed_point::Wad;
use crate::domain::trade::{MarketId, PositionId, Side, TraderId};

/// Which amount of a trade is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeMode {
  /// `amount` tokens; `limit` is the maximum fee-inclusive cost.
  BuyTokens,
  /// `amount` quote currency; `limit` is the minimum tokens received.
  BuySpend,
  /// `amount` tokens; `limit` is the minimum net proceeds.
  SellTokens,
}

/// `POST /markets/:id/trades`
#[derive(Debug, Clone, Deserialize)]
pub struct TradeBody {
  pub trader: TraderId,
  pub position_id: PositionId,
  pub side: Side,
  pub mode: TradeMode,
  pub amount: Decimal,
  #[serde(default)]
  pub limit: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TradeResponse {
  pub trade_id: String,
  pub tokens: Decimal,
  pub quote_amount: Decimal,
  pub fee: Decimal,
  pub price_before: Wad,
  pub price_after: Wad,
  pub timestamp: u64,
}

/// `POST /markets/:id/outcomes`
#[derive(Debug, Clone, Deserialize)]
pub struct ExpandBody {
  pub position_id: PositionId,
  /// Share of the current reserve, in (0, 1].
  pub fraction: Wad,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpandResponse {
  pub position_id: PositionId,
  pub slot: usize,
  pub price: Wad,
  pub reserve_price: Wad,
}

/// `POST /accounts/:trader/deposit`
#[derive(Debug, Clone, Deserialize)]
pub struct DepositBody {
  pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
  pub trader: TraderId,
  pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeView {
  pub position_id: PositionId,
  pub price: Wad,
  /// Cumulative price integral as of `timestamp`, for TWAP derivation.
  pub twap_cumulative: Wad,
}

/// `GET /markets/:id`
#[derive(Debug, Clone, Serialize)]
pub struct MarketView {
  pub market_id: MarketId,
  pub depth: Decimal,
  pub expanding: bool,
  pub reserve_price: Wad,
  /// `ln Z`; `Z` itself outgrows fixed point on long-lived markets.
  pub log_aggregate: Wad,
  pub outcomes: Vec<OutcomeView>,
  pub timestamp: u64,
}

/// Error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
  pub error: String,
  pub message: String,
}
