//! Trade Orchestrator - Externally Callable Engine Surface
//!
//! Sequences every state-changing operation:
//! 1. TWAP pre-settlement, quote, bounds check, planned state update
//!    (all fallible, computed against unmodified state)
//! 2. Custody ledger settlement of the resulting `Fill`
//! 3. Commit: TWAP settlement, state update, TWAP re-baseline, and a TWAP
//!    rebase when the update renormalized the masses (infallible)
//! 4. Event fan-out and structured logging
//!
//! A failure in steps 1-2 leaves no trace. The ledger is owned by the
//! orchestrator and only ever sees the `Fill`, so it cannot re-enter the
//! engine while a trade is pending.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::error::EngineError;
use crate::domain::expansion::{self, Expansion};
use crate::domain::fees::FeeSchedule;
use crate::domain::fixed_point::Wad;
use crate::domain::initializer::{self, MarketParams, OutcomeLimits};
use crate::domain::market::MarketState;
use crate::domain::quote::{self, Quote};
use crate::domain::state_update::{self, StateTransition};
use crate::domain::trade::{
  Amount, Fill, MarketId, PositionId, PriceUpdate, Side, TradeEvent, TradeReceipt, TraderId,
};
use crate::domain::twap::{TwapObservation, TwapRebase, TwapSettlement, TwapState};
use crate::ports::clock::Clock;
use crate::ports::events::EventSink;
use crate::ports::ledger::Ledger;
use crate::ports::repository::{EngineSnapshot, MarketSnapshot};

/// Snapshot format version.
pub const SNAPSHOT_VERSION: &str = "2";

/// Engine-wide trading parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
  pub fees: FeeSchedule,
  pub limits: OutcomeLimits,
  /// Largest rounding remainder `normalize_priors` may absorb.
  pub dust_tolerance: Wad,
}

impl Default for EngineSettings {
  fn default() -> Self {
    Self {
      fees: FeeSchedule::zero(),
      limits: OutcomeLimits::default(),
      dust_tolerance: Wad::from_raw(1_000_000),
    }
  }
}

/// What a trade asks for, and the caller's slippage bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
  /// Buy exactly `tokens`, paying at most `max_cost` (fee included).
  BuyExactTokens { tokens: Amount, max_cost: Amount },
  /// Spend exactly `spend` (fee included), receiving at least `min_tokens`.
  BuyExactSpend { spend: Amount, min_tokens: Amount },
  /// Sell exactly `tokens`, receiving at least `min_proceeds` (after fee).
  SellExactTokens { tokens: Amount, min_proceeds: Amount },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRequest {
  pub trader: TraderId,
  pub market_id: MarketId,
  pub position_id: PositionId,
  pub side: Side,
  pub kind: OrderKind,
}

/// Fully validated trade waiting for ledger settlement.
#[derive(Debug, Clone)]
struct PendingTrade {
  fill: Fill,
  timestamp: u64,
  price_before: Wad,
  twap: TwapSettlement,
  rebase: Option<TwapRebase>,
  transition: StateTransition,
}

#[derive(Debug, Clone)]
struct MarketRecord {
  state: MarketState,
  twap: TwapState,
}

/// Single entry point for trading, market creation and expansion.
pub struct TradeOrchestrator<L: Ledger, C: Clock> {
  ledger: L,
  clock: C,
  settings: EngineSettings,
  markets: HashMap<MarketId, MarketRecord>,
  sinks: Vec<Arc<dyn EventSink>>,
}

impl<L: Ledger, C: Clock> TradeOrchestrator<L, C> {
  pub fn new(ledger: L, clock: C, settings: EngineSettings) -> Self {
    Self {
      ledger,
      clock,
      settings,
      markets: HashMap::new(),
      sinks: Vec::new(),
    }
  }

  /// Registers an observer for committed trades and price changes.
  pub fn add_sink(&mut self, sink: Arc<dyn EventSink>) {
    self.sinks.push(sink);
  }

  pub const fn settings(&self) -> &EngineSettings {
    &self.settings
  }

  pub const fn ledger(&self) -> &L {
    &self.ledger
  }

  /// Direct ledger access for funding and custody administration.
  pub fn ledger_mut(&mut self) -> &mut L {
    &mut self.ledger
  }

  pub const fn clock(&self) -> &C {
    &self.clock
  }

  // ────────────────────────────────────────────
  // Market lifecycle
  // ────────────────────────────────────────────

  /// Initializes a market. Positions must already exist in the ledger.
  #[instrument(skip(self, params), fields(market = params.market_id, outcomes = params.outcomes.len()))]
  pub fn create_market(&mut self, params: &MarketParams) -> Result<(), EngineError> {
    if self.markets.contains_key(&params.market_id) {
      return Err(EngineError::MarketExists(params.market_id));
    }
    let ledger = &self.ledger;
    let state = initializer::initialize(
      params,
      &self.settings.limits,
      self.settings.dust_tolerance,
      |position| ledger.position_exists(params.market_id, position),
    )?;
    let now = self.clock.now();

    info!(
      depth = state.depth(),
      reserve = %state.reserve_mass(),
      expanding = state.is_expanding(),
      "Market created"
    );
    for (slot, position) in state.positions() {
      if let Ok(price) = state.price(slot) {
        self.publish_price(PriceUpdate {
          market_id: params.market_id,
          position_id: position,
          price,
          timestamp: now,
        });
      }
    }

    self.markets.insert(
      params.market_id,
      MarketRecord {
        state,
        twap: TwapState::started_at(now),
      },
    );
    Ok(())
  }

  /// Lists `position` with `fraction` of the market's reserve mass.
  #[instrument(skip(self), fields(fraction = %fraction))]
  pub fn expand_reserve(
    &mut self,
    market_id: MarketId,
    position: PositionId,
    fraction: Wad,
  ) -> Result<Expansion, EngineError> {
    let now = self.clock.now();
    let ledger = &self.ledger;
    let record = self
      .markets
      .get_mut(&market_id)
      .ok_or(EngineError::UnknownMarket(market_id))?;

    let exists = |id| ledger.position_exists(market_id, id);
    expansion::plan_expansion(&record.state, position, fraction, exists)?;
    // The new slot joins at the current integral.
    record.twap.accrue(&record.state, now)?;
    let expansion = expansion::expand_reserve(&mut record.state, position, fraction, exists)?;
    record.twap.update_after_price_change(expansion.slot);
    let price = record.state.price(expansion.slot)?;

    info!(
      slot = expansion.slot,
      mass = %expansion.mass,
      reserve_after = %expansion.reserve_after,
      "Reserve expanded"
    );
    self.publish_price(PriceUpdate {
      market_id,
      position_id: position,
      price,
      timestamp: now,
    });
    Ok(expansion)
  }

  // ────────────────────────────────────────────
  // Trading
  // ────────────────────────────────────────────

  /// Buys exactly `tokens`, failing if the fee-inclusive cost exceeds `max_cost`.
  pub fn buy(
    &mut self,
    trader: &str,
    market_id: MarketId,
    position_id: PositionId,
    side: Side,
    tokens: Amount,
    max_cost: Amount,
  ) -> Result<TradeReceipt, EngineError> {
    self.execute(&TradeRequest {
      trader: trader.to_string(),
      market_id,
      position_id,
      side,
      kind: OrderKind::BuyExactTokens { tokens, max_cost },
    })
  }

  /// Spends exactly `spend`, failing if it buys fewer than `min_tokens`.
  pub fn buy_for_spend(
    &mut self,
    trader: &str,
    market_id: MarketId,
    position_id: PositionId,
    side: Side,
    spend: Amount,
    min_tokens: Amount,
  ) -> Result<TradeReceipt, EngineError> {
    self.execute(&TradeRequest {
      trader: trader.to_string(),
      market_id,
      position_id,
      side,
      kind: OrderKind::BuyExactSpend { spend, min_tokens },
    })
  }

  /// Sells exactly `tokens`, failing if net proceeds fall below `min_proceeds`.
  pub fn sell(
    &mut self,
    trader: &str,
    market_id: MarketId,
    position_id: PositionId,
    side: Side,
    tokens: Amount,
    min_proceeds: Amount,
  ) -> Result<TradeReceipt, EngineError> {
    self.execute(&TradeRequest {
      trader: trader.to_string(),
      market_id,
      position_id,
      side,
      kind: OrderKind::SellExactTokens { tokens, min_proceeds },
    })
  }

  /// Runs one trade to completion or not at all.
  #[instrument(
    skip(self, request),
    fields(
      market = request.market_id,
      position = request.position_id,
      side = %request.side,
      trader = %request.trader,
    )
  )]
  pub fn execute(&mut self, request: &TradeRequest) -> Result<TradeReceipt, EngineError> {
    let pending = match self.prepare(request) {
      Ok(pending) => pending,
      Err(e) => return Err(self.reject(request.market_id, e)),
    };

    let settled = if pending.fill.is_buy() {
      self.ledger.settle_buy(&pending.fill)
    } else {
      self.ledger.settle_sell(&pending.fill)
    };
    if let Err(e) = settled {
      return Err(self.reject(request.market_id, EngineError::Ledger(format!("{e:#}"))));
    }

    Ok(self.commit(pending))
  }

  fn prepare(&self, request: &TradeRequest) -> Result<PendingTrade, EngineError> {
    let record = self.record(request.market_id)?;
    let state = &record.state;
    let slot = state.slot_of(request.position_id)?;
    let now = self.clock.now();
    let twap = record.twap.preview_before(state, slot, now)?;
    let fees = &self.settings.fees;

    let quote = match request.kind {
      OrderKind::BuyExactTokens { tokens, max_cost } => {
        let q = quote::quote_buy_exact_tokens(state, request.position_id, request.side, tokens, fees)?;
        if q.total > max_cost {
          return Err(EngineError::MaxCostExceeded {
            cost: q.total,
            max_cost,
          });
        }
        q
      }
      OrderKind::BuyExactSpend { spend, min_tokens } => {
        let q = quote::quote_buy_exact_spend(state, request.position_id, request.side, spend, fees)?;
        if q.tokens < min_tokens {
          return Err(EngineError::MinOutputNotMet {
            output: q.tokens,
            min_output: min_tokens,
          });
        }
        q
      }
      OrderKind::SellExactTokens {
        tokens,
        min_proceeds,
      } => {
        let q = quote::quote_sell_exact_tokens(state, request.position_id, request.side, tokens, fees)?;
        if q.total < min_proceeds {
          return Err(EngineError::MinOutputNotMet {
            output: q.total,
            min_output: min_proceeds,
          });
        }
        q
      }
    };

    let transition = state_update::plan(state, slot, quote.side, quote.action, quote.tokens)?;
    let rebase = if transition.renormalizes() {
      Some(record.twap.preview_rebase(state, &twap)?)
    } else {
      None
    };
    debug!(
      tokens = quote.tokens,
      cost = quote.total,
      fee = quote.fee,
      renormalizes = transition.renormalizes(),
      "Trade prepared"
    );

    Ok(PendingTrade {
      fill: Fill {
        trader: request.trader.clone(),
        market_id: request.market_id,
        position_id: request.position_id,
        side: quote.side,
        action: quote.action,
        tokens: quote.tokens,
        quote_amount: quote.total,
        fee: quote.fee,
      },
      timestamp: now,
      price_before: state.price(slot)?,
      twap,
      rebase,
      transition,
    })
  }

  fn commit(&mut self, pending: PendingTrade) -> TradeReceipt {
    let PendingTrade {
      fill,
      timestamp,
      price_before,
      twap,
      rebase,
      transition,
    } = pending;
    let price_after = transition.price;

    // Resolved by `prepare`; markets are never removed.
    let record = self.markets.get_mut(&fill.market_id);
    debug_assert!(record.is_some(), "market {} vanished mid-trade", fill.market_id);
    if let Some(record) = record {
      record.twap.apply(&twap);
      state_update::apply(&mut record.state, &transition);
      record.twap.update_after_price_change(transition.slot);
      if let Some(rebase) = &rebase {
        record.twap.rebase(rebase);
      }
    }
    if transition.renormalizes() {
      debug!(
        market = fill.market_id,
        shift = ?transition.renormalization,
        "Masses renormalized"
      );
    }

    let event = TradeEvent {
      id: Uuid::new_v4(),
      fill,
      timestamp,
      recorded_at: Utc::now(),
    };
    let update = PriceUpdate {
      market_id: event.fill.market_id,
      position_id: event.fill.position_id,
      price: price_after,
      timestamp,
    };
    for sink in &self.sinks {
      sink.on_trade(&event);
      sink.on_price(&update);
    }

    info!(
      trade_id = %event.id,
      action = %event.fill.action,
      tokens = event.fill.tokens,
      cost = event.fill.quote_amount,
      fee = event.fill.fee,
      price_before = %price_before,
      price_after = %price_after,
      "Trade executed"
    );

    TradeReceipt {
      event,
      price_before,
      price_after,
    }
  }

  fn reject(&self, market_id: MarketId, error: EngineError) -> EngineError {
    warn!(error = %error, category = error.category(), "Trade rejected");
    for sink in &self.sinks {
      sink.on_rejected(market_id, &error);
    }
    error
  }

  fn publish_price(&self, update: PriceUpdate) {
    for sink in &self.sinks {
      sink.on_price(&update);
    }
  }

  // ────────────────────────────────────────────
  // Views
  // ────────────────────────────────────────────

  fn record(&self, market_id: MarketId) -> Result<&MarketRecord, EngineError> {
    self
      .markets
      .get(&market_id)
      .ok_or(EngineError::UnknownMarket(market_id))
  }

  pub fn market(&self, market_id: MarketId) -> Result<&MarketState, EngineError> {
    Ok(&self.record(market_id)?.state)
  }

  /// Market identifiers in ascending order.
  pub fn market_ids(&self) -> Vec<MarketId> {
    let mut ids: Vec<MarketId> = self.markets.keys().copied().collect();
    ids.sort_unstable();
    ids
  }

  pub fn quote_buy(
    &self,
    market_id: MarketId,
    position_id: PositionId,
    side: Side,
    tokens: Amount,
  ) -> Result<Quote, EngineError> {
    let state = self.market(market_id)?;
    quote::quote_buy_exact_tokens(state, position_id, side, tokens, &self.settings.fees)
  }

  pub fn quote_buy_for_spend(
    &self,
    market_id: MarketId,
    position_id: PositionId,
    side: Side,
    spend: Amount,
  ) -> Result<Quote, EngineError> {
    let state = self.market(market_id)?;
    quote::quote_buy_exact_spend(state, position_id, side, spend, &self.settings.fees)
  }

  pub fn quote_sell(
    &self,
    market_id: MarketId,
    position_id: PositionId,
    side: Side,
    tokens: Amount,
  ) -> Result<Quote, EngineError> {
    let state = self.market(market_id)?;
    quote::quote_sell_exact_tokens(state, position_id, side, tokens, &self.settings.fees)
  }

  /// Current direct-side price of `position_id`.
  pub fn price(&self, market_id: MarketId, position_id: PositionId) -> Result<Wad, EngineError> {
    let state = self.market(market_id)?;
    state.price(state.slot_of(position_id)?)
  }

  /// Direct-side prices of every listed position, in slot order.
  pub fn prices(&self, market_id: MarketId) -> Result<Vec<(PositionId, Wad)>, EngineError> {
    let state = self.market(market_id)?;
    state
      .positions()
      .map(|(slot, position)| Ok((position, state.price(slot)?)))
      .collect()
  }

  pub fn reserve_price(&self, market_id: MarketId) -> Result<Wad, EngineError> {
    self.market(market_id)?.reserve_price()
  }

  /// Diagnostic aggregate `Z = G · S`.
  pub fn aggregate(&self, market_id: MarketId) -> Result<Wad, EngineError> {
    self.market(market_id)?.aggregate()
  }

  /// `ln Z`, representable however much has traded.
  pub fn log_aggregate(&self, market_id: MarketId) -> Result<Wad, EngineError> {
    self.market(market_id)?.log_aggregate()
  }

  /// Cumulative price checkpoint of `position_id` as of now.
  pub fn twap_observation(
    &self,
    market_id: MarketId,
    position_id: PositionId,
  ) -> Result<TwapObservation, EngineError> {
    let record = self.record(market_id)?;
    let slot = record.state.slot_of(position_id)?;
    record.twap.observe(&record.state, slot, self.clock.now())
  }

  // ────────────────────────────────────────────
  // Recovery
  // ────────────────────────────────────────────

  /// Captures every market. Custody is left out; see [`Self::checkpoint`].
  pub fn snapshot(&self) -> EngineSnapshot {
    let markets = self
      .market_ids()
      .into_iter()
      .filter_map(|id| self.markets.get(&id))
      .map(|record| MarketSnapshot {
        state: record.state.clone(),
        twap: record.twap.clone(),
      })
      .collect();
    EngineSnapshot {
      version: SNAPSHOT_VERSION.to_string(),
      timestamp: self.clock.now(),
      fee_bps: self.settings.fees.bps(),
      dust_tolerance: self.settings.dust_tolerance,
      markets,
      custody: None,
    }
  }

  /// Replaces all markets with those of `snapshot`.
  pub fn restore(&mut self, snapshot: EngineSnapshot) -> anyhow::Result<()> {
    anyhow::ensure!(
      snapshot.version == SNAPSHOT_VERSION,
      "unsupported snapshot version {}",
      snapshot.version
    );
    if snapshot.fee_bps != self.settings.fees.bps() {
      warn!(
        snapshot_fee_bps = snapshot.fee_bps,
        configured_fee_bps = self.settings.fees.bps(),
        "Snapshot was taken under a different fee"
      );
    }

    let mut markets = HashMap::with_capacity(snapshot.markets.len());
    for MarketSnapshot { state, twap } in snapshot.markets {
      anyhow::ensure!(
        state.total_mass().is_positive(),
        "market {} has non-positive total mass",
        state.market_id()
      );
      anyhow::ensure!(
        markets
          .insert(state.market_id(), MarketRecord { state, twap })
          .is_none(),
        "duplicate market in snapshot"
      );
    }
    info!(markets = markets.len(), "Engine state restored");
    self.markets = markets;
    Ok(())
  }
}

impl<L, C> TradeOrchestrator<L, C>
where
  L: Ledger + Serialize + DeserializeOwned,
  C: Clock,
{
  /// Captures every market together with the custody ledger, so balances
  /// and holdings come back consistent with the prices they moved.
  pub fn checkpoint(&self) -> anyhow::Result<EngineSnapshot> {
    let mut snapshot = self.snapshot();
    snapshot.custody =
      Some(serde_json::to_value(&self.ledger).context("Failed to serialize custody ledger")?);
    Ok(snapshot)
  }

  /// Restores markets and custody from a [`Self::checkpoint`]. Nothing is
  /// replaced unless both parts are valid.
  pub fn recover(&mut self, mut snapshot: EngineSnapshot) -> anyhow::Result<()> {
    let custody = snapshot
      .custody
      .take()
      .context("snapshot carries no custody ledger")?;
    let ledger: L = serde_json::from_value(custody).context("Failed to parse custody ledger")?;
    self.restore(snapshot)?;
    self.ledger = ledger;
    info!("Custody ledger restored");
    Ok(())
  }
}
