//! HTTP API Server - Engine Entry Points over axum
//!
//! Routes:
//! - `GET  /markets`                  listed market ids
//! - `GET  /markets/:id`              prices, reserve, TWAP cumulatives
//! - `GET  /markets/:id/twap/:pos`    single TWAP checkpoint
//! - `POST /markets/:id/trades`       rate-limited trade submission
//! - `POST /markets/:id/outcomes`     reserve expansion
//! - `POST /accounts/:trader/deposit` credit quote currency
//! - `GET  /metrics`, `/live`, `/ready`
//!
//! The engine sits behind one async mutex, which serializes every
//! state-changing call.

use std::num::NonZeroU32;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, broadcast};
use tracing::{info, instrument};

use super::error::ApiError;
use super::types::{
  BalanceResponse, DepositBody, ExpandBody, ExpandResponse, MarketView, OutcomeView, TradeBody,
  TradeMode, TradeResponse,
};
use crate::adapters::ledger::InMemoryLedger;
use crate::adapters::metrics::{HealthState, MetricsRegistry, health};
use crate::domain::fixed_point::QuoteScale;
use crate::domain::trade::{Amount, MarketId, PositionId, TraderId};
use crate::domain::twap::TwapObservation;
use crate::ports::clock::Clock;
use crate::usecases::trade_orchestrator::{OrderKind, TradeOrchestrator, TradeRequest};

pub type TradeLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;
pub type SharedEngine<C> = Arc<Mutex<TradeOrchestrator<InMemoryLedger, C>>>;

/// State shared by all handlers.
pub struct ApiState<C: Clock> {
  pub engine: SharedEngine<C>,
  pub metrics: Arc<MetricsRegistry>,
  pub limiter: Arc<TradeLimiter>,
  pub scale: QuoteScale,
}

impl<C: Clock> Clone for ApiState<C> {
  fn clone(&self) -> Self {
    Self {
      engine: Arc::clone(&self.engine),
      metrics: Arc::clone(&self.metrics),
      limiter: Arc::clone(&self.limiter),
      scale: self.scale,
    }
  }
}

impl<C: Clock> ApiState<C> {
  /// Builds handler state with a trade limiter of `trades_per_second`.
  pub fn new(
    engine: SharedEngine<C>,
    metrics: Arc<MetricsRegistry>,
    scale: QuoteScale,
    trades_per_second: u32,
  ) -> anyhow::Result<Self> {
    let rate = NonZeroU32::new(trades_per_second).context("trade rate limit must be positive")?;
    Ok(Self {
      engine,
      metrics,
      limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
      scale,
    })
  }

  fn units(&self, amount: Decimal) -> Result<Amount, ApiError> {
    self
      .scale
      .to_units(amount)
      .map_err(|_| ApiError::BadRequest(format!("amount {amount} is not representable")))
  }
}

/// Full application router.
pub fn router<C: Clock + 'static>(state: ApiState<C>, health: Arc<HealthState>) -> Router {
  Router::new()
    .route("/markets", get(list_markets::<C>))
    .route("/markets/:id", get(get_market::<C>))
    .route("/markets/:id/twap/:position", get(get_twap::<C>))
    .route("/markets/:id/trades", post(submit_trade::<C>))
    .route("/markets/:id/outcomes", post(expand_market::<C>))
    .route("/accounts/:trader/deposit", post(deposit::<C>))
    .route("/metrics", get(metrics::<C>))
    .with_state(state)
    .merge(health::router(health))
}

/// Serve the API until the shutdown signal fires.
#[instrument(skip(app, shutdown_rx))]
pub async fn serve(
  app: Router,
  bind_address: String,
  mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
  let listener = tokio::net::TcpListener::bind(&bind_address)
    .await
    .with_context(|| format!("Failed to bind {bind_address}"))?;
  info!(address = %bind_address, "API server started");

  axum::serve(listener, app)
    .with_graceful_shutdown(async move {
      let _ = shutdown_rx.recv().await;
    })
    .await?;

  info!("API server stopped");
  Ok(())
}

async fn list_markets<C: Clock + 'static>(State(state): State<ApiState<C>>) -> Json<Vec<MarketId>> {
  Json(state.engine.lock().await.market_ids())
}

async fn get_market<C: Clock + 'static>(
  State(state): State<ApiState<C>>,
  Path(market_id): Path<MarketId>,
) -> Result<Json<MarketView>, ApiError> {
  let engine = state.engine.lock().await;
  let market = engine.market(market_id)?;

  let mut outcomes = Vec::with_capacity(market.outcome_count());
  for (position_id, price) in engine.prices(market_id)? {
    let twap = engine.twap_observation(market_id, position_id)?;
    outcomes.push(OutcomeView {
      position_id,
      price,
      twap_cumulative: twap.cumulative,
    });
  }

  Ok(Json(MarketView {
    market_id,
    depth: Decimal::try_from_i128_with_scale(market.depth(), state.scale.decimals())
      .map_err(|e| ApiError::Internal(e.into()))?,
    expanding: market.is_expanding(),
    reserve_price: market.reserve_price()?,
    log_aggregate: market.log_aggregate()?,
    outcomes,
    timestamp: engine.clock().now(),
  }))
}

async fn get_twap<C: Clock + 'static>(
  State(state): State<ApiState<C>>,
  Path((market_id, position_id)): Path<(MarketId, PositionId)>,
) -> Result<Json<TwapObservation>, ApiError> {
  let engine = state.engine.lock().await;
  Ok(Json(engine.twap_observation(market_id, position_id)?))
}

async fn submit_trade<C: Clock + 'static>(
  State(state): State<ApiState<C>>,
  Path(market_id): Path<MarketId>,
  Json(body): Json<TradeBody>,
) -> Result<Json<TradeResponse>, ApiError> {
  if state.limiter.check().is_err() {
    return Err(ApiError::RateLimited);
  }

  let amount = state.units(body.amount)?;
  let limit = body.limit.map(|l| state.units(l)).transpose()?;
  let kind = match body.mode {
    TradeMode::BuyTokens => OrderKind::BuyExactTokens {
      tokens: amount,
      max_cost: limit.unwrap_or(Amount::MAX),
    },
    TradeMode::BuySpend => OrderKind::BuyExactSpend {
      spend: amount,
      min_tokens: limit.unwrap_or_default(),
    },
    TradeMode::SellTokens => OrderKind::SellExactTokens {
      tokens: amount,
      min_proceeds: limit.unwrap_or_default(),
    },
  };
  let request = TradeRequest {
    trader: body.trader,
    market_id,
    position_id: body.position_id,
    side: body.side,
    kind,
  };

  let receipt = state.engine.lock().await.execute(&request)?;
  let fill = &receipt.event.fill;
  Ok(Json(TradeResponse {
    trade_id: receipt.event.id.to_string(),
    tokens: state.scale.to_decimal(fill.tokens),
    quote_amount: state.scale.to_decimal(fill.quote_amount),
    fee: state.scale.to_decimal(fill.fee),
    price_before: receipt.price_before,
    price_after: receipt.price_after,
    timestamp: receipt.event.timestamp,
  }))
}

async fn expand_market<C: Clock + 'static>(
  State(state): State<ApiState<C>>,
  Path(market_id): Path<MarketId>,
  Json(body): Json<ExpandBody>,
) -> Result<Json<ExpandResponse>, ApiError> {
  let mut engine = state.engine.lock().await;
  let expansion = engine.expand_reserve(market_id, body.position_id, body.fraction)?;
  Ok(Json(ExpandResponse {
    position_id: expansion.position,
    slot: expansion.slot,
    price: engine.price(market_id, expansion.position)?,
    reserve_price: engine.reserve_price(market_id)?,
  }))
}

async fn deposit<C: Clock + 'static>(
  State(state): State<ApiState<C>>,
  Path(trader): Path<TraderId>,
  Json(body): Json<DepositBody>,
) -> Result<Json<BalanceResponse>, ApiError> {
  let amount = state.units(body.amount)?;
  if amount == 0 {
    return Err(ApiError::BadRequest("deposit must be positive".to_string()));
  }
  let balance = state.engine.lock().await.ledger_mut().deposit(&trader, amount)?;
  info!(trader = %trader, amount, balance, "Deposit credited");
  Ok(Json(BalanceResponse {
    trader,
    balance: state.scale.to_decimal(balance),
  }))
}

async fn metrics<C: Clock + 'static>(State(state): State<ApiState<C>>) -> Result<String, ApiError> {
  Ok(state.metrics.render()?)
}
