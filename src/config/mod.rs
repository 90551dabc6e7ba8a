//! Configuration Module - TOML-based Engine Configuration
//!
//! Loads and validates `config.toml`. Fees, scales, limits and the markets
//! to create on a fresh start are all externalized here; the domain layer
//! never hardcodes them.

pub mod loader;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::domain::error::EngineError;
use crate::domain::fees::FeeSchedule;
use crate::domain::fixed_point::{MathError, QuoteScale, Wad};
use crate::domain::initializer::{MarketParams, OutcomeLimits};
use crate::domain::trade::{MarketId, PositionId};
use crate::usecases::trade_orchestrator::EngineSettings;

/// Top-level service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  pub service: ServiceConfig,
  pub engine: EngineConfig,
  pub server: ServerConfig,
  pub persistence: PersistenceConfig,
  /// Markets created when no snapshot exists.
  #[serde(default)]
  pub markets: Vec<MarketConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  pub name: String,
  /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides.
  #[serde(default = "default_log_level")]
  pub log_level: String,
}

/// Pricing parameters shared by every market.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// Protocol fee in basis points.
  #[serde(default)]
  pub fee_bps: u32,
  /// Decimals of the quote currency (6 for USDC).
  #[serde(default = "default_quote_decimals")]
  pub quote_decimals: u32,
  #[serde(default = "default_min_outcomes")]
  pub min_outcomes: usize,
  #[serde(default = "default_max_outcomes")]
  pub max_outcomes: usize,
  /// Largest prior normalization remainder absorbed silently.
  #[serde(default = "default_dust_tolerance")]
  pub dust_tolerance: Decimal,
}

impl EngineConfig {
  pub const fn quote_scale(&self) -> QuoteScale {
    QuoteScale::new(self.quote_decimals)
  }

  pub fn settings(&self) -> Result<EngineSettings, EngineError> {
    Ok(EngineSettings {
      fees: FeeSchedule::new(self.fee_bps)?,
      limits: OutcomeLimits {
        min: self.min_outcomes,
        max: self.max_outcomes,
      },
      dust_tolerance: Wad::try_from(self.dust_tolerance)?,
    })
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
  /// Global trade submission rate limit.
  #[serde(default = "default_trades_per_second")]
  pub max_trades_per_second: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersistenceConfig {
  /// Directory for the trade journal and `state.json`.
  #[serde(default = "default_data_dir")]
  pub data_dir: String,
  /// Periodic snapshot interval (seconds).
  #[serde(default = "default_snapshot_interval")]
  pub snapshot_interval_seconds: u64,
}

/// One outcome with its prior weight.
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeConfig {
  pub position: PositionId,
  pub prior: Decimal,
}

/// A market to create on a fresh start.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketConfig {
  pub id: MarketId,
  /// Worst-case market maker loss, in whole quote units.
  pub liability: Decimal,
  pub target_outcomes: usize,
  #[serde(default)]
  pub expanding: bool,
  #[serde(default)]
  pub reserve: Decimal,
  pub outcomes: Vec<OutcomeConfig>,
  /// Positions registered in the ledger for later reserve expansion.
  #[serde(default)]
  pub extra_positions: Vec<PositionId>,
}

impl MarketConfig {
  /// Converts to engine units.
  pub fn params(&self, scale: QuoteScale) -> Result<MarketParams, MathError> {
    let outcomes = self
      .outcomes
      .iter()
      .map(|o| Ok((o.position, Wad::try_from(o.prior)?)))
      .collect::<Result<Vec<_>, MathError>>()?;
    Ok(MarketParams {
      market_id: self.id,
      liability: scale.to_units(self.liability)?,
      target_outcomes: self.target_outcomes,
      expanding: self.expanding,
      reserve: Wad::try_from(self.reserve)?,
      outcomes,
    })
  }

  /// Every position the ledger must know for this market.
  pub fn all_positions(&self) -> impl Iterator<Item = PositionId> + '_ {
    self
      .outcomes
      .iter()
      .map(|o| o.position)
      .chain(self.extra_positions.iter().copied())
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_quote_decimals() -> u32 {
  6
}

fn default_min_outcomes() -> usize {
  2
}

fn default_max_outcomes() -> usize {
  256
}

fn default_dust_tolerance() -> Decimal {
  // 1e-12
  Decimal::new(1, 12)
}

fn default_bind_address() -> String {
  "0.0.0.0:8080".to_string()
}

fn default_trades_per_second() -> u32 {
  50
}

fn default_data_dir() -> String {
  "data".to_string()
}

fn default_snapshot_interval() -> u64 {
  60
}
