//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters, and
//! providing clear error messages for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use tracing::info;

use super::AppConfig;
use crate::domain::fees::BPS_DENOMINATOR;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns a detailed error if the file can't be read, TOML parsing
/// fails, or a validation rule is violated.
pub fn load_config(path: impl AsRef<Path>) -> Result<AppConfig> {
  let path = path.as_ref();

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)?;

  info!(
    service = %config.service.name,
    markets = config.markets.len(),
    fee_bps = config.engine.fee_bps,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
///
/// Market-level rules that need the math (depth, normalization) are left
/// to the engine; this catches what is wrong on its face.
fn validate_config(config: &AppConfig) -> Result<()> {
  let engine = &config.engine;

  anyhow::ensure!(
    engine.fee_bps < BPS_DENOMINATOR,
    "fee_bps must be below {BPS_DENOMINATOR}, got {}",
    engine.fee_bps
  );
  anyhow::ensure!(
    engine.quote_decimals <= 18,
    "quote_decimals must be at most 18, got {}",
    engine.quote_decimals
  );
  anyhow::ensure!(
    engine.min_outcomes >= 2 && engine.min_outcomes <= engine.max_outcomes,
    "outcome limits must satisfy 2 <= min_outcomes <= max_outcomes, got [{}, {}]",
    engine.min_outcomes,
    engine.max_outcomes
  );
  anyhow::ensure!(
    engine.dust_tolerance >= Decimal::ZERO,
    "dust_tolerance must not be negative"
  );

  anyhow::ensure!(
    config.server.max_trades_per_second > 0,
    "max_trades_per_second must be positive"
  );
  anyhow::ensure!(
    !config.persistence.data_dir.is_empty(),
    "persistence data_dir must not be empty"
  );
  anyhow::ensure!(
    config.persistence.snapshot_interval_seconds > 0,
    "snapshot_interval_seconds must be positive"
  );

  let mut ids = HashSet::new();
  for market in &config.markets {
    anyhow::ensure!(ids.insert(market.id), "Market {} is configured twice", market.id);
    anyhow::ensure!(
      market.liability > Decimal::ZERO,
      "Market {} liability must be positive, got {}",
      market.id,
      market.liability
    );
    anyhow::ensure!(
      !market.outcomes.is_empty(),
      "Market {} has no outcomes",
      market.id
    );
    for outcome in &market.outcomes {
      anyhow::ensure!(
        outcome.prior > Decimal::ZERO,
        "Market {} position {} prior must be positive",
        market.id,
        outcome.position
      );
    }
    anyhow::ensure!(
      market.reserve >= Decimal::ZERO,
      "Market {} reserve must not be negative",
      market.id
    );
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use rust_decimal_macros::dec;

  const VALID: &str = r#"
[service]
name = "lmsr-engine"

[engine]
fee_bps = 100
quote_decimals = 6

[server]
bind_address = "127.0.0.1:0"

[persistence]
data_dir = "data"

[[markets]]
id = 1
liability = "1000"
target_outcomes = 2
outcomes = [
  { position = 11, prior = "0.5" },
  { position = 12, prior = "0.5" },
]
"#;

  #[test]
  fn test_load_nonexistent_file() {
    assert!(load_config("nonexistent.toml").is_err());
  }

  #[test]
  fn test_parse_valid_config() {
    let config = parse_config(VALID).unwrap();
    assert_eq!(config.service.log_level, "info");
    assert_eq!(config.engine.fee_bps, 100);
    assert_eq!(config.engine.dust_tolerance, dec!(0.000000000001));
    assert_eq!(config.server.max_trades_per_second, 50);

    let params = config.markets[0].params(config.engine.quote_scale()).unwrap();
    assert_eq!(params.liability, 1_000_000_000);
    assert_eq!(params.outcomes.len(), 2);
    assert!(config.engine.settings().is_ok());
  }

  #[test]
  fn test_rejects_full_fee() {
    let text = VALID.replace("fee_bps = 100", "fee_bps = 10000");
    assert!(parse_config(&text).is_err());
  }

  #[test]
  fn test_rejects_duplicate_markets() {
    let market = &VALID[VALID.find("[[markets]]").unwrap()..];
    let text = format!("{VALID}\n{market}");
    let err = parse_config(&text).unwrap_err();
    assert!(err.to_string().contains("configured twice"));
  }

  #[test]
  fn test_rejects_zero_liability() {
    let text = VALID.replace("liability = \"1000\"", "liability = \"0\"");
    assert!(parse_config(&text).is_err());
  }
}
