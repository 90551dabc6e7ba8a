//! Engine error taxonomy.
//!
//! Every failure aborts the whole operation; nothing is retried internally.
//! Variants are grouped the way callers react to them: listing problems,
//! math domain violations, broken invariants, caller bounds, and
//! market configuration.

use thiserror::Error;

use super::fixed_point::{MathError, Wad};
use super::trade::{MarketId, PositionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    // ── Listing ──────────────────────────────────
    #[error("market {0} does not exist")]
    UnknownMarket(MarketId),
    #[error("market {0} already exists")]
    MarketExists(MarketId),
    #[error("position {position} is not listed in market {market}")]
    PositionNotListed { market: MarketId, position: PositionId },
    #[error("position {position} is already listed in market {market}")]
    PositionAlreadyListed { market: MarketId, position: PositionId },
    #[error("position {position} does not exist in the ledger for market {market}")]
    UnknownPosition { market: MarketId, position: PositionId },

    // ── Math domain ──────────────────────────────
    #[error("math domain violation: {0}")]
    Domain(&'static str),
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("trade amount must be non-zero")]
    ZeroAmount,
    #[error("trade is too small to move any tokens")]
    DustTrade,

    // ── Invariants ───────────────────────────────
    #[error("invariant violated: {0}")]
    Invariant(&'static str),

    // ── Caller bounds ────────────────────────────
    #[error("cost {cost} exceeds the maximum of {max_cost}")]
    MaxCostExceeded { cost: u128, max_cost: u128 },
    #[error("output {output} is below the minimum of {min_output}")]
    MinOutputNotMet { output: u128, min_output: u128 },
    #[error("TWAP window must end after it starts ({start} >= {end})")]
    TwapWindow { start: u64, end: u64 },

    // ── Configuration ────────────────────────────
    #[error("outcome count {count} outside accepted range [{min}, {max}]")]
    InvalidOutcomeCount { count: usize, min: usize, max: usize },
    #[error("liquidity depth must be strictly positive")]
    NonPositiveDepth,
    #[error("prior mass {0} must be strictly positive")]
    NonPositivePrior(Wad),
    #[error("reserve configuration invalid: {0}")]
    ReserveMismatch(&'static str),
    #[error("normalization dust {dust} exceeds tolerance {tolerance}")]
    NormalizationDust { dust: Wad, tolerance: Wad },
    #[error("expansion fraction {0} must lie in (0, 1]")]
    InvalidFraction(Wad),
    #[error("fee of {0} bps must be below 10000")]
    InvalidFee(u32),

    // ── External collaborator ────────────────────
    #[error("ledger rejected the trade: {0}")]
    Ledger(String),
}

impl EngineError {
    /// Short machine-readable category, used for metrics labels.
    pub const fn category(&self) -> &'static str {
        match self {
            Self::UnknownMarket(_)
            | Self::MarketExists(_)
            | Self::PositionNotListed { .. }
            | Self::PositionAlreadyListed { .. }
            | Self::UnknownPosition { .. } => "listing",
            Self::Domain(_) | Self::Math(_) | Self::ZeroAmount | Self::DustTrade => "domain",
            Self::Invariant(_) => "invariant",
            Self::MaxCostExceeded { .. } | Self::MinOutputNotMet { .. } | Self::TwapWindow { .. } => {
                "bounds"
            }
            Self::InvalidOutcomeCount { .. }
            | Self::NonPositiveDepth
            | Self::NonPositivePrior(_)
            | Self::ReserveMismatch(_)
            | Self::NormalizationDust { .. }
            | Self::InvalidFraction(_)
            | Self::InvalidFee(_) => "config",
            Self::Ledger(_) => "ledger",
        }
    }
}
