//! Reserve-to-outcome expansion.
//!
//! Lists a new outcome by moving `α · R_reserve` out of the reserve into a
//! fresh slot. `S`, `G` and every existing mass stay as they were, so no
//! existing price moves.

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::fixed_point::{Rounding, Wad};
use super::market::MarketState;
use super::trade::PositionId;

/// Result of a completed expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expansion {
    pub position: PositionId,
    pub slot: usize,
    pub mass: Wad,
    pub reserve_after: Wad,
}

/// Mass the new outcome would receive, without listing it.
pub fn plan_expansion(
    market: &MarketState,
    position: PositionId,
    fraction: Wad,
    position_exists: impl Fn(PositionId) -> bool,
) -> Result<Wad, EngineError> {
    if !fraction.is_positive() || fraction > Wad::ONE {
        return Err(EngineError::InvalidFraction(fraction));
    }
    if !market.is_expanding() {
        return Err(EngineError::ReserveMismatch("market does not accept new outcomes"));
    }
    let reserve = market.reserve_mass();
    if !reserve.is_positive() {
        return Err(EngineError::ReserveMismatch("reserve is exhausted"));
    }
    if !position_exists(position) {
        return Err(EngineError::UnknownPosition {
            market: market.market_id(),
            position,
        });
    }
    if market.is_listed(position) {
        return Err(EngineError::PositionAlreadyListed {
            market: market.market_id(),
            position,
        });
    }

    let mass = reserve.mul_rounded(fraction, Rounding::Down)?;
    if !mass.is_positive() {
        return Err(EngineError::DustTrade);
    }
    Ok(mass)
}

/// Moves a fraction of the reserve into a newly listed `position`.
pub fn expand_reserve(
    market: &mut MarketState,
    position: PositionId,
    fraction: Wad,
    position_exists: impl Fn(PositionId) -> bool,
) -> Result<Expansion, EngineError> {
    let mass = plan_expansion(market, position, fraction, position_exists)?;
    let reserve_after = market.reserve_mass().checked_sub(mass)?;
    let slot = market.list(position, mass)?;
    market.set_reserve_mass(reserve_after);
    Ok(Expansion {
        position,
        slot,
        mass,
        reserve_after,
    })
}
