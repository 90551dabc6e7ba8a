//! O(1) post-trade state correction.
//!
//! A trade moves two utility deltas: `dU_k` on the traded outcome and
//! `dU_rest` on every other outcome (reserve included).
//!
//! | trade      | dU_rest | dU_k |
//! |------------|---------|------|
//! | direct buy | 0       | +t   |
//! | direct sell| 0       | -t   |
//! | lay buy    | +t      | 0    |
//! | lay sell   | -t      | 0    |
//!
//! Rather than rescaling every slot, the engine adds `dU_rest/b` to `ln G`
//! and applies `χ_R = e^((dU_k - dU_rest)/b)` to the traded slot, then
//! patches `S` with the slot's difference. When the patched `S` leaves the
//! safe band every mass is shifted back towards one; that step is O(n) but
//! needs a net move of many times `b` between two occurrences.
//!
//! Planning is fallible and side-effect free; applying a plan cannot fail.
//! The orchestrator relies on that split to keep trades atomic.

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::fixed_point::Wad;
use super::market::{MarketState, renormalization_shift, rescaled, rescaled_mass, shift_log};
use super::quote::exponent;
use super::trade::{Amount, Side, TradeSide};

/// Fully computed outcome of a state update, not yet written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub slot: usize,
    pub log_global_factor: Wad,
    /// Traded slot's mass, after any renormalization.
    pub mass: Wad,
    /// `S` after the trade, after any renormalization.
    pub total_mass: Wad,
    /// Power of two every other mass is divided by, when `S` left the band.
    pub renormalization: Option<i32>,
    /// Direct-side price of the traded slot once applied.
    pub price: Wad,
}

impl StateTransition {
    pub const fn renormalizes(&self) -> bool {
        self.renormalization.is_some()
    }
}

/// Signed `(dU_rest, dU_k)` exponents of a trade, as `amount / b`.
fn utility_deltas(
    side: Side,
    action: TradeSide,
    tokens: Amount,
    depth: i128,
) -> Result<(Wad, Wad), EngineError> {
    let step = exponent(tokens, depth)?;
    let signed = match action {
        TradeSide::Buy => step,
        TradeSide::Sell => -step,
    };
    Ok(match side {
        Side::Direct => (Wad::ZERO, signed),
        Side::Lay => (signed, Wad::ZERO),
    })
}

/// Computes the post-trade state without touching `market`.
pub fn plan(
    market: &MarketState,
    slot: usize,
    side: Side,
    action: TradeSide,
    tokens: Amount,
) -> Result<StateTransition, EngineError> {
    let (rest, own) = utility_deltas(side, action, tokens, market.depth())?;
    let chi_slot = own.checked_sub(rest)?.exp()?;

    let mass = market.mass(slot)?;
    let mut next_mass = mass.checked_mul(chi_slot)?;
    let mut next_log_global = market.log_global_factor().checked_add(rest)?;
    let mut next_total = market
        .total_mass()
        .checked_sub(mass)?
        .checked_add(next_mass)?;

    if !next_total.is_positive() {
        return Err(EngineError::Invariant("total mass is no longer positive"));
    }
    if market.reserve_mass().is_negative() {
        return Err(EngineError::Invariant("reserve mass is negative"));
    }
    if !next_mass.is_positive() {
        return Err(EngineError::Invariant("outcome mass underflowed to zero"));
    }

    let renormalization = renormalization_shift(next_total.raw());
    if let Some(shift) = renormalization {
        next_log_global = next_log_global.checked_add(shift_log(shift))?;
        next_mass = Wad::from_raw(rescaled_mass(next_mass.raw(), shift));
        // Same arithmetic `MarketState::rescale` performs on apply.
        let mut total = rescaled(market.reserve_mass().raw(), shift);
        for other in (0..market.outcome_count()).filter(|&s| s != slot) {
            total += rescaled_mass(market.mass(other)?.raw(), shift);
        }
        next_total = Wad::from_raw(total + next_mass.raw());
    }

    Ok(StateTransition {
        slot,
        log_global_factor: next_log_global,
        mass: next_mass,
        total_mass: next_total,
        renormalization,
        price: next_mass.checked_div(next_total)?,
    })
}

/// Writes a planned transition. A renormalizing transition shifts the
/// slot masses that `TwapState` integrates, so its TWAP must be rebased
/// with the same transition.
pub fn apply(market: &mut MarketState, transition: &StateTransition) {
    if let Some(shift) = transition.renormalization {
        market.rescale(shift);
    }
    market.set_log_global_factor(transition.log_global_factor);
    market.set_total_mass(transition.total_mass);
    // The slot was resolved against this same state during planning.
    let written = market.set_mass(transition.slot, transition.mass);
    debug_assert!(written.is_ok(), "planned slot {} out of range", transition.slot);
}

/// Plans and applies in one step.
pub fn update(
    market: &mut MarketState,
    slot: usize,
    side: Side,
    action: TradeSide,
    tokens: Amount,
) -> Result<StateTransition, EngineError> {
    let transition = plan(market, slot, side, action, tokens)?;
    apply(market, &transition);
    Ok(transition)
}
