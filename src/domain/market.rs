//! Per-market LMSR state.
//!
//! Prices are carried as masses: outcome `k` trades at `R[k] / S`, where `S`
//! is the total over every listed outcome plus the unallocated reserve. The
//! global factor `G` scales all masses at once so that `Z = G * S` tracks the
//! LMSR partition sum without touching every slot on lay-side trades.
//!
//! `G` only ever compounds, so it is kept as `ln G`. The masses themselves
//! are relative: whenever `S` drifts out of `[2^-16, 2^24]` they are all
//! shifted by a common power of two and the shift is folded into `ln G`.
//!
//! Position identifiers are sparse and caller-defined; they are mapped to a
//! dense slot index once, at listing time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::fixed_point::{LN_2, WAD, Wad};
use super::trade::{MarketId, PositionId};

/// `S` below this triggers a renormalization.
pub const RENORMALIZE_BELOW: i128 = WAD >> 16;
/// `S` above this triggers a renormalization.
pub const RENORMALIZE_ABOVE: i128 = WAD << 24;

/// Mutable pricing state of a single market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketState {
    market_id: MarketId,
    /// Liquidity depth `b`, in quote-currency base units.
    depth: i128,
    /// `ln G`, the log of the global multiplicative correction.
    log_global_factor: Wad,
    /// Per-slot mass `R[slot]`.
    masses: Vec<Wad>,
    /// `S`: listed masses plus reserve, maintained incrementally.
    total_mass: Wad,
    /// Mass not yet assigned to a tradable outcome.
    reserve_mass: Wad,
    expanding: bool,
    slot_of: HashMap<PositionId, usize>,
    position_of_slot: Vec<PositionId>,
}

impl MarketState {
    /// Assembles a freshly initialized market. `masses` and `reserve` must
    /// already be normalized so that they sum to one.
    pub(crate) fn new(
        market_id: MarketId,
        depth: i128,
        listed: Vec<(PositionId, Wad)>,
        reserve_mass: Wad,
        expanding: bool,
    ) -> Result<Self, EngineError> {
        let mut state = Self {
            market_id,
            depth,
            log_global_factor: Wad::ZERO,
            masses: Vec::with_capacity(listed.len()),
            total_mass: reserve_mass,
            reserve_mass,
            expanding,
            slot_of: HashMap::with_capacity(listed.len()),
            position_of_slot: Vec::with_capacity(listed.len()),
        };
        for (position, mass) in listed {
            state.list(position, mass)?;
            state.total_mass = state.total_mass.checked_add(mass)?;
        }
        Ok(state)
    }

    /// Assigns the next dense slot to `position`. Does not touch `S`.
    pub(crate) fn list(&mut self, position: PositionId, mass: Wad) -> Result<usize, EngineError> {
        if self.slot_of.contains_key(&position) {
            return Err(EngineError::PositionAlreadyListed {
                market: self.market_id,
                position,
            });
        }
        let slot = self.masses.len();
        self.masses.push(mass);
        self.position_of_slot.push(position);
        self.slot_of.insert(position, slot);
        Ok(slot)
    }

    pub const fn market_id(&self) -> MarketId {
        self.market_id
    }

    pub const fn depth(&self) -> i128 {
        self.depth
    }

    pub const fn log_global_factor(&self) -> Wad {
        self.log_global_factor
    }

    /// `G` itself. Overflows once enough one-sided lay volume has traded.
    pub fn global_factor(&self) -> Result<Wad, EngineError> {
        Ok(self.log_global_factor.exp()?)
    }

    pub const fn total_mass(&self) -> Wad {
        self.total_mass
    }

    pub const fn reserve_mass(&self) -> Wad {
        self.reserve_mass
    }

    /// Mass of the listed outcomes alone (`S` without the reserve).
    pub fn tradable_mass(&self) -> Result<Wad, EngineError> {
        Ok(self.total_mass.checked_sub(self.reserve_mass)?)
    }

    pub const fn is_expanding(&self) -> bool {
        self.expanding
    }

    pub fn outcome_count(&self) -> usize {
        self.masses.len()
    }

    pub fn is_listed(&self, position: PositionId) -> bool {
        self.slot_of.contains_key(&position)
    }

    /// Resolves a position to its dense slot.
    pub fn slot_of(&self, position: PositionId) -> Result<usize, EngineError> {
        self.slot_of
            .get(&position)
            .copied()
            .ok_or(EngineError::PositionNotListed {
                market: self.market_id,
                position,
            })
    }

    pub fn position_at(&self, slot: usize) -> Option<PositionId> {
        self.position_of_slot.get(slot).copied()
    }

    /// Listed positions in slot order.
    pub fn positions(&self) -> impl Iterator<Item = (usize, PositionId)> + '_ {
        self.position_of_slot.iter().copied().enumerate()
    }

    pub fn mass(&self, slot: usize) -> Result<Wad, EngineError> {
        self.masses
            .get(slot)
            .copied()
            .ok_or(EngineError::Invariant("slot index out of range"))
    }

    /// Direct-side price of the outcome in `slot`: `R[slot] / S`.
    pub fn price(&self, slot: usize) -> Result<Wad, EngineError> {
        Ok(self.mass(slot)?.checked_div(self.total_mass)?)
    }

    /// Price mass still held by the reserve: `R_reserve / S`.
    pub fn reserve_price(&self) -> Result<Wad, EngineError> {
        Ok(self.reserve_mass.checked_div(self.total_mass)?)
    }

    /// Aggregate `Z = G * S`. Diagnostic only; trading never needs it.
    pub fn aggregate(&self) -> Result<Wad, EngineError> {
        Ok(self.global_factor()?.checked_mul(self.total_mass)?)
    }

    /// `ln Z`, which stays representable for the life of the market.
    pub fn log_aggregate(&self) -> Result<Wad, EngineError> {
        Ok(self.log_global_factor.checked_add(self.total_mass.ln()?)?)
    }

    pub(crate) fn set_log_global_factor(&mut self, value: Wad) {
        self.log_global_factor = value;
    }

    /// Shifts every listed mass and the reserve by `2^-shift`. `S` is left
    /// for the caller to write.
    pub(crate) fn rescale(&mut self, shift: i32) {
        for mass in &mut self.masses {
            *mass = Wad::from_raw(rescaled_mass(mass.raw(), shift));
        }
        self.reserve_mass = Wad::from_raw(rescaled(self.reserve_mass.raw(), shift));
    }

    pub(crate) fn set_total_mass(&mut self, value: Wad) {
        self.total_mass = value;
    }

    pub(crate) fn set_reserve_mass(&mut self, value: Wad) {
        self.reserve_mass = value;
    }

    pub(crate) fn set_mass(&mut self, slot: usize, value: Wad) -> Result<(), EngineError> {
        let entry = self
            .masses
            .get_mut(slot)
            .ok_or(EngineError::Invariant("slot index out of range"))?;
        *entry = value;
        Ok(())
    }
}

/// Power-of-two shift that brings a total of `raw` back to about one.
/// Positive shifts divide.
pub(crate) fn renormalization_shift(raw: i128) -> Option<i32> {
    if (RENORMALIZE_BELOW..=RENORMALIZE_ABOVE).contains(&raw) || raw <= 0 {
        return None;
    }
    let bits = |v: i128| 128 - v.leading_zeros() as i32;
    Some(bits(raw) - bits(WAD))
}

/// Shift contribution to `ln G` that keeps `Z` unchanged.
pub(crate) fn shift_log(shift: i32) -> Wad {
    Wad::from_raw(LN_2.raw() * i128::from(shift))
}

pub(crate) const fn rescaled(raw: i128, shift: i32) -> i128 {
    if shift >= 0 { raw >> shift } else { raw << -shift }
}

/// Listed masses keep at least one raw unit so their slot stays tradable.
pub(crate) fn rescaled_mass(raw: i128, shift: i32) -> i128 {
    rescaled(raw, shift).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fixed_point::WAD;

    fn market() -> MarketState {
        MarketState::new(
            1,
            1_000_000,
            vec![
                (100, Wad::from_raw(WAD / 4)),
                (205, Wad::from_raw(WAD / 4)),
            ],
            Wad::from_raw(WAD / 2),
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_dense_slots_follow_listing_order() {
        let m = market();
        assert_eq!(m.slot_of(100).unwrap(), 0);
        assert_eq!(m.slot_of(205).unwrap(), 1);
        assert_eq!(m.position_at(1), Some(205));
        assert_eq!(m.position_at(2), None);
        assert_eq!(m.outcome_count(), 2);
    }

    #[test]
    fn test_unlisted_position_fails() {
        let m = market();
        assert_eq!(
            m.slot_of(999),
            Err(EngineError::PositionNotListed { market: 1, position: 999 })
        );
    }

    #[test]
    fn test_duplicate_listing_fails() {
        let result = MarketState::new(
            1,
            1_000_000,
            vec![(5, Wad::from_raw(WAD / 2)), (5, Wad::from_raw(WAD / 2))],
            Wad::ZERO,
            false,
        );
        assert_eq!(
            result,
            Err(EngineError::PositionAlreadyListed { market: 1, position: 5 })
        );
    }

    #[test]
    fn test_prices_include_reserve() {
        let m = market();
        assert_eq!(m.total_mass(), Wad::ONE);
        assert_eq!(m.price(0).unwrap(), Wad::from_raw(WAD / 4));
        assert_eq!(m.reserve_price().unwrap(), Wad::from_raw(WAD / 2));
        assert_eq!(m.tradable_mass().unwrap(), Wad::from_raw(WAD / 2));
        assert_eq!(m.aggregate().unwrap(), Wad::ONE);
        assert_eq!(m.log_aggregate().unwrap(), Wad::ZERO);
    }

    #[test]
    fn test_shift_only_outside_band() {
        assert_eq!(renormalization_shift(WAD), None);
        assert_eq!(renormalization_shift(RENORMALIZE_ABOVE), None);
        assert_eq!(renormalization_shift(RENORMALIZE_BELOW), None);

        let big = RENORMALIZE_ABOVE * 4;
        let shift = renormalization_shift(big).unwrap();
        let back = rescaled(big, shift);
        assert!(back >= WAD / 2 && back < 2 * WAD, "{back}");

        let small = RENORMALIZE_BELOW / 8;
        let shift = renormalization_shift(small).unwrap();
        assert!(shift < 0);
        let back = rescaled(small, shift);
        assert!(back >= WAD / 2 && back < 2 * WAD, "{back}");
    }

    #[test]
    fn test_rescale_keeps_prices() {
        let mut m = market();
        let before: Vec<Wad> = (0..2).map(|s| m.price(s).unwrap()).collect();
        m.rescale(-20);
        let total = m.mass(0).unwrap().raw() + m.mass(1).unwrap().raw() + m.reserve_mass().raw();
        m.set_total_mass(Wad::from_raw(total));
        assert_eq!(m.total_mass(), Wad::from_raw(WAD << 20));
        assert_eq!(m.price(0).unwrap(), before[0]);
        assert_eq!(m.price(1).unwrap(), before[1]);
    }
}
