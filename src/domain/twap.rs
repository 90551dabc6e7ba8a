//! Constant-time TWAP accumulator.
//!
//! Each market keeps a global integral `J = ∫ dt / S`, advanced lazily
//! whenever a price-affecting call arrives. Every slot remembers the value of
//! `J` at its last settlement; settling adds `R[slot] · (J - J_slot)` to the
//! slot's cumulative integral. Since `R[slot]` is constant between two
//! touches of that slot, the sum is exactly `∫ price dt` over the interval.
//!
//! When the market renormalizes its masses, every slot is settled against
//! the current `J` and the integral restarts from zero at the new scale.
//!
//! Observers take two `(cumulative, timestamp)` checkpoints and derive the
//! average direct-side price as `(cum1 - cum0) / (t1 - t0)`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::fixed_point::{MathError, Rounding, WAD, Wad, mul_div};
use super::market::MarketState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotTwap {
    /// `J` as of this slot's last settlement.
    pub integral_snapshot: Wad,
    /// `∫ price dt`, in WAD price-seconds.
    pub cumulative: Wad,
}

/// TWAP bookkeeping of one market.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapState {
    integral: Wad,
    last_timestamp: Option<u64>,
    slots: HashMap<usize, SlotTwap>,
}

/// Pre-computed effect of `update_before_price_change`, applied infallibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TwapSettlement {
    timestamp: u64,
    integral: Wad,
    slot: usize,
    slot_state: SlotTwap,
}

/// Every slot's cumulative price at the moment masses are rescaled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwapRebase {
    cumulatives: Vec<Wad>,
}

/// Read-only checkpoint of a slot's cumulative price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwapObservation {
    pub cumulative: Wad,
    pub timestamp: u64,
}

impl TwapState {
    /// Accumulator whose clock has not started. The first
    /// price-affecting call only records its timestamp.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulator with the clock started at `timestamp`.
    pub fn started_at(timestamp: u64) -> Self {
        Self {
            last_timestamp: Some(timestamp),
            ..Self::default()
        }
    }

    pub const fn integral(&self) -> Wad {
        self.integral
    }

    pub const fn last_timestamp(&self) -> Option<u64> {
        self.last_timestamp
    }

    pub fn slot(&self, slot: usize) -> SlotTwap {
        self.slots.get(&slot).copied().unwrap_or_default()
    }

    /// `J` advanced to `now` at the current total mass.
    fn integral_at(&self, market: &MarketState, now: u64) -> Result<Wad, EngineError> {
        let Some(last) = self.last_timestamp else {
            return Ok(self.integral);
        };
        // A clock that runs backwards accrues nothing.
        let elapsed = now.saturating_sub(last);
        if elapsed == 0 {
            return Ok(self.integral);
        }
        let total = market.total_mass();
        if !total.is_positive() {
            return Err(EngineError::Invariant("total mass is no longer positive"));
        }
        let seconds = i128::from(elapsed).checked_mul(WAD).ok_or(MathError::Overflow)?;
        let step = mul_div(seconds, WAD, total.raw(), Rounding::Down)?;
        Ok(self.integral.checked_add(Wad::from_raw(step))?)
    }

    /// Slot state settled against `integral`.
    fn settled(&self, market: &MarketState, slot: usize, integral: Wad) -> Result<SlotTwap, EngineError> {
        let mut state = self.slot(slot);
        if state.integral_snapshot != integral {
            let window = integral.checked_sub(state.integral_snapshot)?;
            let gained = mul_div(market.mass(slot)?.raw(), window.raw(), WAD, Rounding::Down)?;
            state.cumulative = state.cumulative.checked_add(Wad::from_raw(gained))?;
            state.integral_snapshot = integral;
        }
        Ok(state)
    }

    /// Computes what `update_before_price_change` would write.
    pub fn preview_before(
        &self,
        market: &MarketState,
        slot: usize,
        now: u64,
    ) -> Result<TwapSettlement, EngineError> {
        let integral = self.integral_at(market, now)?;
        let slot_state = self.settled(market, slot, integral)?;
        let timestamp = self.last_timestamp.map_or(now, |last| last.max(now));
        Ok(TwapSettlement {
            timestamp,
            integral,
            slot,
            slot_state,
        })
    }

    pub fn apply(&mut self, settlement: &TwapSettlement) {
        self.integral = settlement.integral;
        self.last_timestamp = Some(settlement.timestamp);
        self.slots.insert(settlement.slot, settlement.slot_state);
    }

    /// Settles all slots against `settlement` so the integral can restart
    /// after the masses of `market` are rescaled. O(n); only runs on
    /// renormalizing trades.
    pub fn preview_rebase(
        &self,
        market: &MarketState,
        settlement: &TwapSettlement,
    ) -> Result<TwapRebase, EngineError> {
        let cumulatives = (0..market.outcome_count())
            .map(|slot| {
                if slot == settlement.slot {
                    Ok(settlement.slot_state.cumulative)
                } else {
                    Ok(self.settled(market, slot, settlement.integral)?.cumulative)
                }
            })
            .collect::<Result<Vec<_>, EngineError>>()?;
        Ok(TwapRebase { cumulatives })
    }

    /// Restarts `J` at zero with every slot settled.
    pub fn rebase(&mut self, rebase: &TwapRebase) {
        self.integral = Wad::ZERO;
        self.slots = rebase
            .cumulatives
            .iter()
            .enumerate()
            .map(|(slot, &cumulative)| {
                (
                    slot,
                    SlotTwap {
                        integral_snapshot: Wad::ZERO,
                        cumulative,
                    },
                )
            })
            .collect();
    }

    /// Accrues elapsed time at pre-change prices and settles `slot`.
    pub fn update_before_price_change(
        &mut self,
        market: &MarketState,
        slot: usize,
        now: u64,
    ) -> Result<(), EngineError> {
        let settlement = self.preview_before(market, slot, now)?;
        self.apply(&settlement);
        Ok(())
    }

    /// Accrues elapsed time without settling any slot.
    pub fn accrue(&mut self, market: &MarketState, now: u64) -> Result<(), EngineError> {
        let integral = self.integral_at(market, now)?;
        self.integral = integral;
        self.last_timestamp = Some(self.last_timestamp.map_or(now, |last| last.max(now)));
        Ok(())
    }

    /// Re-baselines `slot` after its mass changed.
    pub fn update_after_price_change(&mut self, slot: usize) {
        let integral = self.integral;
        self.slots.entry(slot).or_default().integral_snapshot = integral;
    }

    /// Cumulative price of `slot` as of `now`, without mutating anything.
    pub fn observe(&self, market: &MarketState, slot: usize, now: u64) -> Result<TwapObservation, EngineError> {
        let integral = self.integral_at(market, now)?;
        let state = self.settled(market, slot, integral)?;
        Ok(TwapObservation {
            cumulative: state.cumulative,
            timestamp: now,
        })
    }
}

/// Average direct-side price between two checkpoints of the same slot.
pub fn average_price(earlier: &TwapObservation, later: &TwapObservation) -> Result<Wad, EngineError> {
    if later.timestamp <= earlier.timestamp {
        return Err(EngineError::TwapWindow {
            start: earlier.timestamp,
            end: later.timestamp,
        });
    }
    let span = i128::from(later.timestamp - earlier.timestamp);
    let delta = later.cumulative.checked_sub(earlier.cumulative)?;
    Ok(Wad::from_raw(delta.raw() / span))
}
