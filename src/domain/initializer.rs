//! One-time market setup.
//!
//! Derives the LMSR depth from a worst-case liability and normalizes the
//! caller's prior masses (plus any reserve) to sum to exactly one.

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::fixed_point::{MathError, Rounding, WAD, Wad, mul_div};
use super::market::MarketState;
use super::trade::{Amount, MarketId, PositionId};

/// Accepted range for a market's target outcome count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeLimits {
    pub min: usize,
    pub max: usize,
}

impl Default for OutcomeLimits {
    fn default() -> Self {
        Self { min: 2, max: 256 }
    }
}

/// Everything needed to create a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketParams {
    pub market_id: MarketId,
    /// Worst-case loss the market maker accepts, in quote base units.
    pub liability: Amount,
    /// Outcome count the depth is sized for. Expanding markets may list
    /// fewer outcomes up front.
    pub target_outcomes: usize,
    pub expanding: bool,
    pub reserve: Wad,
    /// `(position, prior mass)` in listing order.
    pub outcomes: Vec<(PositionId, Wad)>,
}

/// `b = liability / ln(n)`.
pub fn depth_for_liability(
    liability: Amount,
    outcomes: usize,
    limits: &OutcomeLimits,
) -> Result<i128, EngineError> {
    // n = 1 would divide by ln(1) = 0.
    let min = limits.min.max(2);
    if outcomes < min || outcomes > limits.max {
        return Err(EngineError::InvalidOutcomeCount {
            count: outcomes,
            min,
            max: limits.max,
        });
    }
    let n = i64::try_from(outcomes).map_err(|_| MathError::Overflow)?;
    let log_n = Wad::from_int(n).ln()?;
    let liability = i128::try_from(liability).map_err(|_| MathError::Overflow)?;
    let depth = mul_div(liability, WAD, log_n.raw(), Rounding::Down)?;
    if depth <= 0 {
        return Err(EngineError::NonPositiveDepth);
    }
    Ok(depth)
}

/// Rescales `priors` and `reserve` so that together they sum to one.
///
/// Inputs already summing to one are returned untouched. Otherwise each
/// value is scaled down and the leftover rounding dust is credited to the
/// largest prior, provided it does not exceed `tolerance`.
pub fn normalize_priors(
    priors: &[Wad],
    reserve: Wad,
    tolerance: Wad,
) -> Result<(Vec<Wad>, Wad), EngineError> {
    if let Some(bad) = priors.iter().find(|p| !p.is_positive()) {
        return Err(EngineError::NonPositivePrior(*bad));
    }
    if reserve.is_negative() {
        return Err(EngineError::ReserveMismatch("reserve must not be negative"));
    }

    let mut sum = reserve;
    for prior in priors {
        sum = sum.checked_add(*prior)?;
    }
    if sum == Wad::ONE {
        return Ok((priors.to_vec(), reserve));
    }

    let scale = |value: Wad| -> Result<Wad, EngineError> {
        Ok(Wad::from_raw(mul_div(value.raw(), WAD, sum.raw(), Rounding::Down)?))
    };
    let mut scaled = priors.iter().map(|p| scale(*p)).collect::<Result<Vec<_>, _>>()?;
    let scaled_reserve = scale(reserve)?;

    let mut allocated = scaled_reserve;
    for mass in &scaled {
        if !mass.is_positive() {
            return Err(EngineError::NonPositivePrior(*mass));
        }
        allocated = allocated.checked_add(*mass)?;
    }
    let dust = Wad::ONE.checked_sub(allocated)?;
    if dust > tolerance {
        return Err(EngineError::NormalizationDust { dust, tolerance });
    }
    if dust.is_positive() {
        let largest = scaled
            .iter()
            .enumerate()
            .max_by_key(|(_, mass)| **mass)
            .map(|(index, _)| index)
            .ok_or(EngineError::Invariant("no priors to absorb rounding dust"))?;
        scaled[largest] = scaled[largest].checked_add(dust)?;
    }
    Ok((scaled, scaled_reserve))
}

fn check_reserve(expanding: bool, reserve: Wad) -> Result<(), EngineError> {
    match (expanding, reserve.is_positive()) {
        (false, false) if reserve.is_zero() => Ok(()),
        (false, _) => Err(EngineError::ReserveMismatch(
            "non-expanding market must have zero reserve",
        )),
        (true, true) => Ok(()),
        (true, false) => Err(EngineError::ReserveMismatch(
            "expanding market must have positive reserve",
        )),
    }
}

/// Builds a market from `params`. Every position must be known to the
/// custody ledger (`position_exists`) and appear only once.
pub fn initialize(
    params: &MarketParams,
    limits: &OutcomeLimits,
    tolerance: Wad,
    position_exists: impl Fn(PositionId) -> bool,
) -> Result<MarketState, EngineError> {
    let depth = depth_for_liability(params.liability, params.target_outcomes, limits)?;

    let listed = params.outcomes.len();
    if listed == 0 || listed > params.target_outcomes {
        return Err(EngineError::InvalidOutcomeCount {
            count: listed,
            min: 1,
            max: params.target_outcomes,
        });
    }
    if !params.expanding && listed < 2 {
        return Err(EngineError::InvalidOutcomeCount {
            count: listed,
            min: 2,
            max: params.target_outcomes,
        });
    }

    check_reserve(params.expanding, params.reserve)?;
    for (position, _) in &params.outcomes {
        if !position_exists(*position) {
            return Err(EngineError::UnknownPosition {
                market: params.market_id,
                position: *position,
            });
        }
    }

    let priors: Vec<Wad> = params.outcomes.iter().map(|(_, prior)| *prior).collect();
    let (masses, reserve) = normalize_priors(&priors, params.reserve, tolerance)?;
    check_reserve(params.expanding, reserve)?;

    let listed = params
        .outcomes
        .iter()
        .map(|(position, _)| *position)
        .zip(masses)
        .collect();
    MarketState::new(params.market_id, depth, listed, reserve, params.expanding)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: Wad = Wad::from_raw(1_000);

    fn params(outcomes: Vec<(PositionId, Wad)>, reserve: Wad, expanding: bool) -> MarketParams {
        MarketParams {
            market_id: 1,
            liability: 1_000_000_000,
            target_outcomes: 4,
            expanding,
            reserve,
            outcomes,
        }
    }

    #[test]
    fn test_depth_from_liability() {
        let depth = depth_for_liability(1_000_000_000, 2, &OutcomeLimits::default()).unwrap();
        // 1000e6 / ln 2
        assert!((depth - 1_442_695_040).abs() <= 1);
    }

    #[test]
    fn test_single_outcome_rejected() {
        let err = depth_for_liability(1_000, 1, &OutcomeLimits { min: 1, max: 10 }).unwrap_err();
        assert_eq!(err, EngineError::InvalidOutcomeCount { count: 1, min: 2, max: 10 });
    }

    #[test]
    fn test_zero_liability_rejected() {
        assert_eq!(
            depth_for_liability(0, 3, &OutcomeLimits::default()),
            Err(EngineError::NonPositiveDepth)
        );
    }

    #[test]
    fn test_normalized_priors_pass_through() {
        let priors = [Wad::from_raw(WAD / 2), Wad::from_raw(WAD / 2)];
        let (masses, reserve) = normalize_priors(&priors, Wad::ZERO, TOLERANCE).unwrap();
        assert_eq!(masses, priors.to_vec());
        assert_eq!(reserve, Wad::ZERO);
    }

    #[test]
    fn test_rescales_to_unity_with_dust() {
        let priors = [Wad::from_int(1), Wad::from_int(1), Wad::from_int(1)];
        let (masses, reserve) = normalize_priors(&priors, Wad::ZERO, TOLERANCE).unwrap();
        let total: i128 = masses.iter().map(|m| m.raw()).sum::<i128>() + reserve.raw();
        assert_eq!(total, WAD);
        assert_eq!(masses.iter().filter(|m| m.raw() == WAD / 3 + 1).count(), 1);
    }

    #[test]
    fn test_dust_beyond_tolerance_fails() {
        let priors = [Wad::from_int(1), Wad::from_int(1), Wad::from_int(1)];
        let err = normalize_priors(&priors, Wad::ZERO, Wad::ZERO).unwrap_err();
        assert!(matches!(err, EngineError::NormalizationDust { .. }));
    }

    #[test]
    fn test_non_positive_prior_rejected() {
        let err = normalize_priors(&[Wad::ONE, Wad::ZERO], Wad::ZERO, TOLERANCE).unwrap_err();
        assert_eq!(err, EngineError::NonPositivePrior(Wad::ZERO));
    }

    #[test]
    fn test_reserve_rules() {
        let half = Wad::from_raw(WAD / 2);
        let quarter = Wad::from_raw(WAD / 4);
        let yes = |_: PositionId| true;

        let bad = params(vec![(1, quarter), (2, quarter)], half, false);
        assert!(matches!(
            initialize(&bad, &OutcomeLimits::default(), TOLERANCE, yes),
            Err(EngineError::ReserveMismatch(_))
        ));

        let bad = params(vec![(1, half), (2, half)], Wad::ZERO, true);
        assert!(matches!(
            initialize(&bad, &OutcomeLimits::default(), TOLERANCE, yes),
            Err(EngineError::ReserveMismatch(_))
        ));

        let good = params(vec![(1, quarter), (2, quarter)], half, true);
        let market = initialize(&good, &OutcomeLimits::default(), TOLERANCE, yes).unwrap();
        assert_eq!(market.reserve_price().unwrap(), half);
        assert!(market.is_expanding());
    }

    #[test]
    fn test_unknown_position_rejected() {
        let half = Wad::from_raw(WAD / 2);
        let p = params(vec![(1, half), (2, half)], Wad::ZERO, false);
        let err = initialize(&p, &OutcomeLimits::default(), TOLERANCE, |id| id == 1).unwrap_err();
        assert_eq!(err, EngineError::UnknownPosition { market: 1, position: 2 });
    }

    #[test]
    fn test_duplicate_position_rejected() {
        let half = Wad::from_raw(WAD / 2);
        let p = params(vec![(9, half), (9, half)], Wad::ZERO, false);
        let err = initialize(&p, &OutcomeLimits::default(), TOLERANCE, |_| true).unwrap_err();
        assert_eq!(err, EngineError::PositionAlreadyListed { market: 1, position: 9 });
    }

    #[test]
    fn test_unnormalized_priors_with_reserve() {
        let p = params(
            vec![(1, Wad::from_int(3)), (2, Wad::from_int(1))],
            Wad::from_int(4),
            true,
        );
        let market = initialize(&p, &OutcomeLimits::default(), TOLERANCE, |_| true).unwrap();
        assert_eq!(market.total_mass(), Wad::ONE);
        assert_eq!(market.price(0).unwrap(), Wad::from_raw(3 * WAD / 8));
        assert_eq!(market.reserve_mass(), Wad::from_raw(WAD / 2));
    }
}
