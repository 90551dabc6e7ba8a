//! Closed-form LMSR quotes.
//!
//! With `p = R[k] / S` the current direct-side price of outcome `k` and
//! `b` the depth, the pre-fee cost of `t` tokens is
//!
//! - direct side: `b * ln(1 - p + p * e^(t/b))`
//! - lay side:    `b * ln(p + (1 - p) * e^(t/b))`
//!
//! Sells evaluate the same expressions at `-t`. The exact-spend inverse
//! solves for `t` given a pre-fee spend `m` with `x = e^(m/b)`:
//!
//! - direct side: `t = b * ln(1 + (x - 1) / p)`
//! - lay side:    `t = b * ln((x - p) / (1 - p))`
//!
//! Every function here is pure. Probabilities, exponents and logarithms are
//! WADs; token and quote amounts only meet them when scaled by `b`.
//! Reference: Hanson (2003) "Combinatorial Information Market Design".

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::fees::FeeSchedule;
use super::fixed_point::{MathError, Rounding, WAD, Wad, mul_div};
use super::market::MarketState;
use super::trade::{Amount, PositionId, Side, TradeSide};

/// Priced trade, ready to be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub slot: usize,
    pub side: Side,
    pub action: TradeSide,
    pub tokens: Amount,
    /// LMSR cost (buys) or proceeds (sells) before the fee.
    pub pre_fee: Amount,
    pub fee: Amount,
    /// What the trader pays (buys) or receives (sells).
    pub total: Amount,
}

/// Quote for buying exactly `tokens` of `side`.
pub fn quote_buy_exact_tokens(
    market: &MarketState,
    position: PositionId,
    side: Side,
    tokens: Amount,
    fees: &FeeSchedule,
) -> Result<Quote, EngineError> {
    if tokens == 0 {
        return Err(EngineError::ZeroAmount);
    }
    let slot = market.slot_of(position)?;
    let cost = buy_cost(market, slot, side, tokens)?;
    let (total, fee) = fees.gross_up_cost(cost)?;
    Ok(Quote {
        slot,
        side,
        action: TradeSide::Buy,
        tokens,
        pre_fee: cost,
        fee,
        total,
    })
}

/// Quote for spending exactly `spend` (fee included) on `side`.
pub fn quote_buy_exact_spend(
    market: &MarketState,
    position: PositionId,
    side: Side,
    spend: Amount,
    fees: &FeeSchedule,
) -> Result<Quote, EngineError> {
    if spend == 0 {
        return Err(EngineError::ZeroAmount);
    }
    let slot = market.slot_of(position)?;
    let (pre_fee, fee) = fees.strip_from_spend(spend)?;
    let tokens = tokens_for_spend(market, slot, side, pre_fee)?;
    if tokens == 0 {
        return Err(EngineError::DustTrade);
    }
    Ok(Quote {
        slot,
        side,
        action: TradeSide::Buy,
        tokens,
        pre_fee,
        fee,
        total: spend,
    })
}

/// Quote for selling exactly `tokens` of `side`.
pub fn quote_sell_exact_tokens(
    market: &MarketState,
    position: PositionId,
    side: Side,
    tokens: Amount,
    fees: &FeeSchedule,
) -> Result<Quote, EngineError> {
    if tokens == 0 {
        return Err(EngineError::ZeroAmount);
    }
    let slot = market.slot_of(position)?;
    let proceeds = sell_proceeds(market, slot, side, tokens)?;
    let (total, fee) = fees.net_proceeds(proceeds)?;
    Ok(Quote {
        slot,
        side,
        action: TradeSide::Sell,
        tokens,
        pre_fee: proceeds,
        fee,
        total,
    })
}

/// `amount / b` as a WAD exponent.
pub(crate) fn exponent(amount: Amount, depth: i128) -> Result<Wad, EngineError> {
    if depth <= 0 {
        return Err(EngineError::NonPositiveDepth);
    }
    let amount = i128::try_from(amount).map_err(|_| MathError::Overflow)?;
    Ok(Wad::from_raw(mul_div(amount, WAD, depth, Rounding::Down)?))
}

/// Argument of the cost logarithm for a signed trade exponent.
fn cost_argument(price: Wad, side: Side, growth: Wad) -> Result<Wad, EngineError> {
    let complement = Wad::ONE.checked_sub(price)?;
    let arg = match side {
        Side::Direct => complement.checked_add(price.checked_mul(growth)?)?,
        Side::Lay => price.checked_add(complement.checked_mul(growth)?)?,
    };
    if !arg.is_positive() {
        return Err(EngineError::Domain("cost logarithm argument is non-positive"));
    }
    Ok(arg)
}

/// Pre-fee cost of buying `tokens`, rounded up.
fn buy_cost(market: &MarketState, slot: usize, side: Side, tokens: Amount) -> Result<Amount, EngineError> {
    let price = market.price(slot)?;
    let growth = exponent(tokens, market.depth())?.exp()?;
    let log = cost_argument(price, side, growth)?.ln()?;
    let cost = mul_div(market.depth(), log.raw(), WAD, Rounding::Up)?;
    u128::try_from(cost).map_err(|_| EngineError::Domain("buy cost is negative"))
}

/// Pre-fee proceeds of selling `tokens`, rounded down.
fn sell_proceeds(
    market: &MarketState,
    slot: usize,
    side: Side,
    tokens: Amount,
) -> Result<Amount, EngineError> {
    let price = market.price(slot)?;
    let decay = (-exponent(tokens, market.depth())?).exp()?;
    let log = cost_argument(price, side, decay)?.ln()?;
    // C(-t) = b * ln(arg) <= 0; the seller receives its negation.
    let proceeds = mul_div(market.depth(), -log.raw(), WAD, Rounding::Down)?;
    u128::try_from(proceeds).map_err(|_| EngineError::Domain("sell proceeds are negative"))
}

/// Tokens obtainable for a pre-fee `spend`, rounded down.
fn tokens_for_spend(
    market: &MarketState,
    slot: usize,
    side: Side,
    spend: Amount,
) -> Result<Amount, EngineError> {
    let price = market.price(slot)?;
    let growth = exponent(spend, market.depth())?.exp()?;

    let arg = match side {
        Side::Direct => {
            if !price.is_positive() {
                return Err(EngineError::Domain("direct price is zero"));
            }
            let excess = growth.checked_sub(Wad::ONE)?;
            Wad::ONE.checked_add(excess.checked_div(price)?)?
        }
        Side::Lay => {
            if growth <= price {
                return Err(EngineError::Domain("spend exponent does not exceed price"));
            }
            let complement = Wad::ONE.checked_sub(price)?;
            if !complement.is_positive() {
                return Err(EngineError::Domain("lay price is zero"));
            }
            growth.checked_sub(price)?.checked_div(complement)?
        }
    };
    if arg < Wad::ONE {
        return Err(EngineError::Domain("inverse cost argument below one"));
    }

    let tokens = mul_div(market.depth(), arg.ln()?.raw(), WAD, Rounding::Down)?;
    u128::try_from(tokens).map_err(|_| EngineError::Domain("token output is negative"))
}
