//! Protocol fee schedule.
//!
//! A flat basis-point fee layered on top of the pre-fee LMSR cost:
//! buys pay `cost * (1 + bps/10000)` rounded up, sells receive
//! `proceeds * (1 - bps/10000)` rounded down. Rounding always favors
//! the market.

use serde::{Deserialize, Serialize};

use super::error::EngineError;
use super::fixed_point::{MathError, Rounding, mul_div_u128};
use super::trade::Amount;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Flat protocol fee applied to every trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeeSchedule {
    fee_bps: u32,
}

impl FeeSchedule {
    /// Creates a fee schedule. Fees of 100% or more are rejected.
    pub fn new(fee_bps: u32) -> Result<Self, EngineError> {
        if fee_bps >= BPS_DENOMINATOR {
            return Err(EngineError::InvalidFee(fee_bps));
        }
        Ok(Self { fee_bps })
    }

    pub const fn zero() -> Self {
        Self { fee_bps: 0 }
    }

    pub const fn bps(&self) -> u32 {
        self.fee_bps
    }

    /// Fee-inclusive price of a buy. Returns `(total, fee)`.
    pub fn gross_up_cost(&self, cost: Amount) -> Result<(Amount, Amount), EngineError> {
        let total = mul_div_u128(
            cost,
            u128::from(BPS_DENOMINATOR + self.fee_bps),
            u128::from(BPS_DENOMINATOR),
            Rounding::Up,
        )
        .ok_or(MathError::Overflow)?;
        Ok((total, total - cost))
    }

    /// Proceeds of a sell after the fee. Returns `(net, fee)`.
    pub fn net_proceeds(&self, proceeds: Amount) -> Result<(Amount, Amount), EngineError> {
        let net = mul_div_u128(
            proceeds,
            u128::from(BPS_DENOMINATOR - self.fee_bps),
            u128::from(BPS_DENOMINATOR),
            Rounding::Down,
        )
        .ok_or(MathError::Overflow)?;
        Ok((net, proceeds - net))
    }

    /// Splits a fee-inclusive spend into `(pre_fee, fee)`.
    pub fn strip_from_spend(&self, spend: Amount) -> Result<(Amount, Amount), EngineError> {
        let pre_fee = mul_div_u128(
            spend,
            u128::from(BPS_DENOMINATOR),
            u128::from(BPS_DENOMINATOR + self.fee_bps),
            Rounding::Down,
        )
        .ok_or(MathError::Overflow)?;
        Ok((pre_fee, spend - pre_fee))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_full_fee() {
        assert_eq!(FeeSchedule::new(10_000), Err(EngineError::InvalidFee(10_000)));
        assert!(FeeSchedule::new(9_999).is_ok());
    }

    #[test]
    fn test_buy_fee_rounds_up() {
        let fees = FeeSchedule::new(100).unwrap();
        assert_eq!(fees.gross_up_cost(1_000).unwrap(), (1_010, 10));
        // 1% of 1 unit still costs a unit.
        assert_eq!(fees.gross_up_cost(1).unwrap(), (2, 1));
    }

    #[test]
    fn test_sell_fee_rounds_down() {
        let fees = FeeSchedule::new(100).unwrap();
        assert_eq!(fees.net_proceeds(1_000).unwrap(), (990, 10));
        assert_eq!(fees.net_proceeds(150).unwrap(), (148, 2));
    }

    #[test]
    fn test_strip_from_spend() {
        let fees = FeeSchedule::new(100).unwrap();
        let (pre_fee, fee) = fees.strip_from_spend(1_010).unwrap();
        assert_eq!((pre_fee, fee), (1_000, 10));
        let (total, _) = fees.gross_up_cost(pre_fee).unwrap();
        assert!(total <= 1_010);
    }

    #[test]
    fn test_zero_fee_is_identity() {
        let fees = FeeSchedule::zero();
        assert_eq!(fees.gross_up_cost(123).unwrap(), (123, 0));
        assert_eq!(fees.net_proceeds(123).unwrap(), (123, 0));
        assert_eq!(fees.strip_from_spend(123).unwrap(), (123, 0));
    }
}
