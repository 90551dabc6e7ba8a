//! Signed 18-decimal fixed-point arithmetic ("WAD").
//!
//! Every probability, mass, exponent and logarithm in the engine is a `Wad`.
//! Quote-currency amounts stay in their own integer base units and only meet
//! a `Wad` at a multiply/divide boundary via [`mul_div`].
//!
//! `ln` and `exp` are evaluated at an internal 36-decimal scale with binary
//! range reduction, which keeps them accurate to the last WAD digit across
//! the whole representable range.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// 1.0 in WAD units.
pub const WAD: i128 = 1_000_000_000_000_000_000;

const WAD_U: u128 = WAD as u128;

/// ln(2) in WAD units, truncated.
pub const LN_2: Wad = Wad(LN2_36 / WAD);

/// 1.0 at the 36-decimal scale used inside `ln`/`exp`.
const UNIT36: i128 = 1_000_000_000_000_000_000_000_000_000_000_000_000;

/// ln(2) at the 36-decimal scale.
const LN2_36: i128 = 693_147_180_559_945_309_417_232_121_458_176_568;

/// Largest accepted exponent; e^46 * 1e18 still fits in an `i128`.
const EXP_MAX_INPUT: i128 = 46 * WAD;

/// ln(1e-18): below this e^x rounds to zero at WAD precision.
const EXP_MIN_INPUT: i128 = -41_446_531_673_892_822_312;

/// Series cut-off for `ln`/`exp`. Both converge long before this.
const MAX_SERIES_TERMS: u32 = 80;

/// Arithmetic failures of the fixed-point primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("fixed-point overflow")]
    Overflow,
    #[error("division by zero")]
    DivisionByZero,
    #[error("logarithm of non-positive value {0}")]
    LnOfNonPositive(Wad),
    #[error("exponent {0} exceeds the representable range")]
    ExpOverflow(Wad),
    #[error("value {0} cannot be represented as a decimal")]
    NotRepresentable(Wad),
    #[error("invalid fixed-point literal")]
    InvalidLiteral,
}

/// Direction in which the magnitude of an inexact result is rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// Truncate the magnitude (payouts, token outputs).
    Down,
    /// Round the magnitude away from zero (costs).
    Up,
}

/// Full 256-bit product of two `u128` values as `(hi, lo)`.
fn widening_mul(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a1, a0) = (a >> 64, a & MASK);
    let (b1, b0) = (b >> 64, b & MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    let mid = (p00 >> 64) + (p01 & MASK) + (p10 & MASK);
    let lo = (p00 & MASK) | (mid << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

/// Computes `a * b / d` on unsigned values without intermediate overflow.
///
/// Returns `None` when `d == 0` or the quotient does not fit in 128 bits.
pub(crate) fn mul_div_u128(a: u128, b: u128, d: u128, rounding: Rounding) -> Option<u128> {
    if d == 0 {
        return None;
    }
    let (hi, lo) = widening_mul(a, b);
    if hi >= d {
        return None;
    }

    let (quot, rem) = if hi == 0 {
        (lo / d, lo % d)
    } else {
        // Restoring long division; `rem < d` holds at the top of every step.
        let mut rem = hi;
        let mut quot = 0u128;
        for i in (0..128).rev() {
            let carry = rem >> 127;
            rem = (rem << 1) | ((lo >> i) & 1);
            quot <<= 1;
            if carry == 1 || rem >= d {
                rem = rem.wrapping_sub(d);
                quot |= 1;
            }
        }
        (quot, rem)
    };

    match rounding {
        Rounding::Up if rem != 0 => quot.checked_add(1),
        _ => Some(quot),
    }
}

/// Signed `a * b / d` with a 256-bit intermediate product.
///
/// The sign follows the usual rules; `rounding` applies to the magnitude.
pub fn mul_div(a: i128, b: i128, d: i128, rounding: Rounding) -> Result<i128, MathError> {
    if d == 0 {
        return Err(MathError::DivisionByZero);
    }
    let negative = (a < 0) ^ (b < 0) ^ (d < 0);
    let magnitude = mul_div_u128(a.unsigned_abs(), b.unsigned_abs(), d.unsigned_abs(), rounding)
        .ok_or(MathError::Overflow)?;
    let magnitude = i128::try_from(magnitude).map_err(|_| MathError::Overflow)?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Signed 18-decimal fixed-point number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wad(i128);

impl Wad {
    pub const ZERO: Self = Self(0);
    pub const ONE: Self = Self(WAD);

    /// Wraps a raw value already scaled by 1e18.
    pub const fn from_raw(raw: i128) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i128 {
        self.0
    }

    pub fn from_int(value: i64) -> Self {
        Self(i128::from(value) * WAD)
    }

    /// `numerator / denominator` as a WAD, truncated.
    pub fn from_ratio(numerator: i128, denominator: i128) -> Result<Self, MathError> {
        mul_div(numerator, WAD, denominator, Rounding::Down).map(Self)
    }

    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: Self) -> Result<Self, MathError> {
        self.0.checked_add(rhs.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn checked_sub(self, rhs: Self) -> Result<Self, MathError> {
        self.0.checked_sub(rhs.0).map(Self).ok_or(MathError::Overflow)
    }

    pub fn checked_mul(self, rhs: Self) -> Result<Self, MathError> {
        self.mul_rounded(rhs, Rounding::Down)
    }

    pub fn mul_rounded(self, rhs: Self, rounding: Rounding) -> Result<Self, MathError> {
        mul_div(self.0, rhs.0, WAD, rounding).map(Self)
    }

    pub fn checked_div(self, rhs: Self) -> Result<Self, MathError> {
        self.div_rounded(rhs, Rounding::Down)
    }

    pub fn div_rounded(self, rhs: Self, rounding: Rounding) -> Result<Self, MathError> {
        mul_div(self.0, WAD, rhs.0, rounding).map(Self)
    }

    /// Scales an integer amount by this WAD: `amount * self / 1e18`.
    pub fn scale_amount(self, amount: i128, rounding: Rounding) -> Result<i128, MathError> {
        mul_div(amount, self.0, WAD, rounding)
    }

    /// Natural logarithm.
    pub fn ln(self) -> Result<Self, MathError> {
        if self.0 <= 0 {
            return Err(MathError::LnOfNonPositive(self));
        }
        let x = self.0.unsigned_abs();

        // Pick k so that m = x / 2^k lies in [1, 2). 2^59 < 1e18 < 2^60.
        let mut k = 127 - i32::try_from(x.leading_zeros()).map_err(|_| MathError::Overflow)? - 59;
        let mut m = unit_mantissa(x, k)?;
        while m >= 2 * UNIT36.unsigned_abs() {
            k += 1;
            m = unit_mantissa(x, k)?;
        }
        while m < UNIT36.unsigned_abs() {
            k -= 1;
            m = unit_mantissa(x, k)?;
        }

        // ln(m) = 2 * atanh(s), s = (m - 1) / (m + 1) in [0, 1/3).
        let one = UNIT36.unsigned_abs();
        let s = mul_div_u128(m - one, one, m + one, Rounding::Down).ok_or(MathError::Overflow)?;
        let s2 = mul_div_u128(s, s, one, Rounding::Down).ok_or(MathError::Overflow)?;
        let mut term = s;
        let mut series = s;
        let mut n = 1u128;
        for _ in 0..MAX_SERIES_TERMS {
            term = mul_div_u128(term, s2, one, Rounding::Down).ok_or(MathError::Overflow)?;
            if term == 0 {
                break;
            }
            n += 2;
            series += term / n;
        }
        let ln_m = i128::try_from(2 * series).map_err(|_| MathError::Overflow)?;

        let result36 = i128::from(k)
            .checked_mul(LN2_36)
            .and_then(|v| v.checked_add(ln_m))
            .ok_or(MathError::Overflow)?;
        Ok(Self(result36 / WAD))
    }

    /// Natural exponential.
    pub fn exp(self) -> Result<Self, MathError> {
        if self.0 < EXP_MIN_INPUT {
            return Ok(Self::ZERO);
        }
        if self.0 > EXP_MAX_INPUT {
            return Err(MathError::ExpOverflow(self));
        }

        // x = k*ln2 + r with |r| <= ln2 / 2, all at 36 decimals.
        let x36 = self.0 * WAD;
        let half = if x36 >= 0 { LN2_36 / 2 } else { -LN2_36 / 2 };
        let k = (x36 + half) / LN2_36;
        let r = x36 - k * LN2_36;

        let mut term = UNIT36;
        let mut sum = UNIT36;
        for n in 1..=i128::from(MAX_SERIES_TERMS) {
            term = mul_div(term, r, UNIT36 * n, Rounding::Down)?;
            if term == 0 {
                break;
            }
            sum += term;
        }
        let sum = sum.unsigned_abs();

        let shift = u32::try_from(k.unsigned_abs()).map_err(|_| MathError::Overflow)?;
        let raw = if k >= 0 {
            mul_div_u128(sum, 1u128 << shift, WAD_U, Rounding::Down).ok_or(MathError::Overflow)?
        } else {
            sum / (WAD_U << shift)
        };
        i128::try_from(raw).map(Self).map_err(|_| MathError::Overflow)
    }

    /// Exact conversion to a `Decimal`, when it fits (28 significant digits).
    pub fn to_decimal(self) -> Result<Decimal, MathError> {
        Decimal::try_from_i128_with_scale(self.0, 18)
            .map(|d| d.normalize())
            .map_err(|_| MathError::NotRepresentable(self))
    }

    /// Lossy conversion for metrics and diagnostics.
    #[allow(clippy::cast_precision_loss)]
    pub fn to_f64(self) -> f64 {
        self.0 as f64 / WAD as f64
    }
}

/// `x * 1e18 / 2^k` at the 36-decimal scale.
fn unit_mantissa(x: u128, k: i32) -> Result<u128, MathError> {
    let shift = k.unsigned_abs();
    if shift >= 127 {
        return Err(MathError::Overflow);
    }
    let scaled = if k >= 0 {
        mul_div_u128(x, WAD_U, 1u128 << shift, Rounding::Down)
    } else {
        (1u128 << shift)
            .checked_mul(WAD_U)
            .and_then(|factor| factor.checked_mul(x))
    };
    scaled.ok_or(MathError::Overflow)
}

impl std::ops::Neg for Wad {
    type Output = Self;

    fn neg(self) -> Self {
        Self(-self.0)
    }
}

impl TryFrom<Decimal> for Wad {
    type Error = MathError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        let scale = value.scale();
        let mantissa = value.mantissa();
        let raw = if scale <= 18 {
            10i128
                .checked_pow(18 - scale)
                .and_then(|factor| mantissa.checked_mul(factor))
                .ok_or(MathError::Overflow)?
        } else {
            mantissa / 10i128.pow(scale - 18)
        };
        Ok(Self(raw))
    }
}

impl fmt::Display for Wad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let magnitude = self.0.unsigned_abs();
        let int = magnitude / WAD_U;
        let frac = magnitude % WAD_U;
        if frac == 0 {
            return write!(f, "{sign}{int}");
        }
        let digits = format!("{frac:018}");
        write!(f, "{sign}{int}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Wad {
    type Err = MathError;

    /// Parses a plain decimal literal with up to 18 fractional digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() || frac_part.len() > 18 || !all_digits(int_part) || !all_digits(frac_part) {
            return Err(MathError::InvalidLiteral);
        }
        let int: i128 = int_part.parse().map_err(|_| MathError::Overflow)?;
        let frac: i128 = if frac_part.is_empty() {
            0
        } else {
            format!("{frac_part:0<18}").parse().map_err(|_| MathError::Overflow)?
        };
        let raw = int
            .checked_mul(WAD)
            .and_then(|v| v.checked_add(frac))
            .ok_or(MathError::Overflow)?;
        Ok(Self(if negative { -raw } else { raw }))
    }
}

impl Serialize for Wad {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Wad {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|e| serde::de::Error::custom(format!("invalid WAD value {s:?}: {e}")))
    }
}

/// Converts between quote-currency base units and human decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuoteScale {
    decimals: u32,
}

impl QuoteScale {
    pub const fn new(decimals: u32) -> Self {
        Self { decimals }
    }

    pub const fn decimals(self) -> u32 {
        self.decimals
    }

    /// `1.5` USDC with 6 decimals becomes `1_500_000`. Sub-unit dust is truncated.
    pub fn to_units(self, amount: Decimal) -> Result<u128, MathError> {
        if amount.is_sign_negative() {
            return Err(MathError::Overflow);
        }
        let factor = 10u64.checked_pow(self.decimals).ok_or(MathError::Overflow)?;
        amount
            .checked_mul(Decimal::from(factor))
            .and_then(|shifted| shifted.trunc().to_u128())
            .ok_or(MathError::Overflow)
    }

    pub fn to_decimal(self, units: u128) -> Decimal {
        i128::try_from(units)
            .ok()
            .and_then(|u| Decimal::try_from_i128_with_scale(u, self.decimals).ok())
            .map_or(Decimal::MAX, |d| d.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn close(a: Wad, b: Wad, tolerance: i128) -> bool {
        (a.raw() - b.raw()).abs() <= tolerance
    }

    #[test]
    fn test_mul_div_wide_product() {
        // (2^100 * 2^100) / 2^90 would overflow any 128-bit intermediate.
        let a = 1i128 << 100;
        let got = mul_div(a, a, 1i128 << 90, Rounding::Down).unwrap();
        assert_eq!(got, 1i128 << 110);
    }

    #[test]
    fn test_mul_div_rounding_and_sign() {
        assert_eq!(mul_div(7, 1, 2, Rounding::Down).unwrap(), 3);
        assert_eq!(mul_div(7, 1, 2, Rounding::Up).unwrap(), 4);
        assert_eq!(mul_div(-7, 1, 2, Rounding::Down).unwrap(), -3);
        assert_eq!(mul_div(-7, 1, 2, Rounding::Up).unwrap(), -4);
        assert_eq!(mul_div(1, 1, 0, Rounding::Down), Err(MathError::DivisionByZero));
        assert_eq!(mul_div(i128::MAX, 4, 2, Rounding::Down), Err(MathError::Overflow));
    }

    #[test]
    fn test_ln_known_values() {
        assert_eq!(Wad::ONE.ln().unwrap(), Wad::ZERO);
        let ln2 = Wad::from_int(2).ln().unwrap();
        assert!(close(ln2, Wad::from_raw(693_147_180_559_945_309), 1), "ln2 = {ln2}");
        let ln_half = Wad::from_raw(WAD / 2).ln().unwrap();
        assert!(close(ln_half, Wad::from_raw(-693_147_180_559_945_309), 1));
        let ln10 = Wad::from_int(10).ln().unwrap();
        assert!(close(ln10, Wad::from_raw(2_302_585_092_994_045_684), 1));
    }

    #[test]
    fn test_ln_rejects_non_positive() {
        assert!(matches!(Wad::ZERO.ln(), Err(MathError::LnOfNonPositive(_))));
        assert!(matches!(Wad::from_int(-1).ln(), Err(MathError::LnOfNonPositive(_))));
    }

    #[test]
    fn test_exp_known_values() {
        assert_eq!(Wad::ZERO.exp().unwrap(), Wad::ONE);
        let e = Wad::ONE.exp().unwrap();
        assert!(close(e, Wad::from_raw(2_718_281_828_459_045_235), 2), "e = {e}");
        let inv_e = (-Wad::ONE).exp().unwrap();
        assert!(close(inv_e, Wad::from_raw(367_879_441_171_442_321), 2));
    }

    #[test]
    fn test_exp_range_limits() {
        assert_eq!(Wad::from_int(-50).exp().unwrap(), Wad::ZERO);
        assert!(Wad::from_int(45).exp().is_ok());
        assert!(matches!(Wad::from_int(47).exp(), Err(MathError::ExpOverflow(_))));
    }

    #[test]
    fn test_exp_ln_inverse() {
        for raw in [WAD / 1000, WAD / 3, WAD, 7 * WAD, 25 * WAD] {
            let x = Wad::from_raw(raw);
            let back = x.exp().unwrap().ln().unwrap();
            assert!(close(back, x, 10), "ln(exp({x})) = {back}");
        }
    }

    #[test]
    fn test_decimal_round_trip() {
        let wad = Wad::try_from(dec!(0.25)).unwrap();
        assert_eq!(wad.raw(), WAD / 4);
        assert_eq!(wad.to_decimal().unwrap(), dec!(0.25));
        assert_eq!(wad.to_string(), "0.25");
        assert_eq!((-Wad::from_int(3)).to_string(), "-3");
        assert_eq!("-0.5".parse::<Wad>().unwrap(), Wad::from_raw(-WAD / 2));
        assert_eq!("1.-5".parse::<Wad>(), Err(MathError::InvalidLiteral));
        assert_eq!(".5".parse::<Wad>(), Err(MathError::InvalidLiteral));
    }

    #[test]
    fn test_serde_as_string() {
        let wad = Wad::from_raw(1_500_000_000_000_000_001);
        let json = serde_json::to_string(&wad).unwrap();
        assert_eq!(json, "\"1.500000000000000001\"");
        let back: Wad = serde_json::from_str(&json).unwrap();
        assert_eq!(back, wad);
    }

    #[test]
    fn test_quote_scale_conversions() {
        let usdc = QuoteScale::new(6);
        assert_eq!(usdc.to_units(dec!(1000)).unwrap(), 1_000_000_000);
        assert_eq!(usdc.to_units(dec!(1.2345678)).unwrap(), 1_234_567);
        assert_eq!(usdc.to_decimal(1_500_000), dec!(1.5));
        assert!(usdc.to_units(dec!(-1)).is_err());
    }
}
