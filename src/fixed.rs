// 1.5 fixed.rs: fixed point numerics. USD values and ratios are "floats": integers scaled by
// 10^30. token amounts are raw integers in the token's own decimals. a price is float USD per
// smallest token unit, so amount * price is float USD and usd / price is a token amount.
// every division truncates toward zero. every operation is checked and fails loudly.

use primitive_types::{U256, U512};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const FLOAT_DECIMALS: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,

    #[error("arithmetic underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,

    #[error("exponent {0} is not a whole multiple of the float precision")]
    FractionalExponent(U256),

    #[error("value {0} cannot be represented as an unsigned float")]
    Unrepresentable(Decimal),
}

/// 10^30, the float unit.
pub fn precision() -> U256 {
    U256::exp10(FLOAT_DECIMALS)
}

/// `n` whole USD (or a ratio of `n`) as a float.
pub fn float(n: u64) -> U256 {
    U256::from(n) * precision()
}

/// `n` whole tokens in a token with `decimals` decimals.
pub fn expand_decimals(n: u64, decimals: usize) -> U256 {
    U256::from(n) * U256::exp10(decimals)
}

/// `value * 10^-decimals` as a float, e.g. `decimal_to_float(2, 8)` is 2e-8.
pub fn decimal_to_float(value: u64, decimals: usize) -> U256 {
    U256::from(value) * U256::exp10(FLOAT_DECIMALS - decimals)
}

/// Oracle price of one whole token worth `usd`, expressed per smallest unit.
pub fn token_price(usd: u64, token_decimals: usize) -> U256 {
    U256::from(usd) * U256::exp10(FLOAT_DECIMALS - token_decimals)
}

/// Converts a human config value (0.0005, 2e-8, 1.5) to a float.
pub fn from_decimal(value: Decimal) -> Result<U256, MathError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(MathError::Unrepresentable(value));
    }
    let scale = value.scale() as usize;
    let mantissa = value.mantissa().unsigned_abs();
    mul(U256::from(mantissa), U256::exp10(FLOAT_DECIMALS - scale))
}

/// Lossy display conversion. keeps at most 12 fractional digits.
pub fn to_decimal(value: U256, decimals: u32) -> Option<Decimal> {
    let drop = decimals.saturating_sub(12);
    let scaled = value / U256::exp10(drop as usize);
    if scaled.bits() > 96 {
        return None;
    }
    let mantissa = i128::try_from(scaled.as_u128()).ok()?;
    Some(Decimal::from_i128_with_scale(mantissa, decimals - drop).normalize())
}

pub fn add(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_add(b).ok_or(MathError::Overflow)
}

pub fn sub(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_sub(b).ok_or(MathError::Underflow)
}

pub fn mul(a: U256, b: U256) -> Result<U256, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

pub fn div(a: U256, b: U256) -> Result<U256, MathError> {
    if b.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(a / b)
}

/// `a * b / c` with a 512-bit intermediate, truncated.
pub fn mul_div(a: U256, b: U256, c: U256) -> Result<U256, MathError> {
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let wide = U512::from(a) * U512::from(b) / U512::from(c);
    U256::try_from(wide).map_err(|_| MathError::Overflow)
}

/// `a * b / c` rounded up.
pub fn mul_div_up(a: U256, b: U256, c: U256) -> Result<U256, MathError> {
    if c.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let c = U512::from(c);
    let product = U512::from(a) * U512::from(b);
    let mut wide = product / c;
    if !(product % c).is_zero() {
        wide = wide + U512::one();
    }
    U256::try_from(wide).map_err(|_| MathError::Overflow)
}

pub fn apply_factor(value: U256, factor: U256) -> Result<U256, MathError> {
    mul_div(value, factor, precision())
}

/// `value^exponent` in float terms. values under one unit round to zero, matching how the
/// impact curves ignore dust imbalances.
pub fn apply_exponent_factor(value: U256, exponent: U256) -> Result<U256, MathError> {
    let unit = precision();
    if value < unit {
        return Ok(U256::zero());
    }
    if exponent == unit {
        return Ok(value);
    }
    if exponent.is_zero() || !(exponent % unit).is_zero() {
        return Err(MathError::FractionalExponent(exponent));
    }
    let power = exponent / unit;
    if power.bits() > 8 {
        return Err(MathError::Overflow);
    }
    let power = power.low_u64();
    let mut result = value;
    for _ in 1..power {
        result = mul_div(result, value, unit)?;
    }
    Ok(result)
}

/// Converts a float USD value into token units. truncates.
pub fn usd_to_token_amount(usd: U256, price: U256) -> Result<U256, MathError> {
    div(usd, price)
}

pub fn token_amount_to_usd(amount: U256, price: U256) -> Result<U256, MathError> {
    mul(amount, price)
}

/// Signed companion of `U256`: sign plus magnitude. zero is never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SignedU256 {
    negative: bool,
    magnitude: U256,
}

impl SignedU256 {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn positive(magnitude: U256) -> Self {
        Self {
            negative: false,
            magnitude,
        }
    }

    pub fn negative(magnitude: U256) -> Self {
        Self {
            negative: !magnitude.is_zero(),
            magnitude,
        }
    }

    pub fn from_parts(is_negative: bool, magnitude: U256) -> Self {
        if is_negative {
            Self::negative(magnitude)
        } else {
            Self::positive(magnitude)
        }
    }

    /// `a - b` without underflow.
    pub fn diff(a: U256, b: U256) -> Self {
        if a >= b {
            Self::positive(a - b)
        } else {
            Self::negative(b - a)
        }
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_positive(&self) -> bool {
        !self.negative && !self.magnitude.is_zero()
    }

    pub fn abs(&self) -> U256 {
        self.magnitude
    }

    pub fn neg(&self) -> Self {
        Self::from_parts(!self.negative, self.magnitude)
    }

    pub fn checked_add(&self, other: SignedU256) -> Result<Self, MathError> {
        if self.negative == other.negative {
            return Ok(Self::from_parts(self.negative, add(self.magnitude, other.magnitude)?));
        }
        if self.magnitude >= other.magnitude {
            Ok(Self::from_parts(self.negative, self.magnitude - other.magnitude))
        } else {
            Ok(Self::from_parts(other.negative, other.magnitude - self.magnitude))
        }
    }

    pub fn checked_sub(&self, other: SignedU256) -> Result<Self, MathError> {
        self.checked_add(other.neg())
    }

    /// `self * numerator / denominator`, truncated toward zero.
    pub fn mul_div(&self, numerator: U256, denominator: U256) -> Result<Self, MathError> {
        Ok(Self::from_parts(
            self.negative,
            mul_div(self.magnitude, numerator, denominator)?,
        ))
    }

    /// Applies this delta to an unsigned value. going below zero is an underflow.
    pub fn apply_to(&self, value: U256) -> Result<U256, MathError> {
        if self.negative {
            sub(value, self.magnitude)
        } else {
            add(value, self.magnitude)
        }
    }
}

impl From<U256> for SignedU256 {
    fn from(value: U256) -> Self {
        Self::positive(value)
    }
}

impl PartialOrd for SignedU256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SignedU256 {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
            (false, false) => self.magnitude.cmp(&other.magnitude),
            (true, true) => other.magnitude.cmp(&self.magnitude),
        }
    }
}

impl fmt::Display for SignedU256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn decimal_conversion() {
        assert_eq!(from_decimal(dec!(0.00000002)).unwrap(), decimal_to_float(2, 8));
        assert_eq!(from_decimal(dec!(1)).unwrap(), precision());
        assert_eq!(from_decimal(dec!(1.5)).unwrap(), float(15) / 10);
        assert!(from_decimal(dec!(-0.1)).is_err());

        assert_eq!(to_decimal(float(50_000), 30), Some(dec!(50000)));
        assert_eq!(to_decimal(expand_decimals(15, 17), 18), Some(dec!(1.5)));
    }

    #[test]
    fn prices_per_smallest_unit() {
        // 1 WNT (18 decimals) at $5000
        let wnt = token_price(5000, 18);
        assert_eq!(wnt, U256::from(5000u64) * U256::exp10(12));
        assert_eq!(token_amount_to_usd(expand_decimals(10, 18), wnt).unwrap(), float(50_000));

        // 1 USDC (6 decimals) at $1
        assert_eq!(token_price(1, 6), U256::exp10(24));
    }

    #[test]
    fn division_truncates() {
        let price = token_price(3, 0);
        assert_eq!(usd_to_token_amount(float(10), price).unwrap(), U256::from(3u64));
        assert_eq!(mul_div(U256::from(7u64), U256::from(1u64), U256::from(2u64)).unwrap(), U256::from(3u64));
        assert_eq!(mul_div_up(U256::from(7u64), U256::from(1u64), U256::from(2u64)).unwrap(), U256::from(4u64));
        assert_eq!(mul_div_up(U256::from(8u64), U256::from(1u64), U256::from(2u64)).unwrap(), U256::from(4u64));
    }

    #[test]
    fn checked_failures() {
        assert_eq!(sub(U256::one(), U256::from(2u64)), Err(MathError::Underflow));
        assert_eq!(div(U256::one(), U256::zero()), Err(MathError::DivisionByZero));
        assert_eq!(add(U256::MAX, U256::one()), Err(MathError::Overflow));
        assert_eq!(mul_div(U256::MAX, U256::MAX, U256::one()), Err(MathError::Overflow));
    }

    #[test]
    fn mul_div_survives_wide_intermediate() {
        // 10^40 * 10^40 overflows 256 bits but the quotient does not
        let big = U256::exp10(40);
        assert_eq!(mul_div(big, big, U256::exp10(50)).unwrap(), U256::exp10(30));
    }

    #[test]
    fn exponent_curve() {
        let two = float(2);
        // dust below one unit is ignored
        assert_eq!(apply_exponent_factor(U256::exp10(29), two).unwrap(), U256::zero());
        assert_eq!(apply_exponent_factor(float(7), precision()).unwrap(), float(7));
        assert_eq!(apply_exponent_factor(float(50_000), two).unwrap(), float(2_500_000_000));
        assert_eq!(apply_exponent_factor(float(3), float(3)).unwrap(), float(27));
        assert!(matches!(
            apply_exponent_factor(float(3), float(3) / 2),
            Err(MathError::FractionalExponent(_))
        ));
    }

    #[test]
    fn signed_arithmetic() {
        let five = SignedU256::positive(U256::from(5u64));
        let minus_eight = SignedU256::negative(U256::from(8u64));

        let sum = five.checked_add(minus_eight).unwrap();
        assert!(sum.is_negative());
        assert_eq!(sum.abs(), U256::from(3u64));

        let back = sum.checked_sub(minus_eight).unwrap();
        assert_eq!(back, five);

        assert!(!SignedU256::negative(U256::zero()).is_negative());
        assert!(minus_eight < SignedU256::zero());
        assert!(SignedU256::negative(U256::from(9u64)) < minus_eight);
        assert_eq!(SignedU256::diff(U256::from(2u64), U256::from(5u64)).to_string(), "-3");
    }

    #[test]
    fn apply_signed_delta() {
        let value = U256::from(10u64);
        assert_eq!(SignedU256::negative(U256::from(4u64)).apply_to(value).unwrap(), U256::from(6u64));
        assert_eq!(
            SignedU256::negative(U256::from(11u64)).apply_to(value),
            Err(MathError::Underflow)
        );
    }
}
