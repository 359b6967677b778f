//! A validated, checked-arithmetic satoshi amount.
//!
//! `Amount<C>` wraps a signed 64-bit satoshi count and is generic over a
//! [`Constraint`] that governs which values are acceptable -- unconstrained
//! transaction fee deltas can be negative, but UTXO values and subsidies
//! must be non-negative. The constraint is enforced on construction, so an
//! `Amount<NonNegative>` in hand is a proof that it's never negative,
//! without needing to re-check at every use site.

use std::{
    convert::TryFrom,
    fmt,
    io,
    marker::PhantomData,
    ops::{Add, Neg, Sub},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// The maximum number of satoshis that can ever exist, matching Bitcoin's
/// 21 million coin supply cap at 8 decimal places.
pub const MAX_MONEY: i64 = 21_000_000 * COIN;

/// The number of satoshis in one coin.
pub const COIN: i64 = 100_000_000;

/// An error constructing or operating on an [`Amount`].
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount {0} is outside the valid range for this constraint")]
    Constraint(i64),
    #[error("arithmetic overflow computing an amount")]
    Overflow,
    #[error("decimal string {0:?} is not a valid amount")]
    InvalidDecimal(String),
}

/// Restricts which raw `i64` values are valid for an [`Amount`].
pub trait Constraint: Copy + Clone {
    fn validate(value: i64) -> Result<i64, AmountError>;
}

/// Allows any value in `[-MAX_MONEY, MAX_MONEY]`; used for fee/value deltas.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NegativeAllowed;

impl Constraint for NegativeAllowed {
    fn validate(value: i64) -> Result<i64, AmountError> {
        if (-MAX_MONEY..=MAX_MONEY).contains(&value) {
            Ok(value)
        } else {
            Err(AmountError::Constraint(value))
        }
    }
}

/// Allows any value in `[0, MAX_MONEY]`; used for UTXO values and subsidies.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct NonNegative;

impl Constraint for NonNegative {
    fn validate(value: i64) -> Result<i64, AmountError> {
        if (0..=MAX_MONEY).contains(&value) {
            Ok(value)
        } else {
            Err(AmountError::Constraint(value))
        }
    }
}

/// A satoshi amount, constrained at construction by `C`.
#[derive(Serialize, Deserialize)]
#[serde(bound = "")]
pub struct Amount<C: Constraint = NonNegative>(i64, #[serde(skip)] PhantomData<C>);

impl<C: Constraint> Amount<C> {
    /// The zero amount, valid under every constraint.
    pub fn zero() -> Self {
        Amount(0, PhantomData)
    }

    /// The raw satoshi count.
    pub fn satoshis(&self) -> i64 {
        self.0
    }

    /// Checked addition; fails on overflow or if the result violates `C`.
    pub fn checked_add(&self, rhs: impl Into<Amount<C>>) -> Result<Self, AmountError> {
        let rhs = rhs.into();
        let raw = self.0.checked_add(rhs.0).ok_or(AmountError::Overflow)?;
        Ok(Amount(C::validate(raw)?, PhantomData))
    }

    /// Checked subtraction; fails on overflow or if the result violates `C`.
    pub fn checked_sub(&self, rhs: impl Into<Amount<C>>) -> Result<Self, AmountError> {
        let rhs = rhs.into();
        let raw = self.0.checked_sub(rhs.0).ok_or(AmountError::Overflow)?;
        Ok(Amount(C::validate(raw)?, PhantomData))
    }

    /// Reinterprets this amount under a different constraint, re-checking it.
    pub fn constrain<C2: Constraint>(&self) -> Result<Amount<C2>, AmountError> {
        Ok(Amount(C2::validate(self.0)?, PhantomData))
    }

    /// Converts an exact decimal coin string (up to 8 fractional digits,
    /// e.g. `"1.00000001"`) into an amount. Rejects any precision beyond 8
    /// digits rather than silently rounding.
    pub fn from_decimal_exact(s: &str) -> Result<Self, AmountError> {
        let satoshis = parse_decimal(s, false).ok_or_else(|| AmountError::InvalidDecimal(s.to_owned()))?;
        Ok(Amount(C::validate(satoshis)?, PhantomData))
    }

    /// Converts a decimal coin string into an amount, truncating any
    /// fractional precision beyond 8 digits instead of rejecting it.
    pub fn from_decimal_inexact(s: &str) -> Result<Self, AmountError> {
        let satoshis = parse_decimal(s, true).ok_or_else(|| AmountError::InvalidDecimal(s.to_owned()))?;
        Ok(Amount(C::validate(satoshis)?, PhantomData))
    }

    /// Formats this amount as a decimal coin string with exactly 8
    /// fractional digits, e.g. `"1.00000001"`.
    pub fn to_decimal(&self) -> String {
        let negative = self.0 < 0;
        let abs = self.0.unsigned_abs();
        let whole = abs / COIN as u64;
        let frac = abs % COIN as u64;
        format!("{}{}.{:08}", if negative { "-" } else { "" }, whole, frac)
    }
}

/// Parses a decimal coin string into satoshis. When `truncate` is `false`,
/// any fractional part with more than 8 digits is rejected rather than
/// rounded. Accepts an optional `[eE][+-]?digits` exponent suffix, shifting
/// the decimal point before the whole/fractional split is made.
fn parse_decimal(s: &str, truncate: bool) -> Option<i64> {
    let s = s.trim();
    let (negative, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };

    let (mantissa, exponent) = match s.find(|c| c == 'e' || c == 'E') {
        Some(pos) => (&s[..pos], s[pos + 1..].parse::<i32>().ok()?),
        None => (s, 0),
    };
    // MAX_MONEY fits in 16 decimal digits; no valid amount needs a shift
    // anywhere near this, so reject early rather than building a
    // multi-gigabyte digit string for an absurd exponent.
    if exponent.abs() > 32 {
        return None;
    }

    let mut parts = mantissa.splitn(2, '.');
    let whole = parts.next()?;
    let frac = parts.next().unwrap_or("");
    if parts.next().is_some() || whole.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    if !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    // Shift the decimal point by `exponent` digits, moving across the
    // whole/fractional split rather than scaling the parsed magnitude, so a
    // huge exponent can't silently wrap in a multiplication.
    let mut digits: String = whole.chars().chain(frac.chars()).collect();
    let mut point = whole.len() as i32 + exponent;
    if point < 0 {
        digits.insert_str(0, &"0".repeat((-point) as usize));
        point = 0;
    }
    while (point as usize) > digits.len() {
        digits.push('0');
    }
    let (whole, frac) = digits.split_at(point as usize);

    if frac.len() > 8 && !truncate {
        return None;
    }
    let mut frac_digits = frac.chars().take(8).collect::<String>();
    while frac_digits.len() < 8 {
        frac_digits.push('0');
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let magnitude: i128 = whole.parse::<i128>().ok()?.checked_mul(COIN as i128)?.checked_add(frac_digits.parse().ok()?)?;
    let magnitude = if negative { -magnitude } else { magnitude };
    i64::try_from(magnitude).ok()
}

impl<C: Constraint> TryFrom<i64> for Amount<C> {
    type Error = AmountError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Ok(Amount(C::validate(value)?, PhantomData))
    }
}

impl<C: Constraint> Clone for Amount<C> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<C: Constraint> Copy for Amount<C> {}

impl<C: Constraint> PartialEq for Amount<C> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl<C: Constraint> Eq for Amount<C> {}

impl<C: Constraint> PartialOrd for Amount<C> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<C: Constraint> Ord for Amount<C> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl<C: Constraint> std::hash::Hash for Amount<C> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<C: Constraint> fmt::Debug for Amount<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Amount").field(&self.0).finish()
    }
}

impl<C: Constraint> fmt::Display for Amount<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

impl From<Amount<NonNegative>> for Amount<NegativeAllowed> {
    fn from(amount: Amount<NonNegative>) -> Self {
        Amount(amount.0, PhantomData)
    }
}

impl<C: Constraint> Neg for Amount<C> {
    type Output = i64;
    fn neg(self) -> i64 {
        -self.0
    }
}

impl Add for Amount<NegativeAllowed> {
    type Output = Result<Amount<NegativeAllowed>, AmountError>;
    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs)
    }
}

impl Sub for Amount<NegativeAllowed> {
    type Output = Result<Amount<NegativeAllowed>, AmountError>;
    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(rhs)
    }
}

impl<C: Constraint> BitcoinSerialize for Amount<C> {
    fn bitcoin_serialize<W: io::Write>(&self, writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl<C: Constraint> BitcoinDeserialize for Amount<C> {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = i64::bitcoin_deserialize(reader)?;
        let raw = C::validate(raw)
            .map_err(|_| SerializationError::parse("amount out of range for its constraint"))?;
        Ok(Amount(raw, PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_exact_roundtrip() {
        let amount: Amount<NegativeAllowed> = Amount::from_decimal_exact("1.23456789").unwrap();
        assert_eq!(amount.satoshis(), 123_456_789);
        assert_eq!(amount.to_decimal(), "1.23456789");
    }

    #[test]
    fn decimal_exact_rejects_extra_precision() {
        assert!(Amount::<NegativeAllowed>::from_decimal_exact("1.234567891").is_err());
    }

    #[test]
    fn decimal_inexact_truncates() {
        let amount: Amount<NegativeAllowed> =
            Amount::from_decimal_inexact("1.234567891").unwrap();
        assert_eq!(amount.satoshis(), 123_456_789);
    }

    #[test]
    fn decimal_exact_parses_the_minimum_i64_at_full_precision() {
        let amount: Amount<NegativeAllowed> =
            Amount::from_decimal_exact("-92233720368.54775808").unwrap();
        assert_eq!(amount.satoshis(), i64::MIN);
    }

    #[test]
    fn decimal_exact_accepts_scientific_notation() {
        let amount: Amount<NegativeAllowed> = Amount::from_decimal_exact("1E-2").unwrap();
        assert_eq!(amount.satoshis(), 1_000_000);
    }

    #[test]
    fn non_negative_rejects_negative_values() {
        assert!(Amount::<NonNegative>::try_from(-1).is_err());
        assert!(Amount::<NonNegative>::try_from(0).is_ok());
    }

    #[test]
    fn checked_add_overflows_at_max_money() {
        let max = Amount::<NonNegative>::try_from(MAX_MONEY).unwrap();
        let one = Amount::<NonNegative>::try_from(1).unwrap();
        assert!(max.checked_add(one).is_err());
    }

    #[test]
    fn negative_allowed_permits_negative_deltas() {
        let a = Amount::<NegativeAllowed>::try_from(-500).unwrap();
        let b = Amount::<NegativeAllowed>::try_from(200).unwrap();
        assert_eq!(a.checked_add(b).unwrap().satoshis(), -300);
    }
}
