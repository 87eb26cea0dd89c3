//! Exact decimal numbers.
//!
//! Number attributes travel as decimal text. [`Number`] is the parsed,
//! canonical form used wherever numbers are compared, normalized or added:
//! no binary floating point is involved, so two texts are equal exactly when
//! they denote the same decimal value.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::NumberError;

/// Maximum number of significant digits a number may carry.
pub const MAX_SIGNIFICANT_DIGITS: usize = 38;

/// Largest allowed decimal magnitude (`9.99…e125`).
const MAX_MAGNITUDE: i64 = 125;

/// Smallest allowed decimal magnitude (`1e-130`).
const MIN_MAGNITUDE: i64 = -130;

/// A decimal number held exactly.
///
/// The value is `0.d1 d2 … dn × 10^exponent` with `d1` and `dn` non-zero.
/// Zero has no digits and is never negative.
///
/// ```
/// use docstore_model::Number;
///
/// let a: Number = "9007199254740993".parse().unwrap();
/// let b: Number = "9007199254740992".parse().unwrap();
/// assert!(a > b);
/// assert_eq!("1985.0".parse::<Number>().unwrap().to_string(), "1985");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Number {
    negative: bool,
    digits: Vec<u8>,
    exponent: i64,
}

impl Number {
    /// Zero.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            negative: false,
            digits: Vec::new(),
            exponent: 0,
        }
    }

    /// Whether this is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.digits.is_empty()
    }

    /// Whether this is below zero.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.negative
    }

    /// The same magnitude with the opposite sign.
    #[must_use]
    pub fn negated(&self) -> Self {
        Self {
            negative: !self.negative && !self.is_zero(),
            ..self.clone()
        }
    }

    /// The integer part as an `i64`, truncating toward zero. `None` when it
    /// does not fit.
    #[must_use]
    pub fn trunc_to_i64(&self) -> Option<i64> {
        let Ok(whole) = usize::try_from(self.exponent) else {
            return Some(0);
        };
        if whole == 0 {
            return Some(0);
        }
        let mut text = String::with_capacity(whole + 1);
        if self.negative {
            text.push('-');
        }
        for position in 0..whole {
            text.push(digit_char(self.digits.get(position).copied().unwrap_or(0)));
        }
        text.parse().ok()
    }

    /// Exact sum.
    pub fn checked_add(&self, other: &Self) -> Result<Self, NumberError> {
        if self.is_zero() {
            return Ok(other.clone());
        }
        if other.is_zero() {
            return Ok(self.clone());
        }

        let scale = self.scale().min(other.scale());
        let a = self.aligned(scale);
        let b = other.aligned(scale);
        let (negative, magnitude) = if self.negative == other.negative {
            (self.negative, add_digits(&a, &b))
        } else {
            match self.magnitude_cmp(other) {
                Ordering::Equal => return Ok(Self::zero()),
                Ordering::Greater => (self.negative, sub_digits(&a, &b)),
                Ordering::Less => (other.negative, sub_digits(&b, &a)),
            }
        };

        let mut digits = magnitude;
        digits.reverse();
        let exponent = len_i64(&digits).saturating_add(scale);
        let sum = Self::normalized(negative, digits, exponent);
        let text = sum.to_string();
        sum.checked(&text)
    }

    /// Exact difference.
    pub fn checked_sub(&self, other: &Self) -> Result<Self, NumberError> {
        self.checked_add(&other.negated())
    }

    /// Exponent of the last significant digit.
    fn scale(&self) -> i64 {
        self.exponent.saturating_sub(len_i64(&self.digits))
    }

    /// Digits, least significant first, padded with zeros down to `scale`.
    fn aligned(&self, scale: i64) -> Vec<u8> {
        let pad = usize::try_from(self.scale() - scale).unwrap_or(0);
        std::iter::repeat_n(0, pad)
            .chain(self.digits.iter().rev().copied())
            .collect()
    }

    /// Compare absolute values of two non-zero numbers.
    fn magnitude_cmp(&self, other: &Self) -> Ordering {
        self.exponent
            .cmp(&other.exponent)
            .then_with(|| self.digits.cmp(&other.digits))
    }

    fn normalized(negative: bool, mut digits: Vec<u8>, mut exponent: i64) -> Self {
        let leading = digits.iter().take_while(|d| **d == 0).count();
        digits.drain(..leading);
        exponent = exponent.saturating_sub(i64::try_from(leading).unwrap_or(i64::MAX));
        while digits.last() == Some(&0) {
            digits.pop();
        }
        if digits.is_empty() {
            return Self::zero();
        }
        Self {
            negative,
            digits,
            exponent,
        }
    }

    fn checked(self, text: &str) -> Result<Self, NumberError> {
        if self.is_zero() {
            return Ok(self);
        }
        if self.digits.len() > MAX_SIGNIFICANT_DIGITS {
            return Err(NumberError::Precision {
                text: text.to_owned(),
                max: MAX_SIGNIFICANT_DIGITS,
            });
        }
        let magnitude = self.exponent.saturating_sub(1);
        if magnitude > MAX_MAGNITUDE {
            return Err(NumberError::Overflow {
                text: text.to_owned(),
            });
        }
        if magnitude < MIN_MAGNITUDE {
            return Err(NumberError::Underflow {
                text: text.to_owned(),
            });
        }
        Ok(self)
    }
}

impl FromStr for Number {
    type Err = NumberError;

    /// Parse `[+-]digits[.digits][(e|E)[+-]digits]`. Surrounding whitespace,
    /// `NaN` and `Infinity` are rejected.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let invalid = || NumberError::Invalid {
            text: text.to_owned(),
        };

        let (negative, rest) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };
        let (mantissa, explicit_exp) = match rest.find(['e', 'E']) {
            Some(pos) => {
                let exp = rest[pos + 1..].parse::<i64>().map_err(|_| invalid())?;
                (&rest[..pos], exp)
            }
            None => (rest, 0),
        };
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let digits: Vec<u8> = whole
            .bytes()
            .chain(fraction.bytes())
            .map(|b| b - b'0')
            .collect();
        let exponent = i64::try_from(whole.len())
            .map_err(|_| invalid())?
            .saturating_add(explicit_exp);
        Self::normalized(negative, digits, exponent).checked(text)
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        let sign = |n: &Self| match (n.is_zero(), n.negative) {
            (true, _) => 0,
            (false, true) => -1,
            (false, false) => 1,
        };
        match sign(self).cmp(&sign(other)) {
            Ordering::Equal => match sign(self) {
                0 => Ordering::Equal,
                1 => self.magnitude_cmp(other),
                _ => other.magnitude_cmp(self),
            },
            unequal => unequal,
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Canonical plain decimal text: no exponent, no redundant zeros.
impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return f.write_str("0");
        }
        let digits: String = self.digits.iter().copied().map(digit_char).collect();
        if self.negative {
            f.write_str("-")?;
        }
        match usize::try_from(self.exponent) {
            Ok(0) | Err(_) => {
                let zeros = usize::try_from(self.exponent.unsigned_abs()).unwrap_or(0);
                write!(f, "0.{}{digits}", "0".repeat(zeros))
            }
            Ok(point) if point >= digits.len() => {
                write!(f, "{digits}{}", "0".repeat(point - digits.len()))
            }
            Ok(point) => write!(f, "{}.{}", &digits[..point], &digits[point..]),
        }
    }
}

fn digit_char(d: u8) -> char {
    char::from(b'0' + d)
}

fn len_i64(digits: &[u8]) -> i64 {
    i64::try_from(digits.len()).unwrap_or(i64::MAX)
}

/// Add two little-endian digit vectors.
fn add_digits(a: &[u8], b: &[u8]) -> Vec<u8> {
    let len = a.len().max(b.len());
    let mut out = Vec::with_capacity(len + 1);
    let mut carry = 0;
    for i in 0..len {
        let sum = a.get(i).copied().unwrap_or(0) + b.get(i).copied().unwrap_or(0) + carry;
        out.push(sum % 10);
        carry = sum / 10;
    }
    if carry > 0 {
        out.push(carry);
    }
    out
}

/// Subtract little-endian `b` from `a`, where `a >= b`.
fn sub_digits(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len());
    let mut borrow = 0;
    for (i, &digit) in a.iter().enumerate() {
        let taken = b.get(i).copied().unwrap_or(0) + borrow;
        if digit >= taken {
            out.push(digit - taken);
            borrow = 0;
        } else {
            out.push(digit + 10 - taken);
            borrow = 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(text: &str) -> Number {
        text.parse().unwrap()
    }

    #[test]
    fn test_should_order_numbers_beyond_f64_precision() {
        assert!(n("9007199254740993") > n("9007199254740992"));
        assert_ne!(n("9007199254740993"), n("9007199254740992"));
        assert!(
            n("12345678901234567890123456789012345678") > n("12345678901234567890123456789012345677")
        );
    }

    #[test]
    fn test_should_treat_equal_values_as_equal() {
        assert_eq!(n("1985"), n("1985.000"));
        assert_eq!(n("1.985e3"), n("1985"));
        assert_eq!(n("-0"), n("0.0"));
        assert_eq!(n("+7"), n("7"));
    }

    #[test]
    fn test_should_order_across_signs_and_scales() {
        let mut values = vec![n("10"), n("-2.5"), n("0"), n("0.001"), n("-100"), n("9.99")];
        values.sort();
        let text: Vec<String> = values.iter().map(ToString::to_string).collect();
        assert_eq!(text, vec!["-100", "-2.5", "0", "0.001", "9.99", "10"]);
    }

    #[test]
    fn test_should_render_canonical_text() {
        assert_eq!(n("1985.0").to_string(), "1985");
        assert_eq!(n("0.0500").to_string(), "0.05");
        assert_eq!(n("-12.50").to_string(), "-12.5");
        assert_eq!(n("1.5e2").to_string(), "150");
        assert_eq!(n("25e-3").to_string(), "0.025");
    }

    #[test]
    fn test_should_reject_non_numeric_text() {
        for text in ["abc", "", "-", ".", "1.2.3", " 1", "1 ", "NaN", "Infinity", "1e", "0x10"] {
            assert!(
                matches!(text.parse::<Number>(), Err(NumberError::Invalid { .. })),
                "accepted {text:?}"
            );
        }
    }

    #[test]
    fn test_should_enforce_precision_and_range() {
        assert!(matches!(
            "123456789012345678901234567890123456789".parse::<Number>(),
            Err(NumberError::Precision { max: 38, .. })
        ));
        assert!(matches!("1e126".parse::<Number>(), Err(NumberError::Overflow { .. })));
        assert!(matches!("1e-131".parse::<Number>(), Err(NumberError::Underflow { .. })));
        assert!("9.99e125".parse::<Number>().is_ok());
        assert!("1e-130".parse::<Number>().is_ok());
        assert!("0e999".parse::<Number>().is_ok());
    }

    #[test]
    fn test_should_add_and_subtract_exactly() {
        assert_eq!(n("0.1").checked_add(&n("0.2")).unwrap().to_string(), "0.3");
        assert_eq!(
            n("9007199254740992").checked_add(&n("1")).unwrap().to_string(),
            "9007199254740993"
        );
        assert_eq!(n("5").checked_sub(&n("7.25")).unwrap().to_string(), "-2.25");
        assert_eq!(n("-3").checked_add(&n("3")).unwrap(), Number::zero());
        assert_eq!(n("999").checked_add(&n("1")).unwrap().to_string(), "1000");
    }

    #[test]
    fn test_should_fail_sum_that_loses_digits() {
        let err = n("1e100").checked_add(&n("1")).unwrap_err();
        assert!(matches!(err, NumberError::Precision { .. }));
    }

    #[test]
    fn test_should_truncate_to_i64() {
        assert_eq!(n("5.9").trunc_to_i64(), Some(5));
        assert_eq!(n("-5.9").trunc_to_i64(), Some(-5));
        assert_eq!(n("0.25").trunc_to_i64(), Some(0));
        assert_eq!(n("1e3").trunc_to_i64(), Some(1000));
        assert_eq!(n("9223372036854775807").trunc_to_i64(), Some(i64::MAX));
        assert_eq!(n("1e30").trunc_to_i64(), None);
    }
}
