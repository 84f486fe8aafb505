//! Storage quantities.
//!
//! Parses and prints sizes the way the cluster API does: `100Gi`, `0.5Gi`,
//! `500M`, `2e3` or a bare byte count. The integer value rounds up, so a
//! fractional byte counts as a whole one.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::QuantityError;

/// How a quantity prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuantityFormat {
    /// Powers of two: `Ki`, `Mi`, `Gi`, ...
    BinarySI,
    /// Powers of ten: `k`, `M`, `G`, ...
    DecimalSI,
    /// Scientific notation: `1e3`.
    DecimalExponent,
}

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL_SUFFIXES: [(&str, i32); 9] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
];

/// Exa is handled apart from the table because a bare `E` is ambiguous with
/// an exponent marker.
const EXA_EXPONENT: i32 = 18;

/// A storage size with its preferred display format.
///
/// Equality, ordering and hashing use the integer value only, so `1Gi` and
/// `1073741824` compare equal.
#[derive(Debug, Clone, Copy)]
pub struct Quantity {
    value: i64,
    format: QuantityFormat,
}

impl Quantity {
    pub const ZERO: Quantity = Quantity {
        value: 0,
        format: QuantityFormat::DecimalSI,
    };

    pub fn new(value: i64, format: QuantityFormat) -> Self {
        Self { value, format }
    }

    /// Parse a quantity string, failing on malformed input.
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        input.parse()
    }

    /// Integer value, rounded up.
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.value == 0
    }

    /// A quantity with a different value but the same display format.
    pub fn with_value(&self, value: i64) -> Self {
        Self {
            value,
            format: self.format,
        }
    }

    /// Add `other`, keeping this quantity's format.
    pub fn checked_add(&self, other: &Quantity) -> Option<Self> {
        self.value.checked_add(other.value).map(|v| self.with_value(v))
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for Quantity {}

impl Hash for Quantity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        if input.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, rest) = match input.as_bytes()[0] {
            b'-' => (true, &input[1..]),
            b'+' => (false, &input[1..]),
            _ => (false, input),
        };

        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, suffix) = rest.split_at(number_len);

        let (mantissa, fraction_digits) = parse_mantissa(number)
            .ok_or_else(|| QuantityError::InvalidNumber(input.to_string()))?;

        let scale = parse_suffix(suffix).ok_or_else(|| QuantityError::UnknownSuffix {
            input: input.to_string(),
            suffix: suffix.to_string(),
        })?;

        let (numerator, denominator) = match scale {
            Scale::Binary(shift) => (
                mantissa.checked_mul(1u128 << shift),
                pow10(fraction_digits as i32),
            ),
            Scale::Decimal(exp) | Scale::Exponent(exp) => {
                let net = exp - fraction_digits as i32;
                if net >= 0 {
                    (pow10(net).and_then(|p| mantissa.checked_mul(p)), Some(1))
                } else {
                    (Some(mantissa), pow10(-net))
                }
            }
        };

        let out_of_range = || QuantityError::OutOfRange(input.to_string());
        let numerator = numerator.ok_or_else(out_of_range)?;
        let denominator = denominator.ok_or_else(out_of_range)?;

        // Round away from zero toward the next whole unit.
        let whole = numerator / denominator;
        let magnitude = if numerator % denominator != 0 && !negative {
            whole + 1
        } else {
            whole
        };
        let magnitude = i64::try_from(magnitude).map_err(|_| out_of_range())?;

        let format = match scale {
            Scale::Binary(_) => QuantityFormat::BinarySI,
            Scale::Decimal(_) => QuantityFormat::DecimalSI,
            Scale::Exponent(_) => QuantityFormat::DecimalExponent,
        };

        Ok(Self {
            value: if negative { -magnitude } else { magnitude },
            format,
        })
    }
}

enum Scale {
    Binary(u32),
    Decimal(i32),
    Exponent(i32),
}

fn parse_mantissa(number: &str) -> Option<(u128, u32)> {
    let mut parts = number.splitn(2, '.');
    let int_part = parts.next().unwrap_or("");
    let frac_part = parts.next().unwrap_or("");

    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.contains('.') {
        return None;
    }

    let frac_part = frac_part.trim_end_matches('0');
    let mut mantissa: u128 = 0;
    for c in int_part.chars().chain(frac_part.chars()) {
        let digit = c.to_digit(10)? as u128;
        mantissa = mantissa.checked_mul(10)?.checked_add(digit)?;
    }

    Some((mantissa, frac_part.len() as u32))
}

fn parse_suffix(suffix: &str) -> Option<Scale> {
    if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(Scale::Binary(*shift));
    }
    if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
        return Some(Scale::Decimal(*exp));
    }
    if suffix == "E" {
        return Some(Scale::Decimal(EXA_EXPONENT));
    }
    if let Some(exp) = suffix.strip_prefix(['e', 'E']) {
        return exp.parse::<i32>().ok().map(Scale::Exponent);
    }
    None
}

fn pow10(exp: i32) -> Option<u128> {
    if exp < 0 {
        return None;
    }
    10u128.checked_pow(exp as u32)
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.value == 0 {
            return write!(f, "0");
        }

        match self.format {
            QuantityFormat::BinarySI => {
                for (suffix, shift) in BINARY_SUFFIXES.iter().rev() {
                    let unit = 1i64 << shift;
                    if self.value % unit == 0 {
                        return write!(f, "{}{}", self.value / unit, suffix);
                    }
                }
                write!(f, "{}", self.value)
            }
            QuantityFormat::DecimalSI => {
                let units = [("E", 18u32), ("P", 15), ("T", 12), ("G", 9), ("M", 6), ("k", 3)];
                for (suffix, exp) in units {
                    let unit = 10i64.pow(exp);
                    if self.value % unit == 0 {
                        return write!(f, "{}{}", self.value / unit, suffix);
                    }
                }
                write!(f, "{}", self.value)
            }
            QuantityFormat::DecimalExponent => {
                let mut mantissa = self.value;
                let mut exp = 0;
                while mantissa % 1000 == 0 {
                    mantissa /= 1000;
                    exp += 3;
                }
                if exp == 0 {
                    write!(f, "{}", mantissa)
                } else {
                    write!(f, "{}e{}", mantissa, exp)
                }
            }
        }
    }
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
