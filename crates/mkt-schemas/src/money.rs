//! Fixed-point money type.
//!
//! # Motivation
//!
//! All money amounts on the payment path use minor units (cents) stored as
//! `i64`. Using raw `i64` for money is error-prone: it allows accidental
//! arithmetic with unrelated integers (ratings, version counters, sequence
//! numbers) without any compile-time signal.
//!
//! `Cents` wraps the raw `i64` so the type system prevents:
//! - Implicit construction from raw `i64` (no `From<i64>` impl).
//! - Mixing `Cents` with unrelated `i64` values in arithmetic.
//!
//! # Scale
//!
//! 1 major unit (e.g. 1 USD) = `Cents(100)`. Price breakdowns are stored as
//! decimal major-unit strings at rest and converted here, at the boundary,
//! before any payment-port call. No `f64` appears anywhere on this path.

use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// Scale factor: 1 major unit = 100 minor units (2 decimal places).
pub const CENTS_PER_UNIT: i64 = 100;

// ---------------------------------------------------------------------------
// MoneyError
// ---------------------------------------------------------------------------

/// Errors returned when a decimal major-unit string is not representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The input was empty or contained characters other than digits, an
    /// optional leading sign, and at most one decimal point.
    Malformed(String),
    /// More than two fraction digits — sub-cent amounts are not representable.
    TooPrecise(String),
    /// The value would overflow `i64` after scaling to minor units.
    OutOfRange(String),
}

impl std::fmt::Display for MoneyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoneyError::Malformed(s) => write!(f, "malformed money amount '{s}'"),
            MoneyError::TooPrecise(s) => {
                write!(f, "money amount '{s}' has more than 2 fraction digits")
            }
            MoneyError::OutOfRange(s) => write!(f, "money amount '{s}' out of i64 cent range"),
        }
    }
}

impl std::error::Error for MoneyError {}

// ---------------------------------------------------------------------------
// Cents newtype
// ---------------------------------------------------------------------------

/// A fixed-point monetary amount in minor units (cents).
///
/// # Construction
///
/// Use [`Cents::new`] for explicit construction from a raw minor-unit count,
/// or [`Cents::parse_major`] to convert a decimal major-unit string. There is
/// intentionally no `From<i64>` implementation — callers must be deliberate
/// about when a raw integer represents money.
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cents(i64);

impl Cents {
    /// Zero monetary amount.
    pub const ZERO: Cents = Cents(0);

    /// Construct from a raw minor-unit count.
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Cents(raw)
    }

    /// Extract the underlying raw minor-unit count.
    ///
    /// Use when crossing a boundary that requires raw integers (DB columns,
    /// gateway wire formats).
    #[inline]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// `true` if this amount is strictly positive.
    #[inline]
    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// `true` if this amount is strictly negative.
    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Saturating addition — clamps at `i64::MAX` on overflow.
    #[inline]
    pub fn saturating_add(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_add(rhs.0))
    }

    /// Saturating subtraction — clamps at `i64::MIN` on underflow.
    #[inline]
    pub fn saturating_sub(self, rhs: Cents) -> Cents {
        Cents(self.0.saturating_sub(rhs.0))
    }

    /// Checked subtraction. Returns `None` on overflow.
    #[inline]
    pub fn checked_sub(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_sub(rhs.0).map(Cents)
    }

    /// Checked addition. Returns `None` on overflow.
    #[inline]
    pub fn checked_add(self, rhs: Cents) -> Option<Cents> {
        self.0.checked_add(rhs.0).map(Cents)
    }

    /// Fee fraction in basis points (1 bps = 0.01%), rounded toward zero.
    ///
    /// Overflow returns `None`; a fee calculation that overflows `i64` cents
    /// is a critical data error, not a routine saturation.
    #[inline]
    pub fn checked_bps(self, bps: i64) -> Option<Cents> {
        self.0.checked_mul(bps).map(|v| Cents(v / 10_000))
    }

    /// Parse a decimal major-unit string (e.g. `"115.00"`, `"7"`, `"-0.50"`)
    /// into minor units.
    ///
    /// Accepts at most two fraction digits; a single digit is interpreted as
    /// tenths (`"1.5"` == 150 cents). Rejects anything else rather than
    /// guessing — money parsing must be exact.
    pub fn parse_major(s: &str) -> Result<Cents, MoneyError> {
        let t = s.trim();
        if t.is_empty() {
            return Err(MoneyError::Malformed(s.to_string()));
        }

        let (negative, body) = match t.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, t),
        };

        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, fr)) => (i, fr),
            None => (body, ""),
        };

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(MoneyError::Malformed(s.to_string()));
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(MoneyError::Malformed(s.to_string()));
        }
        if frac_part.len() > 2 {
            return Err(MoneyError::TooPrecise(s.to_string()));
        }

        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| MoneyError::OutOfRange(s.to_string()))?
        };

        // At most 2 ascii digits: parse cannot fail or overflow.
        let frac: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().unwrap_or(0) * 10,
            _ => frac_part.parse::<i64>().unwrap_or(0),
        };

        let cents = whole
            .checked_mul(CENTS_PER_UNIT)
            .and_then(|v| v.checked_add(frac))
            .ok_or_else(|| MoneyError::OutOfRange(s.to_string()))?;

        Ok(Cents(if negative { -cents } else { cents }))
    }
}

// ---------------------------------------------------------------------------
// Arithmetic operators (closed over Cents)
// ---------------------------------------------------------------------------

impl Add for Cents {
    type Output = Cents;
    #[inline]
    fn add(self, rhs: Cents) -> Cents {
        Cents(self.0 + rhs.0)
    }
}

impl Sub for Cents {
    type Output = Cents;
    #[inline]
    fn sub(self, rhs: Cents) -> Cents {
        Cents(self.0 - rhs.0)
    }
}

impl Neg for Cents {
    type Output = Cents;
    #[inline]
    fn neg(self) -> Cents {
        Cents(-self.0)
    }
}

impl AddAssign for Cents {
    #[inline]
    fn add_assign(&mut self, rhs: Cents) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Cents {
    #[inline]
    fn sub_assign(&mut self, rhs: Cents) {
        self.0 -= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl std::fmt::Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let units = self.0 / CENTS_PER_UNIT;
        let frac = (self.0 % CENTS_PER_UNIT).abs();
        // When |value| < 1 unit and value is negative, `units` truncates to 0,
        // losing the sign. Emit "-0" explicitly in that case.
        if self.0 < 0 && units == 0 {
            write!(f, "-{units}.{frac:02}")
        } else {
            write!(f, "{units}.{frac:02}")
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
