//! Denominations
//!
//! Coin and note face values. A denomination is the key every count, line total and
//! persisted snapshot is stored under, so values are normalised on construction:
//! `0.10` and `0.1` are the same denomination.

use std::{fmt, str::FromStr};

use num_traits::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

use crate::totals::round_amount;

/// Face values below this amount are coins; this amount and above are notes.
pub const NOTE_THRESHOLD: Decimal = Decimal::from_parts(20, 0, 0, false, 0);

/// Largest face value accepted. Keeps `value × count` and the sums over a totals map
/// well inside the decimal range.
pub const MAX_FACE_VALUE: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// Coins offered by the counter, smallest first.
pub const COINS: [Denomination; 6] = [
    Denomination::from_parts(1, 1),
    Denomination::from_parts(5, 1),
    Denomination::from_parts(1, 0),
    Denomination::from_parts(2, 0),
    Denomination::from_parts(5, 0),
    Denomination::from_parts(10, 0),
];

/// Notes offered by the counter, smallest first.
pub const NOTES: [Denomination; 4] = [
    Denomination::from_parts(20, 0),
    Denomination::from_parts(50, 0),
    Denomination::from_parts(100, 0),
    Denomination::from_parts(200, 0),
];

/// Errors produced when constructing a denomination.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DenominationError {
    /// Zero or negative face value.
    #[error("denomination must be positive, got {0}")]
    NotPositive(Decimal),

    /// Face value above [`MAX_FACE_VALUE`].
    #[error("denomination {0} exceeds the maximum face value of 1000000000")]
    TooLarge(Decimal),

    /// NaN or infinite floating point input.
    #[error("denomination is not a finite number")]
    NotFinite,

    /// Floating point input outside the decimal range.
    #[error("denomination {0} is out of range")]
    OutOfRange(f64),

    /// Text that is not a decimal number.
    #[error("invalid denomination: {0:?}")]
    Parse(String),
}

/// Whether a denomination is counted as a coin or a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    /// Face value below [`NOTE_THRESHOLD`].
    Coin,

    /// Face value at or above [`NOTE_THRESHOLD`].
    Note,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Coin => f.write_str("coin"),
            Kind::Note => f.write_str("note"),
        }
    }
}

/// A positive face value, normalised so equal amounts compare and hash equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Denomination(Decimal);

impl Denomination {
    /// Creates a denomination from a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns [`DenominationError::NotPositive`] for zero or negative amounts and
    /// [`DenominationError::TooLarge`] above [`MAX_FACE_VALUE`].
    pub fn new(value: Decimal) -> Result<Self, DenominationError> {
        if value <= Decimal::ZERO {
            return Err(DenominationError::NotPositive(value));
        }

        if value > MAX_FACE_VALUE {
            return Err(DenominationError::TooLarge(value));
        }

        Ok(Self(value.normalize()))
    }

    /// Creates a denomination from a floating point amount, as supplied by a UI layer.
    ///
    /// # Errors
    ///
    /// Returns a [`DenominationError`] if the value is not finite, cannot be
    /// represented as a decimal, or is not positive.
    pub fn try_from_f64(value: f64) -> Result<Self, DenominationError> {
        if !value.is_finite() {
            return Err(DenominationError::NotFinite);
        }

        let decimal = Decimal::from_f64(value).ok_or(DenominationError::OutOfRange(value))?;

        Self::new(decimal)
    }

    /// Every fixed denomination: coins first, then notes.
    pub fn all() -> impl Iterator<Item = Denomination> {
        COINS.into_iter().chain(NOTES)
    }

    /// The face value.
    #[must_use]
    pub const fn value(self) -> Decimal {
        self.0
    }

    /// Coin or note, split on [`NOTE_THRESHOLD`].
    #[must_use]
    pub fn kind(self) -> Kind {
        if self.0 < NOTE_THRESHOLD {
            Kind::Coin
        } else {
            Kind::Note
        }
    }

    /// `value × count`, rounded to 2 decimal places.
    #[must_use]
    pub fn line_total(self, count: u32) -> Decimal {
        round_amount(self.0.saturating_mul(Decimal::from(count)))
    }

    const fn from_parts(units: u32, scale: u32) -> Self {
        Self(Decimal::from_parts(units, 0, 0, false, scale))
    }
}

impl fmt::Display for Denomination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Denomination {
    type Err = DenominationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s.trim()).map_err(|_err| DenominationError::Parse(s.to_string()))?;

        Self::new(value)
    }
}

impl TryFrom<Decimal> for Denomination {
    type Error = DenominationError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Serialised as the shortest decimal string (`"0.1"`, `"20"`), which is also the
/// key format of persisted totals maps.
impl Serialize for Denomination {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Denomination {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;

        text.parse().map_err(de::Error::custom)
    }
}
