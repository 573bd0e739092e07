//! Input Fields
//!
//! Free-text count and multiplier fields. Typing strips every non-digit character,
//! an empty field is a valid transient state, and blurring an empty field resolves
//! it to the field's default.

use std::marker::PhantomData;

use thiserror::Error;

/// Largest count a single entry accepts.
pub const MAX_COUNT: u32 = 9999;

/// Largest multiplier a single entry accepts.
pub const MAX_MULTIPLIER: u32 = 999;

/// Errors from [`parse_count`].
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ParseCountError {
    /// The input was empty.
    #[error("input is empty")]
    Empty,

    /// The input contained something other than ASCII digits.
    #[error("non-digit character at byte {0}")]
    InvalidDigit(usize),

    /// The number does not fit in a `u32`.
    #[error("number is too large")]
    Overflow,
}

/// Parses a digits-only string into a non-negative count.
///
/// Leading zeros are accepted. Callers decide what an empty string means through
/// their [`FieldPolicy`].
///
/// # Errors
///
/// Returns a [`ParseCountError`] for empty input, non-digit characters, or numbers
/// that do not fit in a `u32`.
pub fn parse_count(input: &str) -> Result<u32, ParseCountError> {
    if input.is_empty() {
        return Err(ParseCountError::Empty);
    }

    if let Some(position) = input.find(|c: char| !c.is_ascii_digit()) {
        return Err(ParseCountError::InvalidDigit(position));
    }

    input
        .parse::<u32>()
        .map_err(|_err| ParseCountError::Overflow)
}

/// Keeps only the ASCII digits of `raw`.
pub fn sanitize_digits(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Default and ceiling for one kind of input field.
pub trait FieldPolicy {
    /// Value used while the field is empty and written back on blur.
    const DEFAULT: u32;

    /// Largest accepted value; input above it is ignored.
    const MAX: u32;
}

/// Policy for the count field: empty means 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Count;

impl FieldPolicy for Count {
    const DEFAULT: u32 = 0;
    const MAX: u32 = MAX_COUNT;
}

/// Policy for the multiplier field: empty means 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Multiplier;

impl FieldPolicy for Multiplier {
    const DEFAULT: u32 = 1;
    const MAX: u32 = MAX_MULTIPLIER;
}

/// Count input field.
pub type CountField = InputField<Count>;

/// Multiplier input field.
pub type MultiplierField = InputField<Multiplier>;

/// Text of a numeric field together with the policy that interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputField<P> {
    text: String,
    policy: PhantomData<P>,
}

impl<P: FieldPolicy> InputField<P> {
    /// A field showing the policy default.
    #[must_use]
    pub fn new() -> Self {
        Self::with_value(P::DEFAULT)
    }

    /// A field showing `value`, capped at the policy maximum.
    #[must_use]
    pub fn with_value(value: u32) -> Self {
        Self {
            text: value.min(P::MAX).to_string(),
            policy: PhantomData,
        }
    }

    /// Applies typed text. Non-digits are stripped; values above the maximum are
    /// ignored and the previous text is kept.
    ///
    /// Returns `true` if the field text changed.
    pub fn input(&mut self, raw: &str) -> bool {
        let digits = sanitize_digits(raw);

        let accepted = digits.is_empty() || parse_count(&digits).is_ok_and(|value| value <= P::MAX);

        if !accepted || digits == self.text {
            return false;
        }

        self.text = digits;

        true
    }

    /// Resolves an empty field to the policy default. Returns `true` if the text changed.
    pub fn blur(&mut self) -> bool {
        if !self.text.is_empty() {
            return false;
        }

        self.text = P::DEFAULT.to_string();

        true
    }

    /// Puts the field back to its default.
    pub fn reset(&mut self) {
        self.text = P::DEFAULT.to_string();
    }

    /// The numeric value, with an empty field read as the policy default.
    #[must_use]
    pub fn value(&self) -> u32 {
        parse_count(&self.text).map_or(P::DEFAULT, |value| value.min(P::MAX))
    }

    /// The displayed text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether the field is in its transient empty state.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl<P: FieldPolicy> Default for InputField<P> {
    fn default() -> Self {
        Self::new()
    }
}
