//! Totals
//!
//! The totals map is the single source of truth for subtotals. Aggregates are always
//! recomputed from `denomination × count`; line totals reported by callers are never
//! summed directly.

use std::collections::{BTreeMap, btree_map};

use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use tracing::debug;

use crate::{
    denominations::{Denomination, DenominationError, Kind},
    entry::EntryChange,
};

/// Ceiling applied to every effective count reaching the aggregator.
pub const MAX_EFFECTIVE_COUNT: u32 = 9999;

/// Rounds an amount to 2 decimal places, halves away from zero.
#[must_use]
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Count and line total stored for one denomination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineState {
    /// Effective count (count × multiplier).
    pub count: u32,

    /// `denomination × count`, rounded to 2 decimal places.
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
}

impl LineState {
    /// The consistent line state for `count` units of `denomination`.
    #[must_use]
    pub fn for_count(denomination: Denomination, count: u32) -> Self {
        Self {
            count,
            total: denomination.line_total(count),
        }
    }
}

/// Denomination → line state, holding only denominations with a non-zero count.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TotalsMap(BTreeMap<Denomination, LineState>);

impl TotalsMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from raw lines: zero counts are dropped, counts are clamped to
    /// [`MAX_EFFECTIVE_COUNT`], and every total is recomputed.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = (Denomination, LineState)>) -> Self {
        lines
            .into_iter()
            .map(|(denomination, line)| (denomination, line.count))
            .collect()
    }

    /// The line for `denomination`, if it has a non-zero count.
    #[must_use]
    pub fn get(&self, denomination: Denomination) -> Option<&LineState> {
        self.0.get(&denomination)
    }

    /// The stored count for `denomination`, zero when absent.
    #[must_use]
    pub fn count(&self, denomination: Denomination) -> u32 {
        self.get(denomination).map_or(0, |line| line.count)
    }

    /// Whether `denomination` has a non-zero count.
    #[must_use]
    pub fn contains(&self, denomination: Denomination) -> bool {
        self.0.contains_key(&denomination)
    }

    /// Lines in ascending denomination order.
    pub fn iter(&self) -> btree_map::Iter<'_, Denomination, LineState> {
        self.0.iter()
    }

    /// Number of denominations with a non-zero count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing has been entered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Coin, note and grand totals for this map.
    #[must_use]
    pub fn aggregates(&self) -> Aggregates {
        Aggregates::from_totals(self)
    }

    fn set(&mut self, denomination: Denomination, count: u32) -> Option<LineState> {
        self.0
            .insert(denomination, LineState::for_count(denomination, count))
    }

    fn remove(&mut self, denomination: Denomination) -> Option<LineState> {
        self.0.remove(&denomination)
    }

    fn clear(&mut self) {
        self.0.clear();
    }
}

impl FromIterator<(Denomination, u32)> for TotalsMap {
    fn from_iter<I: IntoIterator<Item = (Denomination, u32)>>(iter: I) -> Self {
        let mut totals = Self::new();

        for (denomination, count) in iter {
            let count = count.min(MAX_EFFECTIVE_COUNT);

            if count > 0 {
                totals.set(denomination, count);
            }
        }

        totals
    }
}

impl<'a> IntoIterator for &'a TotalsMap {
    type Item = (&'a Denomination, &'a LineState);
    type IntoIter = btree_map::Iter<'a, Denomination, LineState>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl Serialize for TotalsMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

/// Stored maps are not trusted: they are passed through [`TotalsMap::from_lines`].
impl<'de> Deserialize<'de> for TotalsMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BTreeMap::<Denomination, LineState>::deserialize(deserializer).map(Self::from_lines)
    }
}

/// Coin, note and grand totals, each rounded to 2 decimal places.
#[expect(
    clippy::struct_field_names,
    reason = "Field names mirror the stored grandTotal/coinTotal/noteTotal keys"
)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    /// Sum over denominations below the note threshold.
    #[serde(with = "rust_decimal::serde::float")]
    pub coin_total: Decimal,

    /// Sum over denominations at or above the note threshold.
    #[serde(with = "rust_decimal::serde::float")]
    pub note_total: Decimal,

    /// `coin_total + note_total`.
    #[serde(with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,
}

impl Aggregates {
    /// Sums `denomination × count` per partition, then rounds each subtotal once.
    #[must_use]
    pub fn from_totals(totals: &TotalsMap) -> Self {
        let (coins, notes) = totals.iter().fold(
            (Decimal::ZERO, Decimal::ZERO),
            |(coins, notes), (denomination, line)| {
                let amount = denomination.value().saturating_mul(Decimal::from(line.count));

                match denomination.kind() {
                    Kind::Coin => (coins.saturating_add(amount), notes),
                    Kind::Note => (coins, notes.saturating_add(amount)),
                }
            },
        );

        let coin_total = round_amount(coins);
        let note_total = round_amount(notes);

        Self {
            coin_total,
            note_total,
            grand_total: round_amount(coin_total.saturating_add(note_total)),
        }
    }

    /// Whether there is a positive amount to save.
    #[must_use]
    pub fn has_amount(&self) -> bool {
        self.grand_total > Decimal::ZERO
    }
}

/// Reasons a raw change is rejected before it reaches the totals map.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum InvalidChange {
    /// The denomination value was NaN or infinite.
    #[error("denomination value is not finite")]
    NonFiniteValue,

    /// The denomination value was zero, negative or out of range.
    #[error("denomination value must be a positive amount")]
    InvalidDenomination,

    /// The denomination value was above the largest face value.
    #[error("denomination value is too large to total")]
    Overflow,

    /// The effective count was NaN or infinite.
    #[error("effective count is not finite")]
    NonFiniteCount,

    /// The effective count was negative.
    #[error("effective count is negative")]
    NegativeCount,

    /// The effective count had a fractional part.
    #[error("effective count is not a whole number")]
    FractionalCount,
}

/// What an applied change did to the totals map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The change was invalid; nothing changed.
    Rejected(InvalidChange),

    /// A newer reset superseded the change; nothing changed.
    Superseded,

    /// The stored count already matched (or a zero count was already absent).
    Unchanged,

    /// The denomination's count was set.
    Updated {
        /// The stored count.
        count: u32,

        /// Whether the incoming count was above [`MAX_EFFECTIVE_COUNT`].
        clamped: bool,
    },

    /// The denomination was removed because its count became zero.
    Removed,
}

impl ApplyOutcome {
    /// Whether the totals map changed.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        matches!(self, ApplyOutcome::Updated { .. } | ApplyOutcome::Removed)
    }
}

/// Owns the totals map and keeps the aggregates in step with it.
#[derive(Debug, Clone, Default)]
pub struct TotalsAggregator {
    totals: TotalsMap,
    aggregates: Aggregates,
}

impl TotalsAggregator {
    /// An aggregator with an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// An aggregator starting from `totals`.
    #[must_use]
    pub fn with_totals(totals: TotalsMap) -> Self {
        let aggregates = totals.aggregates();

        Self { totals, aggregates }
    }

    /// Applies a change as reported by a UI entry, in floating point.
    ///
    /// `line_total` is only checked for consistency; the stored total is always
    /// recomputed from `value × effective_count`.
    pub fn apply_change(&mut self, value: f64, effective_count: f64, line_total: f64) -> ApplyOutcome {
        let (denomination, count) = match validate(value, effective_count) {
            Ok(valid) => valid,
            Err(reason) => {
                debug!(value, effective_count, %reason, "rejected totals change");

                return ApplyOutcome::Rejected(reason);
            }
        };

        let expected = denomination.line_total(count.min(MAX_EFFECTIVE_COUNT));

        if Decimal::from_f64(line_total).map(round_amount) != Some(expected) {
            debug!(
                %denomination,
                line_total,
                %expected,
                "reported line total disagrees with count; using recomputed total"
            );
        }

        self.apply(denomination, count)
    }

    /// Applies an entry's emitted change.
    pub fn apply_entry(&mut self, change: &EntryChange) -> ApplyOutcome {
        self.apply(change.denomination, change.effective_count)
    }

    /// Sets the effective count for `denomination`.
    ///
    /// A zero count removes the denomination. A count equal to the stored one is a
    /// no-op, so repeated notifications do not trigger recomputation or writes.
    pub fn apply(&mut self, denomination: Denomination, effective_count: u32) -> ApplyOutcome {
        let clamped = effective_count > MAX_EFFECTIVE_COUNT;
        let count = effective_count.min(MAX_EFFECTIVE_COUNT);

        if count == 0 {
            if self.totals.remove(denomination).is_none() {
                return ApplyOutcome::Unchanged;
            }

            self.recompute();

            return ApplyOutcome::Removed;
        }

        if self.totals.count(denomination) == count {
            return ApplyOutcome::Unchanged;
        }

        self.totals.set(denomination, count);
        self.recompute();

        ApplyOutcome::Updated { count, clamped }
    }

    /// Empties the map. Returns `true` if anything was removed.
    pub fn clear(&mut self) -> bool {
        if self.totals.is_empty() {
            return false;
        }

        self.totals.clear();
        self.recompute();

        true
    }

    /// Installs `totals` as the live map.
    pub fn replace(&mut self, totals: TotalsMap) {
        self.totals = totals;
        self.recompute();
    }

    /// The live totals map.
    #[must_use]
    pub fn totals(&self) -> &TotalsMap {
        &self.totals
    }

    /// The current aggregates.
    #[must_use]
    pub fn aggregates(&self) -> Aggregates {
        self.aggregates
    }

    fn recompute(&mut self) {
        self.aggregates = self.totals.aggregates();
    }
}

fn validate(value: f64, effective_count: f64) -> Result<(Denomination, u32), InvalidChange> {
    if !value.is_finite() {
        return Err(InvalidChange::NonFiniteValue);
    }

    if !effective_count.is_finite() {
        return Err(InvalidChange::NonFiniteCount);
    }

    if effective_count < 0.0 {
        return Err(InvalidChange::NegativeCount);
    }

    if effective_count.fract() > 0.0 {
        return Err(InvalidChange::FractionalCount);
    }

    let denomination = Denomination::try_from_f64(value).map_err(|error| match error {
        DenominationError::TooLarge(_) | DenominationError::OutOfRange(_) => InvalidChange::Overflow,
        _ => InvalidChange::InvalidDenomination,
    })?;

    Ok((denomination, effective_count.to_u32().unwrap_or(u32::MAX)))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use testresult::TestResult;

    use super::*;

    fn denomination(value: Decimal) -> Denomination {
        Denomination::new(value).expect("test denominations are positive")
    }

    #[test]
    fn coins_and_notes_are_summed_separately() {
        let mut aggregator = TotalsAggregator::new();

        aggregator.apply(denomination(dec!(1)), 3);
        aggregator.apply(denomination(dec!(20)), 2);

        let aggregates = aggregator.aggregates();
        assert_eq!(aggregates.coin_total, dec!(3.00));
        assert_eq!(aggregates.note_total, dec!(40.00));
        assert_eq!(aggregates.grand_total, dec!(43.00));
    }

    #[test]
    fn repeated_change_is_unchanged() {
        let mut aggregator = TotalsAggregator::new();
        let coin = denomination(dec!(5));

        assert_eq!(
            aggregator.apply(coin, 2),
            ApplyOutcome::Updated {
                count: 2,
                clamped: false
            }
        );
        assert_eq!(aggregator.apply(coin, 2), ApplyOutcome::Unchanged);
        assert_eq!(aggregator.aggregates().coin_total, dec!(10));
    }

    #[test]
    fn zero_count_removes_key() {
        let mut aggregator = TotalsAggregator::new();
        let coin = denomination(dec!(0.1));

        aggregator.apply(coin, 5);
        assert_eq!(aggregator.aggregates().grand_total, dec!(0.50));

        assert_eq!(aggregator.apply(coin, 0), ApplyOutcome::Removed);
        assert!(!aggregator.totals().contains(coin));
        assert_eq!(aggregator.aggregates().grand_total, Decimal::ZERO);

        assert_eq!(aggregator.apply(coin, 0), ApplyOutcome::Unchanged);
    }

    #[test]
    fn counts_are_clamped_to_ceiling() {
        let mut aggregator = TotalsAggregator::new();
        let coin = denomination(dec!(10));

        assert_eq!(
            aggregator.apply(coin, 10_000),
            ApplyOutcome::Updated {
                count: 9999,
                clamped: true
            }
        );
        assert_eq!(aggregator.totals().count(coin), 9999);
        assert_eq!(aggregator.aggregates().coin_total, dec!(99990));
    }

    #[test]
    fn raw_changes_are_validated() {
        let mut aggregator = TotalsAggregator::new();

        assert_eq!(
            aggregator.apply_change(f64::NAN, 1.0, 0.0),
            ApplyOutcome::Rejected(InvalidChange::NonFiniteValue)
        );
        assert_eq!(
            aggregator.apply_change(1.0, f64::INFINITY, 0.0),
            ApplyOutcome::Rejected(InvalidChange::NonFiniteCount)
        );
        assert_eq!(
            aggregator.apply_change(1.0, -1.0, -1.0),
            ApplyOutcome::Rejected(InvalidChange::NegativeCount)
        );
        assert_eq!(
            aggregator.apply_change(1.0, 1.5, 1.5),
            ApplyOutcome::Rejected(InvalidChange::FractionalCount)
        );
        assert_eq!(
            aggregator.apply_change(-5.0, 1.0, -5.0),
            ApplyOutcome::Rejected(InvalidChange::InvalidDenomination)
        );
        assert!(aggregator.totals().is_empty());
    }

    #[test]
    fn oversized_denominations_are_rejected_not_totalled() {
        let mut aggregator = TotalsAggregator::new();

        aggregator.apply_change(200.0, 2.0, 400.0);

        assert_eq!(
            aggregator.apply_change(1e25, 9999.0, 0.0),
            ApplyOutcome::Rejected(InvalidChange::Overflow)
        );
        assert_eq!(
            aggregator.apply_change(1e30, 1.0, 0.0),
            ApplyOutcome::Rejected(InvalidChange::Overflow)
        );
        assert_eq!(aggregator.totals().len(), 1);
        assert_eq!(aggregator.aggregates().grand_total, dec!(400));
    }

    #[test]
    fn stored_oversized_denomination_fails_to_load() {
        let json = r#"{"10000000000000000000000000":{"count":9999,"total":0}}"#;

        assert!(serde_json::from_str::<TotalsMap>(json).is_err());
    }

    #[test]
    fn raw_change_recomputes_inconsistent_total() {
        let mut aggregator = TotalsAggregator::new();

        aggregator.apply_change(0.1, 3.0, 999.0);

        let line = aggregator
            .totals()
            .get(denomination(dec!(0.1)))
            .copied()
            .expect("line should be stored");

        assert_eq!(line.total, dec!(0.30));
        assert_eq!(aggregator.aggregates().coin_total, dec!(0.30));
    }

    #[test]
    fn fractional_denominations_sum_without_drift() {
        let mut aggregator = TotalsAggregator::new();

        aggregator.apply_change(0.1, 7.0, 0.7);
        aggregator.apply_change(0.5, 3.0, 1.5);
        aggregator.apply_change(2.0, 1.0, 2.0);

        assert_eq!(aggregator.aggregates().coin_total, dec!(4.20));
    }

    #[test]
    fn clear_reports_whether_anything_was_removed() {
        let mut aggregator = TotalsAggregator::new();

        assert!(!aggregator.clear());

        aggregator.apply(denomination(dec!(50)), 1);

        assert!(aggregator.clear());
        assert_eq!(aggregator.aggregates(), Aggregates::default());
    }

    #[test]
    fn deserialised_maps_are_sanitised() -> TestResult {
        let json = r#"{"0.1":{"count":5,"total":123},"20":{"count":0,"total":0},"50":{"count":20000,"total":1}}"#;

        let totals: TotalsMap = serde_json::from_str(json)?;

        assert_eq!(totals.len(), 2);
        assert_eq!(totals.get(denomination(dec!(0.1))).map(|l| l.total), Some(dec!(0.50)));
        assert!(!totals.contains(denomination(dec!(20))));
        assert_eq!(totals.count(denomination(dec!(50))), MAX_EFFECTIVE_COUNT);

        Ok(())
    }

    #[test]
    fn serialises_with_string_keys_and_numeric_totals() -> TestResult {
        let totals: TotalsMap = [(denomination(dec!(0.5)), 2), (denomination(dec!(100)), 1)]
            .into_iter()
            .collect();

        let value = serde_json::to_value(&totals)?;

        assert_eq!(value["0.5"]["count"], 2);
        assert_eq!(value["0.5"]["total"].as_f64(), Some(1.0));
        assert_eq!(value["100"]["total"].as_f64(), Some(100.0));

        Ok(())
    }

    #[test]
    fn aggregates_serialise_camel_case() -> TestResult {
        let aggregates = Aggregates {
            coin_total: dec!(3),
            note_total: dec!(40),
            grand_total: dec!(43),
        };

        let value = serde_json::to_value(aggregates)?;

        assert_eq!(value["grandTotal"].as_f64(), Some(43.0));
        assert_eq!(value["coinTotal"].as_f64(), Some(3.0));

        Ok(())
    }
}
