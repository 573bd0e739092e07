//! Denomination Entries
//!
//! One row of the counter. The entry is the only writer of its count and multiplier
//! while the user edits; the owner can hand it a starting count exactly once, at mount
//! or straight after a reset, and never in response to the entry's own emissions.

use rust_decimal::Decimal;

use crate::{
    denominations::{Denomination, Kind},
    input::{CountField, MultiplierField},
    reset::ResetToken,
};

/// A settled change reported by an entry to its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryChange {
    /// The entry's denomination.
    pub denomination: Denomination,

    /// `count × multiplier`.
    pub effective_count: u32,

    /// `denomination × effective_count`, rounded to 2 decimal places.
    pub line_total: Decimal,

    /// Reset token the entry held when it produced this change.
    pub token: ResetToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Reported {
    effective_count: u32,
    line_total: Decimal,
}

impl Reported {
    const ZERO: Self = Self {
        effective_count: 0,
        line_total: Decimal::ZERO,
    };
}

/// Input state for a single denomination.
#[derive(Debug, Clone)]
pub struct DenominationEntry {
    denomination: Denomination,
    count: CountField,
    multiplier: MultiplierField,
    token: ResetToken,
    accepts_seed: bool,
    reported: Reported,
}

impl DenominationEntry {
    /// Mounts an entry showing `initial_count` with a multiplier of 1.
    ///
    /// The initial count is treated as already known to the owner, so mounting
    /// emits nothing.
    #[must_use]
    pub fn mount(denomination: Denomination, initial_count: u32, token: ResetToken) -> Self {
        let mut entry = Self {
            denomination,
            count: CountField::new(),
            multiplier: MultiplierField::new(),
            token,
            accepts_seed: true,
            reported: Reported::ZERO,
        };

        entry.seed(initial_count);

        entry
    }

    /// Accepts a count supplied by the owner.
    ///
    /// Only honoured once per mount or reset, and only before the user has typed
    /// into the entry. Returns `true` if the seed was applied.
    pub fn seed(&mut self, initial_count: u32) -> bool {
        if !self.accepts_seed {
            return false;
        }

        self.accepts_seed = false;
        self.count = CountField::with_value(initial_count);
        self.multiplier = MultiplierField::new();
        self.reported = self.current();

        true
    }

    /// Shows `effective_count` as reported for this denomination by another input
    /// source, with a multiplier of 1. Emits nothing.
    pub fn mirror(&mut self, effective_count: u32) {
        self.accepts_seed = false;
        self.count = CountField::with_value(effective_count);
        self.multiplier = MultiplierField::new();
        self.reported = self.current();
    }

    /// Applies typed text to the count field.
    pub fn type_count(&mut self, raw: &str) -> Option<EntryChange> {
        self.accepts_seed = false;
        self.count.input(raw);

        self.settle()
    }

    /// Applies typed text to the multiplier field.
    pub fn type_multiplier(&mut self, raw: &str) -> Option<EntryChange> {
        self.accepts_seed = false;
        self.multiplier.input(raw);

        self.settle()
    }

    /// The count field lost focus.
    pub fn blur_count(&mut self) -> Option<EntryChange> {
        self.count.blur();

        self.settle()
    }

    /// The multiplier field lost focus.
    pub fn blur_multiplier(&mut self) -> Option<EntryChange> {
        self.multiplier.blur();

        self.settle()
    }

    /// Handles a reset broadcast.
    ///
    /// A token newer than the one held zeroes the entry unconditionally and emits
    /// `(denomination, 0, 0)`; older or equal tokens are ignored.
    pub fn observe_reset(&mut self, token: ResetToken) -> Option<EntryChange> {
        if token <= self.token {
            return None;
        }

        self.token = token;
        self.count.reset();
        self.multiplier.reset();
        self.reported = Reported::ZERO;
        self.accepts_seed = true;

        Some(self.change(Reported::ZERO))
    }

    /// The entry's denomination.
    #[must_use]
    pub fn denomination(&self) -> Denomination {
        self.denomination
    }

    /// Coin or note.
    #[must_use]
    pub fn kind(&self) -> Kind {
        self.denomination.kind()
    }

    /// Text shown in the count field.
    #[must_use]
    pub fn count_text(&self) -> &str {
        self.count.text()
    }

    /// Text shown in the multiplier field.
    #[must_use]
    pub fn multiplier_text(&self) -> &str {
        self.multiplier.text()
    }

    /// `count × multiplier`, with empty fields read as their defaults.
    #[must_use]
    pub fn effective_count(&self) -> u32 {
        self.count.value().saturating_mul(self.multiplier.value())
    }

    /// `denomination × effective_count`, rounded to 2 decimal places.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.denomination.line_total(self.effective_count())
    }

    /// The last reset token this entry observed.
    #[must_use]
    pub fn token(&self) -> ResetToken {
        self.token
    }

    fn current(&self) -> Reported {
        Reported {
            effective_count: self.effective_count(),
            line_total: self.line_total(),
        }
    }

    fn settle(&mut self) -> Option<EntryChange> {
        let current = self.current();

        if current == self.reported {
            return None;
        }

        self.reported = current;

        Some(self.change(current))
    }

    fn change(&self, reported: Reported) -> EntryChange {
        EntryChange {
            denomination: self.denomination,
            effective_count: reported.effective_count,
            line_total: reported.line_total,
            token: self.token,
        }
    }
}
