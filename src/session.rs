//! Counter Session
//!
//! The owner of a counting session: one [`DenominationEntry`] per fixed denomination,
//! the [`TotalsAggregator`] they report to, the [`ResetCoordinator`] that re-zeroes
//! them, and the two stores that persist the result.
//!
//! Every operation takes `&mut self` and runs to completion, so no caller can observe
//! the totals and the entries out of step with each other.

use std::{fmt, mem};

use jiff::tz::TimeZone;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    config::{ConfigError, CounterConfig},
    current_state::CurrentStateStore,
    denominations::{Denomination, Kind},
    entry::{DenominationEntry, EntryChange},
    history::{HistoryEntry, HistoryError, HistoryStore},
    locale::Locale,
    reset::{ResetCoordinator, ResetToken},
    storage::{StorageError, StorageOutcome, StorageProvider},
    totals::{Aggregates, ApplyOutcome, TotalsAggregator, TotalsMap},
};

new_key_type! {
    /// Entry Key
    pub struct EntryKey;
}

/// Session failures.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The denomination is not one of the fixed coins or notes.
    #[error("no entry for denomination {0}")]
    UnknownDenomination(Denomination),

    /// A history operation could not proceed.
    #[error(transparent)]
    History(#[from] HistoryError),
}

/// A user-visible outcome, for the UI to show as a toast or status line.
#[derive(Debug)]
pub enum Notice {
    /// A calculation was saved to history.
    Saved {
        /// Id of the new entry
        id: String,
    },

    /// Save was requested with a zero grand total.
    NothingToSave,

    /// A saved calculation was loaded into the counter.
    Restored {
        /// Id of the restored entry
        id: String,
    },

    /// The counter was reset.
    Reset,

    /// A history entry was deleted.
    Deleted {
        /// Id of the deleted entry
        id: String,
    },

    /// The history was cleared.
    HistoryCleared,

    /// Storage could not be read or written; the in-memory state is unaffected.
    StorageWarning(StorageError),
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Saved { id } => write!(f, "saved calculation {id}"),
            Notice::NothingToSave => f.write_str("nothing to save"),
            Notice::Restored { id } => write!(f, "restored calculation {id}"),
            Notice::Reset => f.write_str("counter reset"),
            Notice::Deleted { id } => write!(f, "deleted calculation {id}"),
            Notice::HistoryCleared => f.write_str("history cleared"),
            Notice::StorageWarning(error) => write!(f, "storage warning: {error}"),
        }
    }
}

/// What the UI needs to draw one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowView<'a> {
    /// Face value
    pub denomination: Denomination,

    /// Coin or note
    pub kind: Kind,

    /// Count field text
    pub count_text: &'a str,

    /// Multiplier field text
    pub multiplier_text: &'a str,

    /// Line total, rounded to 2 decimal places
    pub line_total: Decimal,
}

impl<'a> From<&'a DenominationEntry> for RowView<'a> {
    fn from(entry: &'a DenominationEntry) -> Self {
        Self {
            denomination: entry.denomination(),
            kind: entry.kind(),
            count_text: entry.count_text(),
            multiplier_text: entry.multiplier_text(),
            line_total: entry.line_total(),
        }
    }
}

/// A counting session.
#[derive(Debug)]
pub struct CounterSession<S> {
    entries: SlotMap<EntryKey, DenominationEntry>,
    index: FxHashMap<Denomination, EntryKey>,
    aggregator: TotalsAggregator,
    coordinator: ResetCoordinator,
    history: HistoryStore<S>,
    current_state: CurrentStateStore<S>,
    notices: Vec<Notice>,
}

impl<S: StorageProvider + Clone> CounterSession<S> {
    /// Opens a session over `storage`, resuming any unsaved totals.
    ///
    /// Unreadable stored data is treated as absent and reported as a
    /// [`Notice::StorageWarning`].
    #[tracing::instrument(name = "session.open", skip(storage, time_zone))]
    pub fn open(storage: S, locale: Locale, time_zone: TimeZone) -> Self {
        let mut notices = Vec::new();

        let (history, error) = HistoryStore::load(storage.clone(), locale, time_zone).into_parts();
        notices.extend(error.map(Notice::StorageWarning));

        let current_state = CurrentStateStore::new(storage);

        let (resumed, error) = current_state.load().into_parts();
        notices.extend(error.map(Notice::StorageWarning));

        let totals = resumed.unwrap_or_default();

        let mut entries = SlotMap::with_key();
        let mut index = FxHashMap::default();

        for denomination in Denomination::all() {
            let initial_count = totals.count(denomination);
            let entry = DenominationEntry::mount(denomination, initial_count, ResetToken::initial());

            index.insert(denomination, entries.insert(entry));
        }

        info!(
            resumed_lines = totals.len(),
            history_entries = history.len(),
            "opened counter session"
        );

        Self {
            entries,
            index,
            aggregator: TotalsAggregator::with_totals(totals),
            coordinator: ResetCoordinator::new(),
            history,
            current_state,
            notices,
        }
    }

    /// Opens a session with the locale and time zone from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TimeZone`] if the configured zone is unknown.
    pub fn from_config(storage: S, config: &CounterConfig) -> Result<Self, ConfigError> {
        Ok(Self::open(storage, config.locale, config.time_zone()?))
    }

    /// Types into a denomination's count field.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownDenomination`] if no entry exists for it.
    pub fn type_count(
        &mut self,
        denomination: Denomination,
        raw: &str,
    ) -> Result<ApplyOutcome, SessionError> {
        let change = self.entry_mut(denomination)?.type_count(raw);

        Ok(self.settle(change))
    }

    /// Types into a denomination's multiplier field.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownDenomination`] if no entry exists for it.
    pub fn type_multiplier(
        &mut self,
        denomination: Denomination,
        raw: &str,
    ) -> Result<ApplyOutcome, SessionError> {
        let change = self.entry_mut(denomination)?.type_multiplier(raw);

        Ok(self.settle(change))
    }

    /// A denomination's count field lost focus.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownDenomination`] if no entry exists for it.
    pub fn blur_count(&mut self, denomination: Denomination) -> Result<ApplyOutcome, SessionError> {
        let change = self.entry_mut(denomination)?.blur_count();

        Ok(self.settle(change))
    }

    /// A denomination's multiplier field lost focus.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownDenomination`] if no entry exists for it.
    pub fn blur_multiplier(
        &mut self,
        denomination: Denomination,
    ) -> Result<ApplyOutcome, SessionError> {
        let change = self.entry_mut(denomination)?.blur_multiplier();

        Ok(self.settle(change))
    }

    /// Applies a change emitted by an entry.
    ///
    /// Changes produced under a reset token older than the current one are
    /// discarded as [`ApplyOutcome::Superseded`].
    pub fn apply_entry_change(&mut self, change: &EntryChange) -> ApplyOutcome {
        if !self.coordinator.accepts(change.token) {
            debug!(
                denomination = %change.denomination,
                token = %change.token,
                current = %self.coordinator.token(),
                "discarding change from before reset"
            );

            return ApplyOutcome::Superseded;
        }

        let outcome = self.aggregator.apply_entry(change);

        self.after_apply(outcome)
    }

    /// Applies a change reported in floating point by an external entry.
    ///
    /// The session's own entry for that denomination, if any, is updated to show
    /// the stored count.
    pub fn apply_change(&mut self, value: f64, effective_count: f64, line_total: f64) -> ApplyOutcome {
        if self.coordinator.is_resetting() {
            return ApplyOutcome::Superseded;
        }

        let outcome = self.aggregator.apply_change(value, effective_count, line_total);

        if outcome.is_mutation()
            && let Ok(denomination) = Denomination::try_from_f64(value)
            && let Some(key) = self.index.get(&denomination).copied()
            && let Some(entry) = self.entries.get_mut(key)
        {
            entry.mirror(self.aggregator.totals().count(denomination));
        }

        self.after_apply(outcome)
    }

    /// Clears the totals and the stored current state, then re-zeroes every entry.
    ///
    /// Returns `false` if a reset was already in flight.
    #[tracing::instrument(name = "session.reset", skip(self), fields(token = tracing::field::Empty))]
    pub fn reset(&mut self) -> bool {
        let Some(ticket) = self.coordinator.begin() else {
            debug!("reset already in flight");

            return false;
        };

        self.aggregator.clear();

        let cleared = self.current_state.clear();
        self.record(cleared);

        let token = self.coordinator.publish(ticket);
        tracing::Span::current().record("token", tracing::field::display(token));

        self.broadcast(token);
        self.coordinator.finish();

        self.notices.push(Notice::Reset);

        info!("reset counter");

        true
    }

    /// Saves the current totals to history.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::History`] with [`HistoryError::NothingToSave`] if the
    /// grand total is zero; a [`Notice::NothingToSave`] is queued as well.
    #[tracing::instrument(name = "session.save", skip(self))]
    pub fn save(&mut self) -> Result<HistoryEntry, SessionError> {
        let saved = self
            .history
            .save(self.aggregator.totals(), self.aggregator.aggregates());

        match saved {
            Ok(outcome) => {
                let entry = self.record(outcome);

                self.notices.push(Notice::Saved {
                    id: entry.id.clone(),
                });

                Ok(entry)
            }
            Err(error) => {
                if error == HistoryError::NothingToSave {
                    self.notices.push(Notice::NothingToSave);
                }

                Err(error.into())
            }
        }
    }

    /// Loads the history entry with `id` into the counter.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::History`] with [`HistoryError::NotFound`] if there is
    /// no such entry.
    #[tracing::instrument(name = "session.restore", skip(self))]
    pub fn restore(&mut self, id: &str) -> Result<(), SessionError> {
        let totals = self.history.restore_by_id(id)?;

        if self.install(totals) {
            self.notices.push(Notice::Restored { id: id.to_string() });

            info!("restored calculation");
        }

        Ok(())
    }

    /// Loads `entry` into the counter, whether or not it is still in history.
    ///
    /// Returns `false` if a reset was in flight and nothing was loaded.
    pub fn restore_entry(&mut self, entry: &HistoryEntry) -> bool {
        let totals = self.history.restore(entry);

        if !self.install(totals) {
            return false;
        }

        self.notices.push(Notice::Restored {
            id: entry.id.clone(),
        });

        true
    }

    /// Deletes a history entry. Returns whether one was removed.
    pub fn delete(&mut self, id: &str) -> bool {
        let outcome = self.history.delete(id);
        let deleted = self.record(outcome);

        if deleted {
            self.notices.push(Notice::Deleted { id: id.to_string() });
        }

        deleted
    }

    /// Deletes every history entry.
    pub fn clear_history(&mut self) {
        let outcome = self.history.clear_all();
        self.record(outcome);

        self.notices.push(Notice::HistoryCleared);
    }

    /// Flushes the current state at session end (app backgrounded or closed).
    pub fn suspend(&mut self) {
        let outcome = self.current_state.flush(self.aggregator.totals());

        self.record(outcome);
    }

    /// Changes the locale used to date new history entries.
    pub fn set_locale(&mut self, locale: Locale) {
        self.history.set_locale(locale);
    }

    /// One row per fixed denomination, coins first.
    pub fn rows(&self) -> impl Iterator<Item = RowView<'_>> {
        Denomination::all()
            .filter_map(move |denomination| self.entry(denomination).map(RowView::from))
    }

    /// The entry for `denomination`.
    #[must_use]
    pub fn entry(&self, denomination: Denomination) -> Option<&DenominationEntry> {
        self.index
            .get(&denomination)
            .and_then(|key| self.entries.get(*key))
    }

    /// Current coin, note and grand totals.
    #[must_use]
    pub fn aggregates(&self) -> Aggregates {
        self.aggregator.aggregates()
    }

    /// The live totals map.
    #[must_use]
    pub fn totals(&self) -> &TotalsMap {
        self.aggregator.totals()
    }

    /// The history log.
    #[must_use]
    pub fn history(&self) -> &HistoryStore<S> {
        &self.history
    }

    /// The current reset token.
    #[must_use]
    pub fn reset_token(&self) -> ResetToken {
        self.coordinator.token()
    }

    /// Drains queued notices, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        mem::take(&mut self.notices)
    }

    fn entry_mut(&mut self, denomination: Denomination) -> Result<&mut DenominationEntry, SessionError> {
        self.index
            .get(&denomination)
            .and_then(|key| self.entries.get_mut(*key))
            .ok_or(SessionError::UnknownDenomination(denomination))
    }

    fn settle(&mut self, change: Option<EntryChange>) -> ApplyOutcome {
        change.map_or(ApplyOutcome::Unchanged, |change| self.apply_entry_change(&change))
    }

    fn after_apply(&mut self, outcome: ApplyOutcome) -> ApplyOutcome {
        if outcome.is_mutation() {
            self.persist_current_state();
        }

        outcome
    }

    fn persist_current_state(&mut self) {
        let totals = self.aggregator.totals();

        if totals.is_empty() {
            let outcome = self.current_state.clear();
            self.record(outcome);
        } else {
            let outcome = self.current_state.save(totals);
            self.record(outcome);
        }
    }

    /// Sends `token` to every entry and applies the re-zeroing changes they emit.
    fn broadcast(&mut self, token: ResetToken) {
        let changes: SmallVec<[EntryChange; 10]> = self
            .entries
            .values_mut()
            .filter_map(|entry| entry.observe_reset(token))
            .collect();

        for change in &changes {
            self.apply_entry_change(change);
        }
    }

    /// Replaces the live totals with `totals` and seeds the entries from it.
    ///
    /// Returns `false` without touching anything if a reset is in flight.
    fn install(&mut self, totals: TotalsMap) -> bool {
        let Some(ticket) = self.coordinator.begin() else {
            debug!("reset in flight; ignoring restore");

            return false;
        };

        self.aggregator.clear();

        let token = self.coordinator.publish(ticket);
        self.broadcast(token);

        for entry in self.entries.values_mut() {
            entry.seed(totals.count(entry.denomination()));
        }

        self.aggregator.replace(totals);
        self.coordinator.finish();

        self.persist_current_state();

        true
    }

    fn record<T>(&mut self, outcome: StorageOutcome<T>) -> T {
        let (value, error) = outcome.into_parts();

        self.notices.extend(error.map(Notice::StorageWarning));

        value
    }
}
