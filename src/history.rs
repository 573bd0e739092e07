//! History
//!
//! Saved calculations, newest first. The full list is rewritten on every change, as
//! a single JSON array under [`HISTORY_KEY`].

use jiff::{Timestamp, tz::TimeZone};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{Span, debug, info, warn};

use crate::{
    locale::Locale,
    storage::{HISTORY_KEY, StorageError, StorageOutcome, StorageProvider, read_json, write_json},
    totals::{Aggregates, TotalsMap},
};

/// History failures that are not storage related.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HistoryError {
    /// The grand total is zero, so there is nothing to save.
    #[error("nothing to save: the grand total is zero")]
    NothingToSave,

    /// No entry has the given id.
    #[error("no history entry with id {0:?}")]
    NotFound(String),
}

/// One saved calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Save instant in Unix milliseconds, as a decimal string.
    pub id: String,

    /// Save instant formatted for the locale active at the time.
    pub date: String,

    /// Snapshot of the totals map.
    pub totals: TotalsMap,

    /// Grand total at save time.
    #[serde(default, with = "rust_decimal::serde::float")]
    pub grand_total: Decimal,

    /// Coin subtotal at save time.
    #[serde(default, with = "rust_decimal::serde::float")]
    pub coin_total: Decimal,

    /// Note subtotal at save time.
    #[serde(default, with = "rust_decimal::serde::float")]
    pub note_total: Decimal,
}

impl HistoryEntry {
    /// The entry's totals as [`Aggregates`].
    #[must_use]
    pub fn aggregates(&self) -> Aggregates {
        Aggregates {
            coin_total: self.coin_total,
            note_total: self.note_total,
            grand_total: self.grand_total,
        }
    }

    fn sync_aggregates(&mut self) {
        let aggregates = self.totals.aggregates();

        self.coin_total = aggregates.coin_total;
        self.note_total = aggregates.note_total;
        self.grand_total = aggregates.grand_total;
    }

    fn numeric_id(&self) -> Option<i64> {
        self.id.parse().ok()
    }
}

/// The history log and the storage it is persisted to.
#[derive(Debug)]
pub struct HistoryStore<S> {
    storage: S,
    entries: Vec<HistoryEntry>,
    locale: Locale,
    time_zone: TimeZone,
    last_id: i64,
}

impl<S: StorageProvider> HistoryStore<S> {
    /// Loads the log from `storage`.
    ///
    /// Unreadable or corrupt data yields an empty log; the error is returned in the
    /// outcome. Stored totals are sanitised and the subtotals recomputed from them.
    #[tracing::instrument(name = "history.load", skip(storage, time_zone), fields(entry_count = tracing::field::Empty))]
    pub fn load(storage: S, locale: Locale, time_zone: TimeZone) -> StorageOutcome<Self> {
        let (mut entries, error) = match read_json::<Vec<HistoryEntry>, _>(&storage, HISTORY_KEY) {
            Ok(entries) => (entries.unwrap_or_default(), None),
            Err(error) => {
                warn!(%error, "stored history is unreadable; starting empty");

                (Vec::new(), Some(error))
            }
        };

        for entry in &mut entries {
            entry.sync_aggregates();
        }

        let last_id = entries
            .iter()
            .filter_map(HistoryEntry::numeric_id)
            .max()
            .unwrap_or_default();

        Span::current().record("entry_count", entries.len());

        let store = Self {
            storage,
            entries,
            locale,
            time_zone,
            last_id,
        };

        StorageOutcome::new(store, error.map_or(Ok(()), Err))
    }

    /// Saves a snapshot of `totals` stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToSave`] if the grand total is not positive.
    pub fn save(
        &mut self,
        totals: &TotalsMap,
        aggregates: Aggregates,
    ) -> Result<StorageOutcome<HistoryEntry>, HistoryError> {
        self.save_at(totals, aggregates, Timestamp::now())
    }

    /// Saves a snapshot of `totals` stamped with `now`.
    ///
    /// The stored subtotals are recomputed from `totals`; `aggregates` as displayed
    /// by the caller is only compared against them.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NothingToSave`] if the grand total is not positive.
    #[tracing::instrument(
        name = "history.save",
        skip(self, totals, aggregates),
        fields(entry_id = tracing::field::Empty, grand_total = tracing::field::Empty)
    )]
    pub fn save_at(
        &mut self,
        totals: &TotalsMap,
        aggregates: Aggregates,
        now: Timestamp,
    ) -> Result<StorageOutcome<HistoryEntry>, HistoryError> {
        let computed = totals.aggregates();

        if computed != aggregates {
            debug!(?aggregates, ?computed, "displayed totals are stale; saving recomputed totals");
        }

        if !computed.has_amount() {
            return Err(HistoryError::NothingToSave);
        }

        let id = now.as_millisecond().max(self.last_id.saturating_add(1));
        self.last_id = id;

        let entry = HistoryEntry {
            id: id.to_string(),
            date: self.locale.format_timestamp(now, &self.time_zone),
            totals: totals.clone(),
            grand_total: computed.grand_total,
            coin_total: computed.coin_total,
            note_total: computed.note_total,
        };

        let span = Span::current();
        span.record("entry_id", tracing::field::display(&entry.id));
        span.record("grand_total", tracing::field::display(entry.grand_total));

        self.entries.insert(0, entry.clone());

        let written = self.persist();

        info!(entry_id = %entry.id, "saved calculation");

        Ok(StorageOutcome::new(entry, written))
    }

    /// Removes the entry with `id`. Returns whether one was removed; an unknown id
    /// writes nothing.
    #[tracing::instrument(name = "history.delete", skip(self))]
    pub fn delete(&mut self, id: &str) -> StorageOutcome<bool> {
        let Some(position) = self.entries.iter().position(|entry| entry.id == id) else {
            debug!("no entry to delete");

            return StorageOutcome::ok(false);
        };

        self.entries.remove(position);

        let written = self.persist();

        info!("deleted history entry");

        StorageOutcome::new(true, written)
    }

    /// Empties the log and removes it from storage.
    #[tracing::instrument(name = "history.clear_all", skip(self))]
    pub fn clear_all(&mut self) -> StorageOutcome<()> {
        self.entries.clear();

        let removed = self.storage.remove(HISTORY_KEY);

        if let Err(error) = &removed {
            warn!(%error, "failed to remove stored history");
        }

        info!("cleared history");

        StorageOutcome::new((), removed)
    }

    /// The snapshot to install as the live totals map. Does not modify the log.
    #[must_use]
    pub fn restore(&self, entry: &HistoryEntry) -> TotalsMap {
        entry.totals.clone()
    }

    /// [`restore`](Self::restore) for the entry with `id`.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError::NotFound`] if no entry has that id.
    pub fn restore_by_id(&self, id: &str) -> Result<TotalsMap, HistoryError> {
        self.get(id)
            .map(|entry| self.restore(entry))
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    /// Entries, newest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// The entry with `id`.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Number of saved entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Locale used to date new entries.
    #[must_use]
    pub fn locale(&self) -> Locale {
        self.locale
    }

    /// Changes the locale used to date new entries. Existing dates are kept.
    pub fn set_locale(&mut self, locale: Locale) {
        self.locale = locale;
    }

    fn persist(&self) -> Result<(), StorageError> {
        let written = write_json(&self.storage, HISTORY_KEY, &self.entries);

        if let Err(error) = &written {
            warn!(%error, "failed to persist history; keeping it in memory");
        }

        written
    }
}
