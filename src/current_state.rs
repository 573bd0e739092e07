//! Current State
//!
//! The unsaved totals, written on every change so a session can pick up where it
//! left off. An empty map is never written; a reset removes the stored state.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    storage::{CURRENT_STATE_KEY, StorageOutcome, StorageProvider, read_json, write_json},
    totals::TotalsMap,
};

/// The stored form of an in-progress session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCurrentState {
    /// The live totals map.
    pub totals: TotalsMap,

    /// When it was written.
    pub timestamp: Timestamp,
}

/// Reads and writes [`PersistedCurrentState`].
#[derive(Debug, Clone)]
pub struct CurrentStateStore<S> {
    storage: S,
}

impl<S: StorageProvider> CurrentStateStore<S> {
    /// A store over `storage`.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Persists `totals` stamped with the current time. Returns whether a write was
    /// attempted; empty maps are skipped.
    pub fn save(&self, totals: &TotalsMap) -> StorageOutcome<bool> {
        self.save_at(totals, Timestamp::now())
    }

    /// Persists `totals` stamped with `now`.
    #[tracing::instrument(name = "current_state.save", skip(self, totals), fields(lines = totals.len()))]
    pub fn save_at(&self, totals: &TotalsMap, now: Timestamp) -> StorageOutcome<bool> {
        if totals.is_empty() {
            debug!("nothing entered; skipping write");

            return StorageOutcome::ok(false);
        }

        let state = PersistedCurrentState {
            totals: totals.clone(),
            timestamp: now,
        };

        let written = write_json(&self.storage, CURRENT_STATE_KEY, &state);

        if let Err(error) = &written {
            warn!(%error, "failed to persist current state");
        }

        StorageOutcome::new(true, written)
    }

    /// The stored totals, or `None` when nothing is stored.
    ///
    /// Corrupt data reads as `None`, with the error carried in the outcome.
    #[tracing::instrument(name = "current_state.load", skip(self))]
    pub fn load(&self) -> StorageOutcome<Option<TotalsMap>> {
        match read_json::<PersistedCurrentState, _>(&self.storage, CURRENT_STATE_KEY) {
            Ok(state) => StorageOutcome::ok(state.map(|state| state.totals)),
            Err(error) => {
                warn!(%error, "stored current state is unreadable; starting empty");

                StorageOutcome::new(None, Err(error))
            }
        }
    }

    /// Removes the stored state.
    #[tracing::instrument(name = "current_state.clear", skip(self))]
    pub fn clear(&self) -> StorageOutcome<()> {
        let removed = self.storage.remove(CURRENT_STATE_KEY);

        if let Err(error) = &removed {
            warn!(%error, "failed to remove current state");
        }

        StorageOutcome::new((), removed)
    }

    /// Best-effort write at session end. Removes the stored state when `totals` is
    /// empty so a cleared session does not resume with stale counts.
    pub fn flush(&self, totals: &TotalsMap) -> StorageOutcome<()> {
        if totals.is_empty() {
            return self.clear();
        }

        let (_, error) = self.save(totals).into_parts();

        StorageOutcome::new((), error.map_or(Ok(()), Err))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use testresult::TestResult;

    use super::*;
    use crate::{
        denominations::Denomination,
        storage::{MemoryStorage, MockStorageProvider, StorageError},
    };

    fn totals() -> Result<TotalsMap, crate::denominations::DenominationError> {
        Ok([(Denomination::new(dec!(0.5))?, 4)].into_iter().collect())
    }

    #[test]
    fn round_trips_totals() -> TestResult {
        let storage = MemoryStorage::new();
        let store = CurrentStateStore::new(storage.clone());

        assert!(store.save(&totals()?).into_value());
        assert_eq!(store.load().into_value(), Some(totals()?));

        Ok(())
    }

    #[test]
    fn empty_totals_are_not_written() {
        let storage = MemoryStorage::new();
        let store = CurrentStateStore::new(storage.clone());

        assert!(!store.save(&TotalsMap::new()).into_value());
        assert_eq!(storage.write_count(), 0);
        assert_eq!(store.load().into_value(), None);
    }

    #[test]
    fn stored_layout_has_totals_and_iso_timestamp() -> TestResult {
        let storage = MemoryStorage::new();
        let store = CurrentStateStore::new(storage.clone());
        let now: Timestamp = "2024-03-05T14:07:09Z".parse()?;

        assert!(store.save_at(&totals()?, now).is_durable());

        let stored = storage
            .get(CURRENT_STATE_KEY)?
            .ok_or("state should be stored")?;
        let json: serde_json::Value = serde_json::from_str(&stored)?;

        assert_eq!(json["timestamp"], "2024-03-05T14:07:09Z");
        assert_eq!(json["totals"]["0.5"]["count"], 4);
        assert_eq!(json["totals"]["0.5"]["total"].as_f64(), Some(2.0));

        Ok(())
    }

    #[test]
    fn corrupt_state_loads_as_absent() -> TestResult {
        let storage = MemoryStorage::new();
        storage.set(CURRENT_STATE_KEY, "not json")?;

        let outcome = CurrentStateStore::new(storage).load();

        assert!(!outcome.is_durable());
        assert_eq!(outcome.into_value(), None);

        Ok(())
    }

    #[test]
    fn flush_of_empty_totals_clears() -> TestResult {
        let storage = MemoryStorage::new();
        let store = CurrentStateStore::new(storage.clone());

        assert!(store.save(&totals()?).is_durable());
        assert!(storage.contains(CURRENT_STATE_KEY));

        assert!(store.flush(&TotalsMap::new()).is_durable());
        assert!(!storage.contains(CURRENT_STATE_KEY));

        Ok(())
    }

    #[test]
    fn write_failure_is_reported_not_raised() -> TestResult {
        let mut mock = MockStorageProvider::new();
        mock.expect_set()
            .times(1)
            .returning(|key, _| Err(StorageError::InvalidKey(key.to_string())));

        let outcome = CurrentStateStore::new(mock).save(&totals()?);

        assert!(*outcome.value());
        assert!(matches!(outcome.error(), Some(StorageError::InvalidKey(_))));

        Ok(())
    }
}
