//! Storage
//!
//! Key-value persistence for the history log and the in-progress session. Stores are
//! handed a [`StorageProvider`] instead of reaching for a global, so tests can use
//! [`MemoryStorage`] and applications can use [`FileStorage`].
//!
//! Writes are best effort. A failed write never rolls back the in-memory change that
//! caused it; the failure travels alongside the result in a [`StorageOutcome`].

use std::{
    cell::RefCell,
    fs, io,
    path::{Path, PathBuf},
    rc::Rc,
};

use rustc_hash::FxHashMap;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

/// Key holding the JSON array of saved history entries, newest first.
pub const HISTORY_KEY: &str = "cash-counter-history";

/// Key holding the JSON object with the unsaved totals and a timestamp.
pub const CURRENT_STATE_KEY: &str = "cash-counter-current-state";

/// Storage failures. None of them are fatal to the counter.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed.
    #[error("storage I/O failed for {key}: {source}")]
    Io {
        /// Key being accessed
        key: String,

        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The write would exceed the storage quota.
    #[error("storage quota exceeded writing {key}: {size} bytes over a limit of {limit}")]
    QuotaExceeded {
        /// Key being written
        key: String,

        /// Total bytes the write would have required
        size: usize,

        /// Configured quota in bytes
        limit: usize,
    },

    /// Stored JSON could not be parsed, or a value could not be serialised.
    #[error("invalid stored JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The key cannot be mapped onto the backing store.
    #[error("invalid storage key: {0:?}")]
    InvalidKey(String),
}

/// String key-value store.
#[cfg_attr(test, mockall::automock)]
pub trait StorageProvider {
    /// Reads the value under `key`, or `None` if nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the value cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the backing store cannot be modified.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

impl<S: StorageProvider + ?Sized> StorageProvider for Rc<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

impl<S: StorageProvider + ?Sized> StorageProvider for &S {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Reads and parses the JSON value under `key`.
pub(crate) fn read_json<T, S>(storage: &S, key: &str) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    S: StorageProvider + ?Sized,
{
    storage
        .get(key)?
        .map(|json| serde_json::from_str(&json))
        .transpose()
        .map_err(StorageError::from)
}

/// Serialises `value` as JSON and stores it under `key`.
pub(crate) fn write_json<T, S>(storage: &S, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
    S: StorageProvider + ?Sized,
{
    let json = serde_json::to_string(value)?;

    storage.set(key, &json)
}

/// A value produced in memory plus the storage error met along the way, if any.
#[derive(Debug)]
#[must_use]
pub struct StorageOutcome<T> {
    value: T,
    error: Option<StorageError>,
}

impl<T> StorageOutcome<T> {
    /// Pairs `value` with the result of the storage access that accompanied it.
    pub fn new(value: T, storage: Result<(), StorageError>) -> Self {
        Self {
            value,
            error: storage.err(),
        }
    }

    /// A value that needed no storage access, or whose access succeeded.
    pub fn ok(value: T) -> Self {
        Self { value, error: None }
    }

    /// The in-memory result.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// The in-memory result, discarding any storage error.
    pub fn into_value(self) -> T {
        self.value
    }

    /// The storage error, if the access failed.
    pub fn error(&self) -> Option<&StorageError> {
        self.error.as_ref()
    }

    /// The storage error, discarding the value.
    pub fn into_error(self) -> Option<StorageError> {
        self.error
    }

    /// Whether storage is in step with the in-memory result.
    pub fn is_durable(&self) -> bool {
        self.error.is_none()
    }

    /// Splits into the value and the optional error.
    pub fn into_parts(self) -> (T, Option<StorageError>) {
        (self.value, self.error)
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: FxHashMap<String, String>,
    quota: Option<usize>,
    writes: usize,
}

/// In-memory storage. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryStorage {
    /// Empty storage without a quota.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty storage that refuses writes once stored values would exceed `limit` bytes.
    #[must_use]
    pub fn with_quota(limit: usize) -> Self {
        let storage = Self::new();
        storage.set_quota(Some(limit));

        storage
    }

    /// Changes the quota. `None` removes it.
    pub fn set_quota(&self, limit: Option<usize>) {
        self.state.borrow_mut().quota = limit;
    }

    /// Number of successful `set` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state.borrow().writes
    }

    /// Whether anything is stored under `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.state.borrow().entries.contains_key(key)
    }
}

impl StorageProvider for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.state.borrow().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut state = self.state.borrow_mut();

        if let Some(limit) = state.quota {
            let others: usize = state
                .entries
                .iter()
                .filter(|(stored, _)| stored.as_str() != key)
                .map(|(_, stored)| stored.len())
                .sum();
            let size = others + value.len();

            if size > limit {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                    size,
                    limit,
                });
            }
        }

        state.entries.insert(key.to_string(), value.to_string());
        state.writes += 1;

        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.state.borrow_mut().entries.remove(key);

        Ok(())
    }
}

/// Directory-backed storage holding one `<key>.json` file per key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Storage rooted at an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();

        fs::create_dir_all(&root).map_err(|source| StorageError::Io {
            key: root.display().to_string(),
            source,
        })?;

        Ok(Self { root })
    }

    /// The storage directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(format!("{key}.json")))
    }
}

impl StorageProvider for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.path_for(key)?;

        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let staging = path.with_extension("json.tmp");

        fs::write(&staging, value)
            .and_then(|()| fs::rename(&staging, &path))
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.path_for(key)?;

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn memory_storage_round_trips_and_shares_between_clones() -> TestResult {
        let storage = MemoryStorage::new();
        let clone = storage.clone();

        storage.set("a", "1")?;

        assert_eq!(clone.get("a")?, Some("1".to_string()));
        assert_eq!(clone.write_count(), 1);

        clone.remove("a")?;
        assert_eq!(storage.get("a")?, None);

        storage.remove("missing")?;

        Ok(())
    }

    #[test]
    fn memory_quota_rejects_oversized_writes_and_keeps_old_value() -> TestResult {
        let storage = MemoryStorage::with_quota(8);

        storage.set("k", "1234")?;

        let result = storage.set("k", "123456789");
        assert!(matches!(
            result,
            Err(StorageError::QuotaExceeded { size: 9, limit: 8, .. })
        ));
        assert_eq!(storage.get("k")?, Some("1234".to_string()));

        // Replacing a key does not count the old value against the quota.
        storage.set("k", "12345678")?;

        Ok(())
    }

    #[test]
    fn file_storage_round_trips() -> TestResult {
        let dir = tempfile::tempdir()?;
        let storage = FileStorage::new(dir.path());

        assert_eq!(storage.get(HISTORY_KEY)?, None);

        storage.set(HISTORY_KEY, "[]")?;
        assert_eq!(storage.get(HISTORY_KEY)?, Some("[]".to_string()));
        assert!(dir.path().join("cash-counter-history.json").exists());

        storage.remove(HISTORY_KEY)?;
        storage.remove(HISTORY_KEY)?;
        assert_eq!(storage.get(HISTORY_KEY)?, None);

        Ok(())
    }

    #[test]
    fn file_storage_refuses_path_like_keys() {
        let storage = FileStorage::new("unused");

        assert!(matches!(
            storage.get("../escape"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(storage.set("", "x"), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn file_storage_create_makes_directory() -> TestResult {
        let dir = tempfile::tempdir()?;
        let nested = dir.path().join("a").join("b");

        let storage = FileStorage::create(&nested)?;

        assert!(nested.is_dir());
        assert_eq!(storage.root(), nested.as_path());

        Ok(())
    }

    #[test]
    fn json_helpers_surface_parse_errors() -> TestResult {
        let storage = MemoryStorage::new();
        storage.set("bad", "{not json")?;

        let result: Result<Option<Vec<u32>>, _> = read_json(&storage, "bad");
        assert!(matches!(result, Err(StorageError::Json(_))));

        write_json(&storage, "good", &[1_u32, 2])?;
        let parsed: Option<Vec<u32>> = read_json(&storage, "good")?;
        assert_eq!(parsed, Some(vec![1, 2]));

        Ok(())
    }

    #[test]
    fn rc_wrapped_mock_forwards_calls() -> TestResult {
        let mut mock = MockStorageProvider::new();
        mock.expect_get()
            .times(1)
            .returning(|_| Ok(Some("{}".to_string())));

        let storage = Rc::new(mock);

        assert_eq!(storage.get(CURRENT_STATE_KEY)?, Some("{}".to_string()));

        Ok(())
    }

    #[test]
    fn outcome_keeps_value_when_write_fails() {
        let outcome = StorageOutcome::new(
            7,
            Err(StorageError::InvalidKey("x".to_string())),
        );

        assert!(!outcome.is_durable());
        assert_eq!(*outcome.value(), 7);

        let (value, error) = outcome.into_parts();
        assert_eq!(value, 7);
        assert!(matches!(error, Some(StorageError::InvalidKey(_))));
    }
}
