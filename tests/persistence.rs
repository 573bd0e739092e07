//! Integration tests for persistence across sessions.
//!
//! A session writes its unsaved totals on every change and its history on every
//! save, so reopening over the same storage resumes both. Storage failures and
//! corrupt data degrade to an empty state with a warning, never to an error.

use jiff::tz::TimeZone;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use testresult::TestResult;

use cash_counter::{
    config::CounterConfig,
    denominations::Denomination,
    entry::DenominationEntry,
    locale::Locale,
    session::{CounterSession, Notice},
    storage::{
        CURRENT_STATE_KEY, FileStorage, HISTORY_KEY, MemoryStorage, StorageError,
        StorageProvider,
    },
};

fn d(value: Decimal) -> Result<Denomination, cash_counter::denominations::DenominationError> {
    Denomination::new(value)
}

#[test]
fn unsaved_totals_resume_after_reopen() -> TestResult {
    let dir = tempfile::tempdir()?;

    {
        let storage = FileStorage::new(dir.path());
        let mut session = CounterSession::open(storage, Locale::En, TimeZone::UTC);

        session.type_count(d(dec!(0.5))?, "6")?;
        session.type_count(d(dec!(100))?, "3")?;
        session.suspend();
    }

    let session = CounterSession::open(FileStorage::new(dir.path()), Locale::En, TimeZone::UTC);

    assert_eq!(session.aggregates().grand_total, dec!(303.00));
    assert_eq!(
        session.entry(d(dec!(0.5))?).map(DenominationEntry::count_text),
        Some("6")
    );
    assert_eq!(
        session.entry(d(dec!(100))?).map(DenominationEntry::count_text),
        Some("3")
    );

    Ok(())
}

#[test]
fn history_survives_reopen_and_reset_does_not_touch_it() -> TestResult {
    let dir = tempfile::tempdir()?;
    let config = CounterConfig::from_yaml_str("locale: ru\ntime_zone: UTC\n")?;

    let saved = {
        let mut session = CounterSession::from_config(FileStorage::create(dir.path())?, &config)?;

        session.type_count(d(dec!(20))?, "2")?;
        let entry = session.save()?;
        session.reset();

        entry
    };

    let session = CounterSession::from_config(FileStorage::new(dir.path()), &config)?;

    assert!(session.totals().is_empty());
    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history().get(&saved.id), Some(&saved));

    Ok(())
}

#[test]
fn reset_leaves_no_current_state_file() -> TestResult {
    let dir = tempfile::tempdir()?;
    let storage = FileStorage::new(dir.path());
    let mut session = CounterSession::open(storage.clone(), Locale::He, TimeZone::UTC);

    session.type_count(d(dec!(1))?, "1")?;
    assert!(storage.get(CURRENT_STATE_KEY)?.is_some());

    session.reset();
    session.suspend();

    assert_eq!(storage.get(CURRENT_STATE_KEY)?, None);

    Ok(())
}

#[test]
fn corrupt_storage_opens_empty_with_warnings() -> TestResult {
    let storage = MemoryStorage::new();
    storage.set(HISTORY_KEY, "{\"not\": \"an array\"}")?;
    storage.set(CURRENT_STATE_KEY, "]]")?;

    let mut session = CounterSession::open(storage, Locale::En, TimeZone::UTC);

    assert!(session.totals().is_empty());
    assert!(session.history().is_empty());

    let notices = session.take_notices();
    assert_eq!(notices.len(), 2);
    assert!(
        notices
            .iter()
            .all(|notice| matches!(notice, Notice::StorageWarning(StorageError::Json(_))))
    );

    Ok(())
}

#[test]
fn oversized_stored_denomination_opens_empty() -> TestResult {
    let storage = MemoryStorage::new();
    storage.set(
        CURRENT_STATE_KEY,
        r#"{"totals":{"10000000000000000000000000":{"count":9999,"total":0}},"timestamp":"2024-03-05T14:07:09Z"}"#,
    )?;
    storage.set(
        HISTORY_KEY,
        r#"[{"id":"1","date":"","totals":{"10000000000000000000000000":{"count":9999,"total":0}}}]"#,
    )?;

    let mut session = CounterSession::open(storage, Locale::En, TimeZone::UTC);

    assert!(session.totals().is_empty());
    assert!(session.history().is_empty());
    assert_eq!(session.aggregates().grand_total, Decimal::ZERO);

    let notices = session.take_notices();
    assert_eq!(notices.len(), 2);
    assert!(
        notices
            .iter()
            .all(|notice| matches!(notice, Notice::StorageWarning(StorageError::Json(_))))
    );

    // Oversized raw input is rejected rather than totalled.
    assert!(!session.apply_change(1e25, 9999.0, 0.0).is_mutation());
    assert!(session.totals().is_empty());

    Ok(())
}

#[test]
fn reads_data_written_by_the_web_app() -> TestResult {
    let storage = MemoryStorage::new();

    storage.set(
        HISTORY_KEY,
        r#"[{"id":"1709647629000","date":"5.3.2024, 16:07:09","totals":{"1":{"count":3,"total":3},"20":{"count":2,"total":40}},"grandTotal":43,"coinTotal":3,"noteTotal":40}]"#,
    )?;
    storage.set(
        CURRENT_STATE_KEY,
        r#"{"totals":{"0.1":{"count":5,"total":0.5}},"timestamp":"2024-03-05T14:07:09.000Z"}"#,
    )?;

    let mut session = CounterSession::open(storage, Locale::He, TimeZone::UTC);

    assert!(session.take_notices().is_empty());
    assert_eq!(session.aggregates().coin_total, dec!(0.50));
    assert_eq!(
        session.entry(d(dec!(0.1))?).map(DenominationEntry::count_text),
        Some("5")
    );

    let entry = session
        .history()
        .get("1709647629000")
        .ok_or("history entry should load")?;
    assert_eq!(entry.grand_total, dec!(43));

    // The next id is strictly newer than anything already stored.
    let saved = session.save()?;
    assert!(saved.id.parse::<i64>()? > 1_709_647_629_000);

    Ok(())
}

#[test]
fn stored_json_uses_web_app_layout() -> TestResult {
    let storage = MemoryStorage::new();
    let mut session = CounterSession::open(storage.clone(), Locale::En, TimeZone::UTC);

    session.type_count(d(dec!(0.1))?, "3")?;
    session.save()?;

    let stored = storage.get(HISTORY_KEY)?.ok_or("history should be stored")?;
    let history: serde_json::Value = serde_json::from_str(&stored)?;
    let first = history.get(0).ok_or("one entry")?;

    assert!(first["id"].is_string());
    assert!(first["date"].is_string());
    assert_eq!(first["grandTotal"].as_f64(), Some(0.3));
    assert_eq!(first["coinTotal"].as_f64(), Some(0.3));
    assert_eq!(first["noteTotal"].as_f64(), Some(0.0));
    assert_eq!(first["totals"]["0.1"]["count"], 3);

    Ok(())
}

#[test]
fn quota_failure_keeps_state_in_memory() -> TestResult {
    let storage = MemoryStorage::with_quota(64);
    let mut session = CounterSession::open(storage.clone(), Locale::En, TimeZone::UTC);

    session.type_count(d(dec!(200))?, "9")?;
    let entry = session.save()?;

    assert_eq!(session.history().len(), 1);
    assert_eq!(session.history().get(&entry.id), Some(&entry));
    assert!(!storage.contains(HISTORY_KEY));

    let notices = session.take_notices();
    assert!(
        notices
            .iter()
            .any(|notice| matches!(notice, Notice::StorageWarning(StorageError::QuotaExceeded { .. })))
    );
    assert!(notices.iter().any(|notice| matches!(notice, Notice::Saved { .. })));

    // The counter keeps working after the failed write.
    session.type_count(d(dec!(200))?, "10")?;
    assert_eq!(session.aggregates().note_total, dec!(2000));

    Ok(())
}
