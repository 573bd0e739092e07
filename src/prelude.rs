//! Cash Counter prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    config::{ConfigError, CounterConfig},
    current_state::{CurrentStateStore, PersistedCurrentState},
    denominations::{COINS, Denomination, DenominationError, Kind, NOTES},
    entry::{DenominationEntry, EntryChange},
    history::{HistoryEntry, HistoryError, HistoryStore},
    input::{CountField, MultiplierField, ParseCountError, parse_count},
    locale::Locale,
    receipt::{Receipt, ReceiptError, write_history},
    reset::{ResetCoordinator, ResetPhase, ResetToken},
    session::{CounterSession, Notice, RowView, SessionError},
    storage::{FileStorage, MemoryStorage, StorageError, StorageOutcome, StorageProvider},
    totals::{Aggregates, ApplyOutcome, InvalidChange, LineState, TotalsAggregator, TotalsMap},
};
