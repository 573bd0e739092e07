//! Cash Counter
//!
//! Cash Counter is the engine behind a denomination-counting calculator: counts and
//! multipliers entered per coin and note are aggregated into coin, note and grand
//! totals, saved to a history log, and persisted between sessions.

pub mod config;
pub mod current_state;
pub mod denominations;
pub mod entry;
pub mod history;
pub mod input;
pub mod locale;
pub mod prelude;
pub mod receipt;
pub mod reset;
pub mod session;
pub mod storage;
pub mod totals;
pub mod utils;
