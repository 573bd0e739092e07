//! Counting Example
//!
//! Opens a counter session backed by a storage directory, enters the given counts and
//! prints the resulting receipt.
//!
//! Use `--count VALUE=N[xM]` (repeatable) to enter counts
//! Use `--reset` to clear the resumed session first
//! Use `--save` to save the result to history, `--history` to print it

use std::io;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cash_counter::{
    config::CounterConfig,
    receipt::{Receipt, write_history},
    session::CounterSession,
    storage::FileStorage,
    utils::DemoArgs,
};

/// Counting Example
#[expect(clippy::print_stdout, reason = "Example code")]
pub fn main() -> Result<()> {
    let args = DemoArgs::parse();

    let config = match &args.config {
        Some(path) => CounterConfig::from_file(path)?,
        None => CounterConfig::default(),
    };

    let filter =
        EnvFilter::try_from_default_env().or_else(|_err| EnvFilter::try_new(&config.log_filter))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let storage_dir = args
        .storage_dir
        .clone()
        .or_else(|| config.storage_dir.clone())
        .unwrap_or_else(|| "target/cash-counter".into());

    let storage = FileStorage::create(storage_dir)?;
    let mut session = CounterSession::from_config(storage, &config)?;

    if args.reset {
        session.reset();
    }

    for count in &args.counts {
        session.type_count(count.denomination, &count.count.to_string())?;
        session.type_multiplier(count.denomination, &count.multiplier.to_string())?;
    }

    let currency = config.currency()?;

    let stdout = io::stdout();
    let mut handle = stdout.lock();

    Receipt::new(session.totals(), currency).write_to(&mut handle)?;

    // A zero total is reported as a notice below rather than aborting.
    if args.save
        && let Err(error) = session.save()
    {
        tracing::debug!(%error, "calculation not saved");
    }

    if args.history {
        write_history(&mut handle, session.history().entries(), currency)?;
    }

    session.suspend();

    for notice in session.take_notices() {
        println!("{notice}");
    }

    Ok(())
}
