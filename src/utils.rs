//! Utils

use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use thiserror::Error;

use crate::{
    denominations::{Denomination, DenominationError},
    input::{MAX_COUNT, MAX_MULTIPLIER, ParseCountError, parse_count},
};

/// Arguments for the counting demo
#[derive(Debug, Parser)]
pub struct DemoArgs {
    /// YAML config file
    #[clap(short, long)]
    pub config: Option<PathBuf>,

    /// Storage directory, overriding the config file
    #[clap(short, long)]
    pub storage_dir: Option<PathBuf>,

    /// Counts to enter, as `VALUE=COUNT` or `VALUE=COUNTxMULTIPLIER` (e.g. `20=3x5`)
    #[clap(long = "count", value_name = "VALUE=N[xM]")]
    pub counts: Vec<CountArg>,

    /// Save the result to history
    #[clap(long)]
    pub save: bool,

    /// Reset the counter before entering counts
    #[clap(long)]
    pub reset: bool,

    /// Print the saved history
    #[clap(long)]
    pub history: bool,
}

/// Invalid `--count` argument.
#[derive(Debug, Error)]
pub enum CountArgError {
    /// Missing `=` separator
    #[error("expected VALUE=COUNT, got {0:?}")]
    MissingSeparator(String),

    /// Invalid denomination
    #[error(transparent)]
    Denomination(#[from] DenominationError),

    /// Invalid count or multiplier
    #[error("invalid count: {0}")]
    Count(#[from] ParseCountError),

    /// Count or multiplier above the field maximum
    #[error("{value} exceeds the maximum of {max}")]
    TooLarge {
        /// Parsed value
        value: u32,

        /// Field maximum
        max: u32,
    },
}

/// A count entered on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountArg {
    /// Face value
    pub denomination: Denomination,

    /// Count field
    pub count: u32,

    /// Multiplier field
    pub multiplier: u32,
}

impl FromStr for CountArg {
    type Err = CountArgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (value, quantity) = s
            .split_once('=')
            .ok_or_else(|| CountArgError::MissingSeparator(s.to_string()))?;

        let (count, multiplier) = match quantity.split_once(['x', 'X', '*']) {
            Some((count, multiplier)) => (count, Some(multiplier)),
            None => (quantity, None),
        };

        Ok(Self {
            denomination: value.parse()?,
            count: bounded(count, MAX_COUNT)?,
            multiplier: multiplier.map_or(Ok(1), |multiplier| bounded(multiplier, MAX_MULTIPLIER))?,
        })
    }
}

fn bounded(input: &str, max: u32) -> Result<u32, CountArgError> {
    let value = parse_count(input.trim())?;

    if value > max {
        return Err(CountArgError::TooLarge { value, max });
    }

    Ok(value)
}
