//! Configuration

use std::{
    fs,
    path::{Path, PathBuf},
};

use jiff::tz::TimeZone;
use rusty_money::{Findable, iso::Currency};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::locale::Locale;

/// Configuration Errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading the config file
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// Unknown currency code
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),

    /// Unknown IANA time zone
    #[error("Unknown time zone {name}: {source}")]
    TimeZone {
        /// Configured zone name
        name: String,

        /// Lookup failure
        #[source]
        source: jiff::Error,
    },
}

/// Counter settings, read from YAML.
///
/// ```yaml
/// locale: en
/// currency: ILS
/// storage_dir: ./counter-data
/// time_zone: Asia/Jerusalem
/// log_filter: cash_counter=debug
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CounterConfig {
    /// Language used for history dates.
    pub locale: Locale,

    /// ISO 4217 code used when formatting amounts.
    pub currency: String,

    /// Directory for file-backed storage.
    pub storage_dir: Option<PathBuf>,

    /// IANA zone for history dates; the system zone when unset.
    pub time_zone: Option<String>,

    /// Default `tracing` filter directive.
    pub log_filter: String,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            locale: Locale::default(),
            currency: "ILS".to_string(),
            storage_dir: None,
            time_zone: None,
            log_filter: "info".to_string(),
        }
    }
}

impl CounterConfig {
    /// Reads and validates a YAML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, is not valid YAML, or
    /// names an unknown currency or time zone.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;

        Self::from_yaml_str(&contents)
    }

    /// Parses and validates YAML config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the YAML is invalid or names an unknown currency
    /// or time zone.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_norway::from_str(yaml)?;

        config.currency()?;
        config.time_zone()?;

        Ok(config)
    }

    /// The configured currency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownCurrency`] if the code is not an ISO currency.
    pub fn currency(&self) -> Result<&'static Currency, ConfigError> {
        Currency::find(&self.currency)
            .ok_or_else(|| ConfigError::UnknownCurrency(self.currency.clone()))
    }

    /// The configured time zone, or the system zone.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TimeZone`] if the zone name is not in the tz database.
    pub fn time_zone(&self) -> Result<TimeZone, ConfigError> {
        match &self.time_zone {
            Some(name) => TimeZone::get(name).map_err(|source| ConfigError::TimeZone {
                name: name.clone(),
                source,
            }),
            None => Ok(TimeZone::system()),
        }
    }
}
