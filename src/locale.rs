//! Locales
//!
//! The counter ships in English, Hebrew and Russian. The locale only affects how
//! history dates are written; amounts and keys are locale independent.

use std::{fmt, str::FromStr};

use jiff::{Timestamp, tz::TimeZone};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unrecognised locale tag.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown locale {0:?}; expected one of en, he, ru")]
pub struct UnknownLocale(pub String);

/// Display language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    /// English (`en-US` date style).
    En,

    /// Hebrew (`he-IL` date style).
    #[default]
    He,

    /// Russian (`ru-RU` date style).
    Ru,
}

impl Locale {
    /// Every supported locale.
    pub const ALL: [Locale; 3] = [Locale::En, Locale::He, Locale::Ru];

    /// The full language tag whose date conventions this locale follows.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Locale::En => "en-US",
            Locale::He => "he-IL",
            Locale::Ru => "ru-RU",
        }
    }

    /// The `strftime` pattern for a date and time in this locale.
    #[must_use]
    pub fn date_pattern(self) -> &'static str {
        match self {
            Locale::En => "%-m/%-d/%Y, %-I:%M:%S %p",
            Locale::He => "%-d.%-m.%Y, %H:%M:%S",
            Locale::Ru => "%d.%m.%Y, %H:%M:%S",
        }
    }

    /// Formats `timestamp` as a local date and time in `time_zone`.
    #[must_use]
    pub fn format_timestamp(self, timestamp: Timestamp, time_zone: &TimeZone) -> String {
        timestamp
            .to_zoned(time_zone.clone())
            .strftime(self.date_pattern())
            .to_string()
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Locale::En => "en",
            Locale::He => "he",
            Locale::Ru => "ru",
        })
    }
}

impl FromStr for Locale {
    type Err = UnknownLocale;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let language = s.split(['-', '_']).next().unwrap_or_default();

        match language.to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "he" | "iw" => Ok(Locale::He),
            "ru" => Ok(Locale::Ru),
            _ => Err(UnknownLocale(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn afternoon() -> Result<Timestamp, jiff::Error> {
        "2024-03-05T14:07:09Z".parse()
    }

    #[test]
    fn english_uses_month_first_twelve_hour_clock() -> TestResult {
        let formatted = Locale::En.format_timestamp(afternoon()?, &TimeZone::UTC);

        assert_eq!(formatted, "3/5/2024, 2:07:09 PM");

        Ok(())
    }

    #[test]
    fn hebrew_uses_day_first_unpadded() -> TestResult {
        let formatted = Locale::He.format_timestamp(afternoon()?, &TimeZone::UTC);

        assert_eq!(formatted, "5.3.2024, 14:07:09");

        Ok(())
    }

    #[test]
    fn russian_pads_day_and_month() -> TestResult {
        let formatted = Locale::Ru.format_timestamp(afternoon()?, &TimeZone::UTC);

        assert_eq!(formatted, "05.03.2024, 14:07:09");

        Ok(())
    }

    #[test]
    fn time_zone_shifts_local_time() -> TestResult {
        let zone = TimeZone::fixed(jiff::tz::offset(2));

        let formatted = Locale::Ru.format_timestamp(afternoon()?, &zone);

        assert_eq!(formatted, "05.03.2024, 16:07:09");

        Ok(())
    }

    #[test]
    fn parses_language_tags() -> TestResult {
        assert_eq!("en".parse::<Locale>()?, Locale::En);
        assert_eq!("he-IL".parse::<Locale>()?, Locale::He);
        assert_eq!("RU_ru".parse::<Locale>()?, Locale::Ru);
        assert!("fr".parse::<Locale>().is_err());

        Ok(())
    }

    #[test]
    fn default_is_hebrew() {
        assert_eq!(Locale::default(), Locale::He);
        assert_eq!(Locale::default().tag(), "he-IL");
    }
}
