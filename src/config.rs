//! Import configuration.
//!
//! Defaults < JSON config file < `ACTIVITY_IMPORT_TZ` environment variable.
//! The CLI applies its own flags on top.

use crate::error::{ImportError, Result};
use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable overriding the reference time zone
pub const TIME_ZONE_ENV: &str = "ACTIVITY_IMPORT_TZ";

const DEFAULT_TIME_ZONE: &str = "Europe/Berlin";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportConfig {
    /// IANA time zone the documents' local dates and times refer to.
    pub time_zone: String,

    /// Activities dated before this day are rejected.
    pub earliest_date: NaiveDate,

    /// How many days after today an activity may be dated (1 = tomorrow).
    pub future_tolerance_days: i64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            time_zone: DEFAULT_TIME_ZONE.to_string(),
            earliest_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap_or_default(),
            future_tolerance_days: 1,
        }
    }
}

impl ImportConfig {
    /// Load from a JSON file; missing keys keep their defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, optional config file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Ok(zone) = std::env::var(TIME_ZONE_ENV) {
            config = config.with_time_zone(&zone)?;
        }
        Ok(config)
    }

    pub fn with_time_zone(mut self, zone: &str) -> Result<Self> {
        zone.parse::<Tz>()
            .map_err(|_| ImportError::TimeZone(zone.to_string()))?;
        self.time_zone = zone.to_string();
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        self.resolve_zone()?;
        if self.future_tolerance_days < 0 {
            return Err(ImportError::Config(format!(
                "futureToleranceDays must not be negative, got {}",
                self.future_tolerance_days
            )));
        }
        Ok(())
    }

    pub fn resolve_zone(&self) -> Result<Tz> {
        self.time_zone
            .parse::<Tz>()
            .map_err(|_| ImportError::TimeZone(self.time_zone.clone()))
    }

    /// Reference zone; an unparseable name falls back to Europe/Berlin
    pub fn zone(&self) -> Tz {
        self.resolve_zone().unwrap_or_else(|e| {
            log::warn!("{}, falling back to {}", e, DEFAULT_TIME_ZONE);
            chrono_tz::Europe::Berlin
        })
    }
}
