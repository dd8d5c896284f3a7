//! Log file path templates.
//!
//! A template such as `logs/console_[DATETIME]` becomes
//! `logs/console_240601.log` with daily wrapping, or
//! `logs/console_2406011230.log` (session start, to the minute) without.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDate};

use crate::config::DATETIME_PLACEHOLDER;
use crate::error::{CaptureError, Result};

/// Date format substituted when wrapping daily
pub const FILE_DATE_FORMAT: &str = "%y%m%d";

/// Date-time format substituted otherwise
pub const FILE_DATE_TIME_FORMAT: &str = "%y%m%d%H%M";

/// Extension of the text log
pub const LOG_EXTENSION: &str = "log";

/// Extension of the telemetry database
pub const DATABASE_EXTENSION: &str = "db";

/// Path template plus rotation policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFileSpec {
    template: String,
    wrap_daily: bool,
}

impl LogFileSpec {
    /// Create a spec, rejecting daily wrapping without the placeholder
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Config`] if `wrap_daily` is set and `template`
    /// lacks [`DATETIME_PLACEHOLDER`].
    pub fn new(template: &str, wrap_daily: bool) -> Result<Self> {
        if wrap_daily && !template.contains(DATETIME_PLACEHOLDER) {
            return Err(CaptureError::Config(format!(
                "Wrap daily option requires {} in the file path",
                DATETIME_PLACEHOLDER
            )));
        }
        Ok(Self {
            template: template.to_string(),
            wrap_daily,
        })
    }

    pub fn wrap_daily(&self) -> bool {
        self.wrap_daily
    }

    /// The calendar day a file resolved at `now` belongs to
    pub fn day(now: DateTime<Local>) -> NaiveDate {
        now.date_naive()
    }

    /// Log file path for `now`
    pub fn log_path(&self, now: DateTime<Local>) -> PathBuf {
        self.resolve(now, LOG_EXTENSION)
    }

    /// Telemetry database path for `now`
    pub fn database_path(&self, now: DateTime<Local>) -> PathBuf {
        self.resolve(now, DATABASE_EXTENSION)
    }

    fn resolve(&self, now: DateTime<Local>, extension: &str) -> PathBuf {
        let format = if self.wrap_daily {
            FILE_DATE_FORMAT
        } else {
            FILE_DATE_TIME_FORMAT
        };
        let stem = self
            .template
            .replace(DATETIME_PLACEHOLDER, &now.format(format).to_string());
        PathBuf::from(format!("{}.{}", stem, extension))
    }
}
