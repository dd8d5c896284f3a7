//! # Log File Module
//!
//! Turns the captured text stream into timestamped lines in a log file.
//!
//! This module handles:
//! - Resolving the log file path template against the current date
//! - Assembling timestamp-prefixed lines from an arbitrary byte trickle
//! - Appending completed lines durably, rotating daily when asked to

pub mod assembler;
pub mod sink;
pub mod template;

use chrono::{DateTime, Local};

use crate::error::Result;

pub use assembler::LineAssembler;
pub use sink::LogFileSink;
pub use template::LogFileSpec;

/// Timestamp format used for line prefixes and the session header
pub const LOG_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Separator written between a timestamp and the line content
pub const TIMESTAMP_SEPARATOR: &str = ": ";

/// Format `now` as a line prefix, separator included
pub fn timestamp_prefix(now: DateTime<Local>) -> String {
    format!("{}{}", now.format(LOG_TIMESTAMP_FORMAT), TIMESTAMP_SEPARATOR)
}

/// Destination for completed lines
pub trait LineSink {
    /// Persist one completed line (or trailing fragment at shutdown)
    ///
    /// Either the whole line is written or an error is returned; the caller
    /// keeps the line and retries later.
    fn write_line(&mut self, line: &[u8], now: DateTime<Local>) -> Result<()>;
}
