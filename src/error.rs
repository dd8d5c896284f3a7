//! # Error Types
//!
//! Custom error types for Serial Capture using `thiserror`.
//!
//! "Nothing to read" and read timeouts are not errors here; sources report
//! them as [`crate::source::Receive::NoData`].

use thiserror::Error;
use tracing::warn;

/// Main error type for Serial Capture
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Invalid or incomplete configuration, reported before any I/O begins
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    /// A transport could not be opened (serial open, socket bind)
    #[error("Transport error on {endpoint}: {message}")]
    Transport { endpoint: String, message: String },

    /// Telemetry database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CaptureError {
    /// Build a [`CaptureError::Transport`] for the named endpoint
    pub fn transport(endpoint: impl Into<String>, message: impl ToString) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            message: message.to_string(),
        }
    }
}

/// Result type alias for Serial Capture
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Reports an error only when its message differs from the previous one.
///
/// Serial read failures and persistence failures tend to repeat on every
/// tick while the fault persists; only a change of message is worth
/// telling the operator about.
#[derive(Debug, Default)]
pub struct ReportOnce {
    last: Option<String>,
}

impl ReportOnce {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log `message` under `context` unless it repeats the previous report
    ///
    /// Returns `true` if the message was logged.
    pub fn report(&mut self, context: &str, message: &str) -> bool {
        if self.last.as_deref() == Some(message) {
            return false;
        }
        warn!("{}: {}", context, message);
        self.last = Some(message.to_string());
        true
    }

    /// The message most recently reported, until cleared
    pub fn last_reported(&self) -> Option<&str> {
        self.last.as_deref()
    }

    /// Forget the last message, so the next failure is reported again
    pub fn clear(&mut self) {
        self.last = None;
    }
}
