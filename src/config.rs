//! # Configuration Module
//!
//! Handles loading and validating the capture configuration.
//!
//! Capture targets (log file, serial port, UDP ports) normally come from the
//! command line; tunables come from an optional TOML file. Both land in a
//! single [`Config`] which must pass [`Config::validate`] before any file or
//! socket is opened.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CaptureError, Result};

/// Placeholder in the log file path that is replaced by the current date
pub const DATETIME_PLACEHOLDER: &str = "[DATETIME]";

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub log: LogConfig,

    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub udp: UdpConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Log file configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LogConfig {
    /// Path template, may contain [`DATETIME_PLACEHOLDER`]
    #[serde(default)]
    pub file_spec: String,

    /// Start a new log file every local calendar day
    #[serde(default)]
    pub wrap_daily: bool,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default)]
    pub port: Option<String>,

    #[serde(default)]
    pub baud_rate: Option<u32>,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// UDP listener configuration
#[derive(Debug, Deserialize, Clone)]
pub struct UdpConfig {
    #[serde(default)]
    pub log_port: Option<u16>,

    #[serde(default)]
    pub telemetry_ports: Vec<u16>,

    #[serde(default = "default_max_datagrams_per_tick")]
    pub max_datagrams_per_tick: usize,
}

/// Telemetry batching configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_batch_bytes")]
    pub batch_bytes: usize,

    #[serde(default = "default_write_delay_ms")]
    pub write_delay_ms: u64,
}

/// Polling loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Diagnostic output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DiagnosticsConfig {
    /// Directory for a daily-rolling diagnostic log, in addition to stderr
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

// Default value functions
fn default_timeout_ms() -> u64 { 10 }
fn default_reconnect_interval_ms() -> u64 { 500 }

fn default_max_datagrams_per_tick() -> usize { 64 }

fn default_batch_bytes() -> usize { 100 * 1000 }
fn default_write_delay_ms() -> u64 { 5000 }

fn default_poll_interval_ms() -> u64 { 5 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: None,
            timeout_ms: default_timeout_ms(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            log_port: None,
            telemetry_ports: Vec::new(),
            max_datagrams_per_tick: default_max_datagrams_per_tick(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            batch_bytes: default_batch_bytes(),
            write_delay_ms: default_write_delay_ms(),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// The result is not validated yet: command line flags are usually merged
    /// in first, then [`Config::validate`] is called on the combination.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or TOML parsing fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use serial_capture::config::Config;
    ///
    /// let config = Config::load("capture.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Whether a serial source is configured (port and baud rate both given)
    pub fn has_serial(&self) -> bool {
        self.serial.port.is_some() && self.serial.baud_rate.is_some()
    }

    /// Whether at least one telemetry port is configured
    pub fn has_telemetry(&self) -> bool {
        !self.udp.telemetry_ports.is_empty()
    }

    /// Number of configured ingestion sources
    pub fn source_count(&self) -> usize {
        usize::from(self.has_serial())
            + usize::from(self.udp.log_port.is_some())
            + self.udp.telemetry_ports.len()
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Config`] if:
    /// - No log file path was given
    /// - Only one of serial port and baud rate was given
    /// - No ingestion source is configured
    /// - Daily wrapping is requested without [`DATETIME_PLACEHOLDER`] in the path
    /// - A UDP port is configured twice
    /// - Any tunable is out of range
    pub fn validate(&self) -> Result<()> {
        if self.log.file_spec.is_empty() {
            return Err(CaptureError::Config(
                "log file path (-f) is required".to_string(),
            ));
        }

        if self.serial.port.is_some() != self.serial.baud_rate.is_some() {
            return Err(CaptureError::Config(
                "serial capture needs both a port (-p) and a baud rate (-b)".to_string(),
            ));
        }

        if self.source_count() == 0 {
            return Err(CaptureError::Config(
                "at least one of -p/-b, -udp or -tlm must be given".to_string(),
            ));
        }

        if self.log.wrap_daily && !self.log.file_spec.contains(DATETIME_PLACEHOLDER) {
            return Err(CaptureError::Config(format!(
                "Wrap daily option requires {} in the file path",
                DATETIME_PLACEHOLDER
            )));
        }

        if self.serial.baud_rate == Some(0) {
            return Err(CaptureError::Config(
                "baud_rate must be greater than 0".to_string(),
            ));
        }

        let mut ports: Vec<u16> = self.udp.telemetry_ports.clone();
        ports.extend(self.udp.log_port);
        ports.sort_unstable();
        if let Some(pair) = ports.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(CaptureError::Config(format!(
                "UDP port {} is configured more than once",
                pair[0]
            )));
        }

        // Validate timing fields
        if self.serial.timeout_ms == 0 || self.serial.timeout_ms > 10000 {
            return Err(CaptureError::Config(
                "timeout_ms must be between 1 and 10000".to_string(),
            ));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(CaptureError::Config(
                "reconnect_interval_ms must be between 1 and 60000".to_string(),
            ));
        }

        if self.scheduler.poll_interval_ms == 0 || self.scheduler.poll_interval_ms > 1000 {
            return Err(CaptureError::Config(
                "poll_interval_ms must be between 1 and 1000".to_string(),
            ));
        }

        if self.telemetry.write_delay_ms == 0 || self.telemetry.write_delay_ms > 3_600_000 {
            return Err(CaptureError::Config(
                "write_delay_ms must be between 1 and 3600000".to_string(),
            ));
        }

        if self.telemetry.batch_bytes == 0 {
            return Err(CaptureError::Config(
                "batch_bytes must be greater than 0".to_string(),
            ));
        }

        if self.udp.max_datagrams_per_tick == 0 {
            return Err(CaptureError::Config(
                "max_datagrams_per_tick must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        let mut config = Config::default();
        config.log.file_spec = "capture_[DATETIME]".to_string();
        config.serial.port = Some("/dev/ttyUSB0".to_string());
        config.serial.baud_rate = Some(115200);
        config
    }

    fn assert_config_error(config: &Config, needle: &str) {
        match config.validate() {
            Err(CaptureError::Config(msg)) => {
                assert!(msg.contains(needle), "Unexpected message: {}", msg)
            }
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[test]
    fn test_default_config_has_no_sources() {
        let mut config = Config::default();
        config.log.file_spec = "capture".to_string();
        assert_eq!(config.source_count(), 0);
        assert_config_error(&config, "at least one");
    }

    #[test]
    fn test_valid_serial_config() {
        let config = create_valid_config();
        assert!(config.validate().is_ok());
        assert!(config.has_serial());
        assert!(!config.has_telemetry());
    }

    #[test]
    fn test_missing_file_spec() {
        let mut config = create_valid_config();
        config.log.file_spec.clear();
        assert_config_error(&config, "-f");
    }

    #[test]
    fn test_port_without_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = None;
        assert_config_error(&config, "baud rate");
    }

    #[test]
    fn test_baud_rate_without_port() {
        let mut config = create_valid_config();
        config.serial.port = None;
        config.udp.log_port = Some(9000);
        assert_config_error(&config, "port (-p)");
    }

    #[test]
    fn test_wrap_daily_requires_placeholder() {
        let mut config = create_valid_config();
        config.log.file_spec = "capture".to_string();
        config.log.wrap_daily = true;
        assert_config_error(&config, DATETIME_PLACEHOLDER);
    }

    #[test]
    fn test_wrap_daily_with_placeholder() {
        let mut config = create_valid_config();
        config.log.wrap_daily = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_udp_only_sources() {
        let mut config = create_valid_config();
        config.serial.port = None;
        config.serial.baud_rate = None;
        config.udp.log_port = Some(9000);
        config.udp.telemetry_ports = vec![9001, 9002];
        assert!(config.validate().is_ok());
        assert_eq!(config.source_count(), 3);
        assert!(config.has_telemetry());
    }

    #[test]
    fn test_duplicate_udp_ports() {
        let mut config = create_valid_config();
        config.udp.log_port = Some(9000);
        config.udp.telemetry_ports = vec![9001, 9000];
        assert_config_error(&config, "9000");
    }

    #[test]
    fn test_zero_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = Some(0);
        assert_config_error(&config, "baud_rate");
    }

    #[test]
    fn test_reconnect_interval_zero() {
        let mut config = create_valid_config();
        config.serial.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeout_ms_too_high() {
        let mut config = create_valid_config();
        config.serial.timeout_ms = 10001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_interval_zero() {
        let mut config = create_valid_config();
        config.scheduler.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_write_delay_zero() {
        let mut config = create_valid_config();
        config.telemetry.write_delay_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_batch_bytes_zero() {
        let mut config = create_valid_config();
        config.telemetry.batch_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_max_datagrams_per_tick_zero() {
        let mut config = create_valid_config();
        config.udp.max_datagrams_per_tick = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
reconnect_interval_ms = 250

[telemetry]
batch_bytes = 4096

[diagnostics]
dir = "/tmp/capture-diag"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.reconnect_interval_ms, 250);
        assert_eq!(config.serial.timeout_ms, default_timeout_ms());
        assert_eq!(config.telemetry.batch_bytes, 4096);
        assert_eq!(config.telemetry.write_delay_ms, 5000);
        assert_eq!(config.diagnostics.dir, Some(PathBuf::from("/tmp/capture-diag")));
    }

    #[test]
    fn test_load_invalid_toml() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[telemetry]\nbatch_bytes = \"lots\"\n").unwrap();
        temp_file.flush().unwrap();

        match Config::load(temp_file.path()) {
            Err(CaptureError::ConfigFile(_)) => {}
            other => panic!("Expected ConfigFile error, got: {:?}", other),
        }
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_timeout_ms(), 10);
        assert_eq!(default_reconnect_interval_ms(), 500);
        assert_eq!(default_max_datagrams_per_tick(), 64);
        assert_eq!(default_batch_bytes(), 100_000);
        assert_eq!(default_write_delay_ms(), 5000);
        assert_eq!(default_poll_interval_ms(), 5);
    }
}
