//! # Command Line
//!
//! Capture targets come from the command line; tunables come from the
//! optional TOML file given with `--config`.
//!
//! The single-dash long flags `-udp` and `-tlm` are accepted as aliases for
//! `--udp` and `--tlm`.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{CommandFactory, Parser};

use crate::config::Config;
use crate::error::Result;

/// Capture serial and UDP text into a timestamped log, and UDP telemetry into SQLite
#[derive(Debug, Parser)]
#[command(name = "serial-capture", version)]
#[command(about = "Capture serial and UDP text into a timestamped log, and UDP telemetry into SQLite")]
pub struct Cli {
    /// Log file path; may contain [DATETIME]
    #[arg(short = 'f', value_name = "PATH")]
    pub file: Option<String>,

    /// Serial device
    #[arg(short = 'p', value_name = "PORT")]
    pub port: Option<String>,

    /// Serial baud rate
    #[arg(short = 'b', value_name = "BAUD")]
    pub baud: Option<u32>,

    /// UDP port carrying log text
    #[arg(long = "udp", value_name = "PORT")]
    pub udp: Option<u16>,

    /// UDP ports carrying binary telemetry
    #[arg(long = "tlm", value_name = "PORT[,PORT...]", value_delimiter = ',')]
    pub tlm: Vec<u16>,

    /// Start a new log file every day (needs [DATETIME] in -f)
    #[arg(short = 'd')]
    pub daily: bool,

    /// TOML file with tunables
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write diagnostics to a daily file in this directory
    #[arg(long = "diag-dir", value_name = "DIR")]
    pub diag_dir: Option<PathBuf>,
}

/// Rewrite `-udp`/`-tlm` (and their `=value` forms) to the double-dash spelling
pub fn normalize_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            match arg.to_str() {
                Some(s) if is_single_dash_long(s) => OsString::from(format!("-{}", s)),
                _ => arg,
            }
        })
        .collect()
}

fn is_single_dash_long(arg: &str) -> bool {
    ["-udp", "-tlm"]
        .iter()
        .any(|flag| arg == *flag || arg.strip_prefix(flag).is_some_and(|rest| rest.starts_with('=')))
}

impl Cli {
    /// Parse the process arguments; exits with usage on a parse error
    pub fn parse_from_env() -> Self {
        Self::parse_from(normalize_args(std::env::args_os()))
    }

    /// Parse an explicit argument list
    ///
    /// # Errors
    ///
    /// Returns the clap error for unknown flags or malformed values
    pub fn try_parse_args<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_args(args))
    }

    /// Load the TOML file (if any) and overlay the command line on it
    ///
    /// # Errors
    ///
    /// Returns error if the config file cannot be read or parsed
    pub fn to_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    /// Overlay the command line onto `config`; flags win
    pub fn apply(&self, config: &mut Config) {
        if let Some(file) = &self.file {
            config.log.file_spec = file.clone();
        }
        if self.daily {
            config.log.wrap_daily = true;
        }
        if let Some(port) = &self.port {
            config.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = Some(baud);
        }
        if let Some(port) = self.udp {
            config.udp.log_port = Some(port);
        }
        if !self.tlm.is_empty() {
            config.udp.telemetry_ports = self.tlm.clone();
        }
        if let Some(dir) = &self.diag_dir {
            config.diagnostics.dir = Some(dir.clone());
        }
    }
}

/// Full usage text, printed on configuration errors
pub fn usage() -> String {
    Cli::command().render_help().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["serial-capture"];
        full.extend_from_slice(args);
        Cli::try_parse_args(full).unwrap()
    }

    #[test]
    fn test_normalize_single_dash_flags() {
        let args = normalize_args(["prog", "-udp", "9000", "-tlm=9100", "-f", "-udpx"]);
        assert_eq!(args, vec!["prog", "--udp", "9000", "--tlm=9100", "-f", "-udpx"]);
    }

    #[test]
    fn test_parse_serial_capture() {
        let cli = parse(&["-f", "log_[DATETIME]", "-p", "/dev/ttyUSB0", "-b", "115200", "-d"]);
        assert_eq!(cli.file.as_deref(), Some("log_[DATETIME]"));
        assert_eq!(cli.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(cli.baud, Some(115200));
        assert!(cli.daily);
        assert!(cli.tlm.is_empty());
    }

    #[test]
    fn test_parse_udp_flags() {
        let cli = parse(&["-f", "net", "-udp", "9000", "-tlm", "9100,9101"]);
        assert_eq!(cli.udp, Some(9000));
        assert_eq!(cli.tlm, vec![9100, 9101]);
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(Cli::try_parse_args(["serial-capture", "-udp", "70000"]).is_err());
        assert!(Cli::try_parse_args(["serial-capture", "-b", "fast"]).is_err());
    }

    #[test]
    fn test_apply_overrides_config() {
        let cli = parse(&["-f", "out", "-udp", "9000", "-tlm", "9100"]);
        let mut config = Config::default();
        config.udp.log_port = Some(1234);
        cli.apply(&mut config);

        assert_eq!(config.log.file_spec, "out");
        assert_eq!(config.udp.log_port, Some(9000));
        assert_eq!(config.udp.telemetry_ports, vec![9100]);
        assert!(!config.log.wrap_daily);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_no_source_fails_validation() {
        let config = parse(&["-f", "out"]).to_config().unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_to_config_reads_tunables() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[telemetry]\nwrite_delay_ms = 2000\n\n[udp]\nmax_datagrams_per_tick = 8").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let config = parse(&["--config", &path, "-f", "out", "-tlm", "9100"])
            .to_config()
            .unwrap();
        assert_eq!(config.telemetry.write_delay_ms, 2000);
        assert_eq!(config.udp.max_datagrams_per_tick, 8);
        assert_eq!(config.telemetry.batch_bytes, 100_000);
        assert_eq!(config.udp.telemetry_ports, vec![9100]);
    }

    #[test]
    fn test_usage_lists_flags() {
        let text = usage();
        assert!(text.contains("-f"));
        assert!(text.contains("--tlm"));
        assert!(text.contains("--udp"));
    }
}
