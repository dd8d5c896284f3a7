//! # Serial Capture
//!
//! Capture serial and UDP log text into a timestamped log file, and UDP
//! telemetry datagrams into a SQLite database next to it.
//!
//! # Examples
//!
//! ```bash
//! serial-capture -f "bench_[DATETIME]" -p /dev/ttyUSB0 -b 115200 -d
//! serial-capture -f field -udp 9000 -tlm 9100,9101
//! ```
//!
//! Captured text is echoed to stdout; diagnostics go to stderr. Press `Q`
//! (or Ctrl+C) to stop.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Local;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use serial_capture::cli::{self, Cli};
use serial_capture::config::Config;
use serial_capture::scheduler::{self, OperatorQuit, Scheduler};

/// File name prefix of the daily diagnostics file
const DIAGNOSTICS_FILE_PREFIX: &str = "serial-capture.diag";

/// Build the configuration and validate it, printing usage on error
///
/// Runs before any file or directory is created.
fn load_config(cli: &Cli) -> Result<Config> {
    let config = cli.to_config()?;
    if let Err(e) = config.validate() {
        eprintln!("{}\n", e);
        eprintln!("{}", cli::usage());
        return Err(e.into());
    }
    Ok(config)
}

/// Daily diagnostics file in `dir`, created on demand
fn diagnostics_appender(dir: &Path) -> std::result::Result<RollingFileAppender, InitError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(DIAGNOSTICS_FILE_PREFIX)
        .build(dir)
}

/// Set up stderr logging, plus a daily diagnostics file when `diag_dir` is set
///
/// The returned guard flushes the file writer and must live until exit.
///
/// # Errors
///
/// Returns error if the diagnostics directory cannot be used
fn init_tracing(diag_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match diag_dir {
        Some(dir) => {
            let appender = diagnostics_appender(dir)?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse_from_env();
    let config = load_config(&cli)?;

    let _guard = init_tracing(config.diagnostics.dir.as_deref())?;

    info!("Serial Capture v{} starting...", env!("CARGO_PKG_VERSION"));

    let quit_flag = Arc::new(AtomicBool::new(false));
    let ctrl_c_flag = quit_flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down...");
            ctrl_c_flag.store(true, Ordering::SeqCst);
        }
    });

    let scheduler = Scheduler::from_config(
        &config,
        Box::new(OperatorQuit::new(quit_flag)),
        Local::now(),
    )?;

    info!("Press Q or Ctrl+C to exit");
    let poll_interval = Duration::from_millis(config.scheduler.poll_interval_ms);
    if let Err(e) = scheduler::run(scheduler, poll_interval).await {
        error!("Capture failed: {}", e);
        return Err(e.into());
    }

    info!("Serial Capture stopped");
    Ok(())
}
