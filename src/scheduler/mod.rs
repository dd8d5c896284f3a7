//! # Scheduler Module
//!
//! The single-threaded capture loop.
//!
//! This module handles:
//! - Opening the log file and every configured source at startup
//! - Polling each source once per tick without blocking on any of them
//! - Routing text into the shared line buffer and telemetry into the store
//! - Reopening the serial port after a disconnect while the other sources
//!   keep running
//! - Draining buffered text and committing telemetry on quit
//!
//! All mutable capture state (line buffer, pending line, open batch, active
//! log day) lives in [`Scheduler`] and is only touched inside
//! [`Scheduler::tick`], so none of it needs locking.
//!
//! ## Lifecycle
//!
//! ```text
//! Init -> Connecting <-> Running -> ShuttingDown -> Terminated
//! ```
//!
//! `Connecting` means at least one source is waiting to be (re)opened;
//! sources that are already open are polled as usual.

pub mod quit;
pub mod runner;

use std::io::{self, Write};

use bytes::BytesMut;
use chrono::{DateTime, Duration, Local};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{CaptureError, ReportOnce, Result};
use crate::logfile::{LineAssembler, LogFileSink, LogFileSpec};
use crate::source::{
    Payload, Receive, SerialSource, SourceConnection, UdpLogSource, UdpTelemetrySource,
};
use crate::telemetry::{BatchPolicy, TelemetryStore};

pub use quit::{OperatorQuit, QuitSignal};
pub use runner::run;

/// Scheduler lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Connecting,
    Running,
    ShuttingDown,
    Terminated,
}

/// Tunables for the polling loop
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Wait between failed attempts to open a retrying source
    pub reconnect_interval: Duration,
    /// Upper bound on receives from one source in one tick
    pub max_reads_per_tick: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::milliseconds(500),
            max_reads_per_tick: 64,
        }
    }
}

impl From<&Config> for SchedulerOptions {
    fn from(config: &Config) -> Self {
        Self {
            reconnect_interval: Duration::milliseconds(config.serial.reconnect_interval_ms as i64),
            max_reads_per_tick: config.udp.max_datagrams_per_tick,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    Connecting { next_attempt: DateTime<Local> },
    Running,
    Disabled,
}

/// A source plus its connection state
struct SourceSlot {
    source: Box<dyn SourceConnection>,
    state: SlotState,
    errors: ReportOnce,
}

impl SourceSlot {
    fn try_open(&mut self, now: DateTime<Local>, retry_after: Duration) {
        match self.source.open() {
            Ok(()) => {
                self.errors.clear();
                self.state = SlotState::Running;
            }
            Err(e) if self.source.retries_open() => {
                self.errors.report("Error", &e.to_string());
                self.state = SlotState::Connecting {
                    next_attempt: now + retry_after,
                };
            }
            Err(e) => {
                warn!("{}; source disabled", e);
                self.state = SlotState::Disabled;
            }
        }
    }
}

/// Cooperative polling loop over every configured source
pub struct Scheduler {
    phase: Phase,
    slots: Vec<SourceSlot>,
    line_buffer: BytesMut,
    assembler: LineAssembler,
    sink: LogFileSink,
    store: Option<TelemetryStore>,
    quit: Box<dyn QuitSignal>,
    echo: Box<dyn Write>,
    options: SchedulerOptions,
    log_errors: ReportOnce,
    store_errors: ReportOnce,
}

impl Scheduler {
    /// Assemble a scheduler from its parts
    ///
    /// Nothing is opened until the first [`Scheduler::tick`]. Captured text
    /// is echoed to stdout unless replaced with [`Scheduler::with_echo`].
    pub fn new(
        sink: LogFileSink,
        store: Option<TelemetryStore>,
        sources: Vec<Box<dyn SourceConnection>>,
        quit: Box<dyn QuitSignal>,
        options: SchedulerOptions,
    ) -> Self {
        let slots = sources
            .into_iter()
            .map(|source| SourceSlot {
                source,
                state: SlotState::Disabled,
                errors: ReportOnce::new(),
            })
            .collect();

        Self {
            phase: Phase::Init,
            slots,
            line_buffer: BytesMut::new(),
            assembler: LineAssembler::new(),
            sink,
            store,
            quit,
            echo: Box::new(io::stdout()),
            options,
            log_errors: ReportOnce::new(),
            store_errors: ReportOnce::new(),
        }
    }

    /// Build the sink, telemetry store and sources described by `config`
    ///
    /// `config` must already be validated. The log file and, when telemetry
    /// ports are configured, the database next to it (`.db` extension) are
    /// both opened here for the same `now`, so their names always match.
    /// Sources are only opened by the first tick.
    ///
    /// # Errors
    ///
    /// Returns error if the path template is invalid, or the log file or
    /// database cannot be opened
    pub fn from_config(config: &Config, quit: Box<dyn QuitSignal>, now: DateTime<Local>) -> Result<Self> {
        let spec = LogFileSpec::new(&config.log.file_spec, config.log.wrap_daily)?;

        let title = config
            .serial
            .port
            .clone()
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        let mut sink = LogFileSink::new(spec.clone()).with_title(title);
        sink.ensure_open(now)?;

        let store = if config.has_telemetry() {
            let path = spec.database_path(now);
            Some(TelemetryStore::open(path, BatchPolicy::from(&config.telemetry))?)
        } else {
            None
        };

        let mut sources: Vec<Box<dyn SourceConnection>> = Vec::new();
        if let (Some(port), Some(baud_rate)) = (&config.serial.port, config.serial.baud_rate) {
            let timeout = std::time::Duration::from_millis(config.serial.timeout_ms);
            sources.push(Box::new(SerialSource::new(port, baud_rate, timeout)));
        }
        if let Some(port) = config.udp.log_port {
            sources.push(Box::new(UdpLogSource::new(port)));
        }
        for &port in &config.udp.telemetry_ports {
            sources.push(Box::new(UdpTelemetrySource::new(port)));
        }

        Ok(Self::new(sink, store, sources, quit, SchedulerOptions::from(config)))
    }

    /// Replace the console echo of captured text
    pub fn with_echo(mut self, echo: Box<dyn Write>) -> Self {
        self.echo = echo;
        self
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The log file sink (active path, active day)
    pub fn sink(&self) -> &LogFileSink {
        &self.sink
    }

    /// Run one step of the lifecycle
    ///
    /// # Errors
    ///
    /// Only startup failures are fatal: the log file cannot be created, or
    /// no source could be opened at all. Everything later is reported and
    /// retried on a following tick.
    pub fn tick(&mut self, now: DateTime<Local>) -> Result<Phase> {
        match self.phase {
            Phase::Init => self.start(now)?,
            Phase::Connecting | Phase::Running => {
                if self.quit.quit_requested() {
                    self.shutdown(now);
                } else {
                    self.poll_sources(now);
                    self.assemble(now);
                    self.flush_telemetry(now);
                    self.set_phase(self.connection_phase());
                }
            }
            Phase::ShuttingDown => self.shutdown(now),
            Phase::Terminated => {}
        }
        Ok(self.phase)
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            debug!("Scheduler {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    fn connection_phase(&self) -> Phase {
        let connecting = self
            .slots
            .iter()
            .any(|slot| matches!(slot.state, SlotState::Connecting { .. }));
        if connecting {
            Phase::Connecting
        } else {
            Phase::Running
        }
    }

    fn start(&mut self, now: DateTime<Local>) -> Result<()> {
        self.sink.ensure_open(now)?;

        for slot in &mut self.slots {
            slot.try_open(now, self.options.reconnect_interval);
            if let SlotState::Connecting { .. } = slot.state {
                info!("Opening {}, retrying until it is available", slot.source.name());
            }
        }

        if self.slots.iter().all(|slot| slot.state == SlotState::Disabled) {
            return Err(CaptureError::transport(
                "all sources",
                "no ingestion source could be opened",
            ));
        }

        self.set_phase(self.connection_phase());
        Ok(())
    }

    fn poll_sources(&mut self, now: DateTime<Local>) {
        let Self {
            slots,
            line_buffer,
            store,
            store_errors,
            options,
            ..
        } = self;

        for slot in slots.iter_mut() {
            if let SlotState::Connecting { next_attempt } = slot.state {
                if now >= next_attempt {
                    slot.try_open(now, options.reconnect_interval);
                }
            }
            if slot.state != SlotState::Running {
                continue;
            }

            for _ in 0..options.max_reads_per_tick {
                match slot.source.try_receive() {
                    Receive::Data(Payload::Text(text)) => line_buffer.extend_from_slice(&text),
                    Receive::Data(Payload::Telemetry(packet)) => match store.as_mut() {
                        Some(store) => {
                            if let Err(e) = store.record_packet(packet, now) {
                                store_errors.report("Error", &format!("{} --- will try again later", e));
                            }
                        }
                        None => debug!("No telemetry store, dropping packet from {}", slot.source.name()),
                    },
                    Receive::NoData => break,
                    Receive::Error(message) => {
                        slot.errors.report(slot.source.name(), &message);
                        break;
                    }
                }
            }

            if !slot.source.is_healthy() {
                slot.source.close();
                if slot.source.retries_open() {
                    warn!("{} disconnected, reconnecting", slot.source.name());
                    slot.state = SlotState::Connecting { next_attempt: now };
                } else {
                    warn!("{} is no longer usable; source disabled", slot.source.name());
                    slot.state = SlotState::Disabled;
                }
            }
        }
    }

    fn assemble(&mut self, now: DateTime<Local>) {
        let result = self.assembler.process(
            &mut self.line_buffer,
            &mut self.sink,
            now,
            self.echo.as_mut(),
        );
        match result {
            Ok(0) => {}
            Ok(_) => self.log_errors.clear(),
            Err(e) => {
                self.log_errors
                    .report("Error", &format!("{} --- will try again later", e));
            }
        }
    }

    fn flush_telemetry(&mut self, now: DateTime<Local>) {
        if let Some(store) = self.store.as_mut() {
            match store.flush_if_due(now) {
                Ok(_) => self.store_errors.clear(),
                Err(e) => {
                    self.store_errors
                        .report("Error", &format!("{} --- will try again later", e));
                }
            }
        }
    }

    fn shutdown(&mut self, now: DateTime<Local>) {
        self.set_phase(Phase::ShuttingDown);

        for slot in &mut self.slots {
            slot.source.close();
            slot.state = SlotState::Disabled;
        }

        if let Err(e) = self.assembler.finish(
            &mut self.line_buffer,
            &mut self.sink,
            now,
            self.echo.as_mut(),
        ) {
            error!("Failed to write remaining log text: {}", e);
        }

        if let Some(mut store) = self.store.take() {
            if let Err(e) = store.finish(now) {
                error!("Failed to commit telemetry on shutdown: {}", e);
            }
        }

        self.set_phase(Phase::Terminated);
    }
}
