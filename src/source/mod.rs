//! # Source Module
//!
//! Ingestion endpoints polled by the scheduler.
//!
//! This module handles:
//! - The [`SourceConnection`] capability shared by every endpoint
//! - Serial devices (text, reopened after disconnects)
//! - UDP log sockets (text)
//! - UDP telemetry sockets (opaque binary datagrams)
//!
//! Every receive is a single non-blocking step: "nothing available" is the
//! common case and is reported as [`Receive::NoData`], never as an error.

pub mod port_trait;
pub mod serial;
pub mod udp;

use bytes::Bytes;

use crate::error::Result;
use crate::telemetry::TelemetryPacket;

pub use serial::SerialSource;
pub use udp::{UdpLogSource, UdpTelemetrySource};

/// Data produced by one successful receive
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw text bytes destined for the shared line buffer
    Text(Bytes),
    /// A binary datagram destined for the telemetry store
    Telemetry(TelemetryPacket),
}

/// Outcome of [`SourceConnection::try_receive`]
#[derive(Debug, Clone, PartialEq)]
pub enum Receive {
    /// Data was available
    Data(Payload),
    /// Nothing to read right now (includes read timeouts)
    NoData,
    /// The transport reported an error; check [`SourceConnection::is_healthy`]
    Error(String),
}

/// A single ingestion endpoint
///
/// The scheduler holds a set of these without knowing their concrete kind;
/// payload routing is decided by the [`Payload`] variant.
#[cfg_attr(test, mockall::automock)]
pub trait SourceConnection {
    /// Short human-readable name used in diagnostics (e.g. `udp:9000`)
    fn name(&self) -> &str;

    /// Establish the transport
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::CaptureError::Transport`] if the device is
    /// absent or busy, or the socket cannot be bound.
    fn open(&mut self) -> Result<()>;

    /// Release the transport; a no-op if not open
    fn close(&mut self);

    /// Whether the transport is open and still usable
    fn is_healthy(&self) -> bool;

    /// Receive whatever is available without blocking
    fn try_receive(&mut self) -> Receive;

    /// Whether a failed `open` should be retried until it succeeds
    fn retries_open(&self) -> bool {
        false
    }
}
