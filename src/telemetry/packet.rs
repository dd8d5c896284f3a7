//! Telemetry datagram record and its column encodings.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use chrono::{DateTime, Local};

/// 100 ns ticks between 0001-01-01T00:00:00 and 1970-01-01T00:00:00
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// Ticks per second (one tick is 100 ns)
const TICKS_PER_SECOND: i64 = 10_000_000;

/// One received telemetry datagram
///
/// The sequence id is not stored here: the database assigns it on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryPacket {
    /// Wall-clock time the datagram was taken off the socket
    pub received_at: DateTime<Local>,
    /// Sender address
    pub source: SocketAddr,
    /// Local port that received the datagram
    pub port: u16,
    /// Datagram contents, stored byte for byte
    pub payload: Bytes,
}

impl TelemetryPacket {
    pub fn new(received_at: DateTime<Local>, source: SocketAddr, port: u16, payload: Bytes) -> Self {
        Self {
            received_at,
            source,
            port,
            payload,
        }
    }

    /// Receipt time as 100 ns ticks since 0001-01-01, local wall clock
    ///
    /// This is the `dt` column format existing capture readers expect.
    pub fn receipt_ticks(&self) -> i64 {
        let local = self.received_at.naive_local().and_utc();
        TICKS_AT_UNIX_EPOCH
            + local.timestamp() * TICKS_PER_SECOND
            + i64::from(local.timestamp_subsec_nanos() / 100)
    }

    /// Sender address as stored in the `src` column
    ///
    /// IPv4 octets are read as a little-endian `i32` and widened. IPv4-mapped
    /// IPv6 senders are unwrapped first; any other IPv6 sender has no 32-bit
    /// encoding and yields `None` (stored as NULL).
    pub fn source_code(&self) -> Option<i64> {
        let v4 = match self.source.ip() {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(v6) => v6.to_ipv4_mapped()?,
        };
        Some(i64::from(i32::from_le_bytes(v4.octets())))
    }
}
