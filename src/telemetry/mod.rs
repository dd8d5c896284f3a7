//! # Telemetry Module
//!
//! Persists raw telemetry datagrams into SQLite.
//!
//! This module handles:
//! - Describing each received datagram ([`TelemetryPacket`])
//! - Creating the capture database (WAL mode, single `packets` table)
//! - Batching inserts into transactions committed on a size threshold or
//!   an idle deadline, whichever comes first
//! - Committing any open batch on shutdown

pub mod packet;
pub mod store;

pub use packet::TelemetryPacket;
pub use store::{BatchPolicy, TelemetryStore};
