//! # Telemetry Store
//!
//! Batched SQLite persistence of telemetry packets.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE packets (
//!     id INTEGER PRIMARY KEY,
//!     dt INTEGER,      -- receipt time, 100 ns ticks since 0001-01-01
//!     src INTEGER,     -- sender IPv4 as little-endian i32, NULL for IPv6
//!     port INTEGER,    -- local port that received the datagram
//!     data BLOB        -- datagram payload
//! );
//! ```
//!
//! The table is append-only. Packets are inserted inside an open transaction
//! (a batch) that is committed once its payload volume reaches
//! [`BatchPolicy::batch_bytes`], or once [`BatchPolicy::write_delay`] has
//! passed since the last packet arrived.

use std::collections::VecDeque;
use std::path::Path;

use chrono::{DateTime, Duration, Local};
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use super::TelemetryPacket;
use crate::config::TelemetryConfig;
use crate::error::Result;

/// When an open batch gets committed
#[derive(Debug, Clone, Copy)]
pub struct BatchPolicy {
    /// Commit as soon as this many payload bytes are uncommitted
    pub batch_bytes: usize,
    /// Commit once this long has passed without a new packet
    pub write_delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            batch_bytes: 100 * 1000,
            write_delay: Duration::milliseconds(5000),
        }
    }
}

impl From<&TelemetryConfig> for BatchPolicy {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            batch_bytes: config.batch_bytes,
            write_delay: Duration::milliseconds(config.write_delay_ms as i64),
        }
    }
}

/// An open transaction and the packets written into it
///
/// The packets are kept until the commit succeeds so that a rolled-back
/// transaction can be replayed.
#[derive(Debug)]
struct Batch {
    bytes: usize,
    due: DateTime<Local>,
    packets: Vec<TelemetryPacket>,
}

impl Batch {
    fn new(due: DateTime<Local>) -> Self {
        Self {
            bytes: 0,
            due,
            packets: Vec::new(),
        }
    }
}

/// SQLite telemetry store with debounced batch commits
pub struct TelemetryStore {
    conn: Connection,
    policy: BatchPolicy,
    batch: Option<Batch>,
    /// Packets whose insert failed, retried before any new packet
    retry: VecDeque<TelemetryPacket>,
    /// A write failed; new packets are only queued until the next flush
    stalled: bool,
}

impl std::fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryStore")
            .field("policy", &self.policy)
            .field("batch", &self.batch.as_ref().map(|b| b.bytes))
            .field("retry", &self.retry.len())
            .field("stalled", &self.stalled)
            .finish_non_exhaustive()
    }
}

impl TelemetryStore {
    /// Open (creating if needed) the database at `path`
    ///
    /// Enables write-ahead logging so external readers can follow the
    /// capture while it runs.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or the schema cannot be created
    pub fn open<P: AsRef<Path>>(path: P, policy: BatchPolicy) -> Result<Self> {
        let path = path.as_ref();
        let created = !path.exists();
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        if created {
            info!("Created database [{}]", path.display());
        } else {
            info!("Appending to database [{}]", path.display());
        }
        Self::with_connection(conn, policy)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory(policy: BatchPolicy) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, policy)
    }

    fn with_connection(conn: Connection, policy: BatchPolicy) -> Result<Self> {
        // A locked database must fail fast instead of stalling the capture loop
        conn.busy_timeout(std::time::Duration::ZERO)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS packets (
                id INTEGER PRIMARY KEY,
                dt INTEGER,
                src INTEGER,
                port INTEGER,
                data BLOB
            )",
            [],
        )?;

        Ok(Self {
            conn,
            policy,
            batch: None,
            retry: VecDeque::new(),
            stalled: false,
        })
    }

    /// Whether a batch is open and not yet committed
    pub fn has_open_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Payload bytes inserted but not yet committed
    pub fn pending_bytes(&self) -> usize {
        self.batch.as_ref().map_or(0, |b| b.bytes)
    }

    /// Packets waiting to be re-inserted after a failure
    pub fn retry_len(&self) -> usize {
        self.retry.len()
    }

    /// Insert one packet into the open batch, opening one if needed
    ///
    /// Commits immediately if the batch reaches the size threshold. On
    /// failure the packet is queued and nothing is dropped. Until the next
    /// [`TelemetryStore::flush_if_due`] (or [`TelemetryStore::finish`]),
    /// later packets are only queued and the database is not touched.
    ///
    /// # Errors
    ///
    /// Returns the database error; the packet is retained regardless.
    pub fn record_packet(&mut self, packet: TelemetryPacket, now: DateTime<Local>) -> Result<()> {
        self.retry.push_back(packet);
        if self.stalled {
            return Ok(());
        }
        self.drain_retry(now)?;
        if self.pending_bytes() >= self.policy.batch_bytes {
            self.commit()?;
        }
        Ok(())
    }

    /// Commit the open batch if it is full or its deadline has passed
    ///
    /// Returns the number of payload bytes committed, if a commit happened.
    pub fn flush_if_due(&mut self, now: DateTime<Local>) -> Result<Option<usize>> {
        self.stalled = false;
        self.drain_retry(now)?;
        let due = match &self.batch {
            Some(batch) => batch.bytes >= self.policy.batch_bytes || now >= batch.due,
            None => false,
        };
        if due {
            return self.commit().map(Some);
        }
        Ok(None)
    }

    /// Commit everything, regardless of policy
    ///
    /// Called on shutdown. Packets still queued for retry are inserted first.
    pub fn finish(&mut self, now: DateTime<Local>) -> Result<usize> {
        self.stalled = false;
        self.drain_retry(now)?;
        if self.batch.is_some() {
            return self.commit();
        }
        Ok(0)
    }

    fn drain_retry(&mut self, now: DateTime<Local>) -> Result<()> {
        while let Some(packet) = self.retry.pop_front() {
            if let Err(e) = self.begin(now).and_then(|()| insert_row(&self.conn, &packet)) {
                self.retry.push_front(packet);
                self.recover_rolled_back();
                self.stalled = true;
                return Err(e);
            }
            let due = now + self.policy.write_delay;
            let batch = self.batch.get_or_insert_with(|| Batch::new(due));
            batch.bytes += packet.payload.len();
            batch.due = due;
            batch.packets.push(packet);
        }
        Ok(())
    }

    fn begin(&mut self, now: DateTime<Local>) -> Result<()> {
        if self.batch.is_none() {
            self.conn.execute_batch("BEGIN")?;
            debug!("Opened telemetry batch");
            self.batch = Some(Batch::new(now + self.policy.write_delay));
        }
        Ok(())
    }

    fn commit(&mut self) -> Result<usize> {
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            self.recover_rolled_back();
            self.stalled = true;
            return Err(e.into());
        }
        let bytes = self.batch.take().map_or(0, |b| b.bytes);
        info!("Wrote {} bytes to database", bytes);
        Ok(bytes)
    }

    /// SQLite may roll a transaction back on its own after a failed
    /// statement (disk full, I/O error). Requeue that batch's packets.
    fn recover_rolled_back(&mut self) {
        if !self.conn.is_autocommit() {
            return;
        }
        if let Some(batch) = self.batch.take() {
            warn!(
                "Telemetry batch of {} packets was rolled back, will write again",
                batch.packets.len()
            );
            for packet in batch.packets.into_iter().rev() {
                self.retry.push_front(packet);
            }
        }
    }
}

fn insert_row(conn: &Connection, packet: &TelemetryPacket) -> Result<()> {
    let mut stmt =
        conn.prepare_cached("INSERT INTO packets (dt, src, port, data) VALUES (?1, ?2, ?3, ?4)")?;
    stmt.execute(params![
        packet.receipt_ticks(),
        packet.source_code(),
        packet.port,
        &packet.payload[..],
    ])?;
    Ok(())
}

impl Drop for TelemetryStore {
    fn drop(&mut self) {
        if self.batch.is_some() {
            if let Err(e) = self.commit() {
                warn!("Failed to commit telemetry batch on close: {}", e);
            }
        }
    }
}
