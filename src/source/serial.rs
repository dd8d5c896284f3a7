//! # Serial Source
//!
//! Reads text from a serial device.
//!
//! This module handles:
//! - Opening the named port at the configured baud rate
//! - Draining whatever the driver has buffered, without blocking
//! - Treating read timeouts as "no data"
//! - Flagging the port unhealthy when the device goes away, so the
//!   scheduler can close it and start reconnecting

use std::io;
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info};

use super::port_trait::{NativeSerialPort, SerialPortIO};
use super::{Payload, Receive, SourceConnection};
use crate::error::{CaptureError, Result};

/// Upper bound on bytes taken from the driver in one receive
const MAX_READ_CHUNK: usize = 64 * 1024;

/// Opens a port: `(path, baud_rate, read_timeout)`
pub type PortOpener = Box<dyn FnMut(&str, u32, Duration) -> io::Result<Box<dyn SerialPortIO>>>;

/// Serial device source
///
/// Retries `open` until the device appears; see [`SourceConnection::retries_open`].
pub struct SerialSource {
    device_path: String,
    baud_rate: u32,
    timeout: Duration,
    opener: PortOpener,
    port: Option<Box<dyn SerialPortIO>>,
    healthy: bool,
    buf: Vec<u8>,
}

impl std::fmt::Debug for SerialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialSource")
            .field("device_path", &self.device_path)
            .field("baud_rate", &self.baud_rate)
            .field("open", &self.port.is_some())
            .finish_non_exhaustive()
    }
}

impl SerialSource {
    /// Create a source for a native serial device
    ///
    /// The port is not opened until [`SourceConnection::open`] is called.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use serial_capture::source::{SerialSource, SourceConnection};
    ///
    /// let mut serial = SerialSource::new("/dev/ttyUSB0", 115200, Duration::from_millis(10));
    /// serial.open()?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(device_path: &str, baud_rate: u32, timeout: Duration) -> Self {
        Self::with_opener(
            device_path,
            baud_rate,
            timeout,
            Box::new(|path, baud, timeout| {
                let port = NativeSerialPort::open(path, baud, timeout)?;
                Ok(Box::new(port) as Box<dyn SerialPortIO>)
            }),
        )
    }

    /// Create a source that obtains its port from `opener`
    pub fn with_opener(device_path: &str, baud_rate: u32, timeout: Duration, opener: PortOpener) -> Self {
        Self {
            device_path: device_path.to_string(),
            baud_rate,
            timeout,
            opener,
            port: None,
            healthy: false,
            buf: Vec::new(),
        }
    }

    /// Get the device path of the serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    fn fail(&mut self, error: io::Error) -> Receive {
        if is_transient(&error) {
            return Receive::NoData;
        }
        self.healthy = false;
        Receive::Error(error.to_string())
    }
}

/// Errors that only mean "nothing arrived in time"
fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

impl SourceConnection for SerialSource {
    fn name(&self) -> &str {
        &self.device_path
    }

    fn open(&mut self) -> Result<()> {
        debug!("Trying to open serial port: {}", self.device_path);

        let port = (self.opener)(&self.device_path, self.baud_rate, self.timeout)
            .map_err(|e| CaptureError::transport(&self.device_path, format!("Failed to open: {}", e)))?;

        info!("Opened {} at {} baud, READY", self.device_path, self.baud_rate);
        self.port = Some(port);
        self.healthy = true;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            info!("Closing {}", self.device_path);
        }
        self.healthy = false;
    }

    fn is_healthy(&self) -> bool {
        self.port.is_some() && self.healthy
    }

    fn try_receive(&mut self) -> Receive {
        let Some(port) = self.port.as_mut() else {
            return Receive::NoData;
        };

        let available = match port.bytes_to_read() {
            Ok(0) => return Receive::NoData,
            Ok(n) => (n as usize).min(MAX_READ_CHUNK),
            Err(e) => return self.fail(e),
        };

        self.buf.resize(available, 0);
        match port.read(&mut self.buf) {
            Ok(0) => Receive::NoData,
            Ok(n) => Receive::Data(Payload::Text(Bytes::copy_from_slice(&self.buf[..n]))),
            Err(e) => self.fail(e),
        }
    }

    fn retries_open(&self) -> bool {
        true
    }
}
