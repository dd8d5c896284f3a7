//! Trait abstraction for serial port operations to enable testing

use std::io;
use std::time::Duration;

/// Trait for serial port read operations
pub trait SerialPortIO {
    /// Number of bytes buffered by the driver and ready to read
    fn bytes_to_read(&self) -> io::Result<u32>;

    /// Read available bytes into `buf`
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Wrapper around a native `tokio_serial` port that implements SerialPortIO
pub struct NativeSerialPort {
    port: Box<dyn tokio_serial::SerialPort>,
}

impl NativeSerialPort {
    /// Open `path` at `baud_rate` with 8N1 framing and no flow control
    ///
    /// Reads block for at most `timeout`; the source only reads what
    /// `bytes_to_read` reports, so the timeout is a safety net.
    pub fn open(path: &str, baud_rate: u32, timeout: Duration) -> io::Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(timeout)
            .open()?;

        Ok(Self { port })
    }
}

impl SerialPortIO for NativeSerialPort {
    fn bytes_to_read(&self) -> io::Result<u32> {
        Ok(self.port.bytes_to_read()?)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut self.port, buf)
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// One scripted result returned by the mock port
    #[derive(Clone, Debug)]
    pub enum MockRead {
        Bytes(Vec<u8>),
        Error(io::ErrorKind),
    }

    /// Mock serial port for testing
    ///
    /// Clones share the same script, so a test can keep a handle after the
    /// port has been moved into a source.
    #[derive(Clone)]
    pub struct MockSerialPort {
        pub script: Arc<Mutex<VecDeque<MockRead>>>,
        pub poll_error: Arc<Mutex<Option<io::ErrorKind>>>,
    }

    impl MockSerialPort {
        pub fn new() -> Self {
            Self {
                script: Arc::new(Mutex::new(VecDeque::new())),
                poll_error: Arc::new(Mutex::new(None)),
            }
        }

        pub fn push_bytes(&self, data: &[u8]) {
            self.script.lock().unwrap().push_back(MockRead::Bytes(data.to_vec()));
        }

        pub fn push_error(&self, error: io::ErrorKind) {
            self.script.lock().unwrap().push_back(MockRead::Error(error));
        }

        pub fn set_poll_error(&self, error: io::ErrorKind) {
            *self.poll_error.lock().unwrap() = Some(error);
        }
    }

    impl SerialPortIO for MockSerialPort {
        fn bytes_to_read(&self) -> io::Result<u32> {
            if let Some(error) = *self.poll_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock poll error"));
            }
            match self.script.lock().unwrap().front() {
                Some(MockRead::Bytes(data)) => Ok(data.len() as u32),
                Some(MockRead::Error(_)) => Ok(1),
                None => Ok(0),
            }
        }

        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.lock().unwrap().pop_front() {
                Some(MockRead::Bytes(data)) => {
                    let n = data.len().min(buf.len());
                    buf[..n].copy_from_slice(&data[..n]);
                    Ok(n)
                }
                Some(MockRead::Error(error)) => Err(io::Error::new(error, "Mock read error")),
                None => Err(io::Error::new(io::ErrorKind::TimedOut, "Mock timeout")),
            }
        }
    }
}
