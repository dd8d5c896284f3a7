//! # UDP Sources
//!
//! Non-blocking UDP listeners: one for log text, any number for telemetry.
//!
//! Both variants bind the IPv4 wildcard address on a fixed port and return
//! at most one datagram per receive. A bind failure is not retried.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use bytes::Bytes;
use chrono::Local;
use tracing::info;

use super::{Payload, Receive, SourceConnection};
use crate::error::{CaptureError, Result};
use crate::telemetry::TelemetryPacket;

/// Largest possible UDP payload
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Shared socket handling for both UDP variants
#[derive(Debug)]
struct UdpListener {
    name: String,
    port: u16,
    socket: Option<UdpSocket>,
    buf: Vec<u8>,
}

impl UdpListener {
    fn new(prefix: &str, port: u16) -> Self {
        Self {
            name: format!("{}:{}", prefix, port),
            port,
            socket: None,
            buf: vec![0u8; MAX_DATAGRAM_SIZE],
        }
    }

    fn open(&mut self) -> Result<()> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, self.port))
            .map_err(|e| CaptureError::transport(&self.name, format!("Failed to bind: {}", e)))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| CaptureError::transport(&self.name, e))?;
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) -> bool {
        self.socket.take().is_some()
    }

    /// Port actually bound, which differs from the configured one for port 0
    fn local_port(&self) -> Option<u16> {
        let socket = self.socket.as_ref()?;
        socket.local_addr().ok().map(|addr| addr.port())
    }

    /// Receive one datagram: `Ok(None)` when nothing is waiting
    fn recv(&mut self) -> io::Result<Option<(&[u8], SocketAddr)>> {
        let Some(socket) = self.socket.as_ref() else {
            return Ok(None);
        };
        match socket.recv_from(&mut self.buf) {
            Ok((n, from)) => Ok(Some((&self.buf[..n], from))),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// UDP source whose datagrams are log text
#[derive(Debug)]
pub struct UdpLogSource {
    listener: UdpListener,
}

impl UdpLogSource {
    pub fn new(port: u16) -> Self {
        Self {
            listener: UdpListener::new("udp", port),
        }
    }

    pub fn local_port(&self) -> Option<u16> {
        self.listener.local_port()
    }
}

impl SourceConnection for UdpLogSource {
    fn name(&self) -> &str {
        &self.listener.name
    }

    fn open(&mut self) -> Result<()> {
        self.listener.open()?;
        info!("Started UDP listener on port {}", self.listener.port);
        Ok(())
    }

    fn close(&mut self) {
        if self.listener.close() {
            info!("Closed UDP listener on port {}", self.listener.port);
        }
    }

    fn is_healthy(&self) -> bool {
        self.listener.socket.is_some()
    }

    fn try_receive(&mut self) -> Receive {
        match self.listener.recv() {
            Ok(Some((data, _from))) => Receive::Data(Payload::Text(Bytes::copy_from_slice(data))),
            Ok(None) => Receive::NoData,
            Err(e) => Receive::Error(format!("UDP Error: {}", e)),
        }
    }
}

/// UDP source whose datagrams are opaque telemetry
#[derive(Debug)]
pub struct UdpTelemetrySource {
    listener: UdpListener,
    local_port: u16,
}

impl UdpTelemetrySource {
    pub fn new(port: u16) -> Self {
        Self {
            listener: UdpListener::new("tlm", port),
            local_port: port,
        }
    }

    pub fn local_port(&self) -> Option<u16> {
        self.listener.local_port()
    }
}

impl SourceConnection for UdpTelemetrySource {
    fn name(&self) -> &str {
        &self.listener.name
    }

    fn open(&mut self) -> Result<()> {
        self.listener.open()?;
        self.local_port = self.listener.local_port().unwrap_or(self.listener.port);
        info!("Started UDP telemetry listener on port {}", self.local_port);
        Ok(())
    }

    fn close(&mut self) {
        if self.listener.close() {
            info!("Closed UDP telemetry listener on port {}", self.local_port);
        }
    }

    fn is_healthy(&self) -> bool {
        self.listener.socket.is_some()
    }

    fn try_receive(&mut self) -> Receive {
        let port = self.local_port;
        match self.listener.recv() {
            Ok(Some((data, from))) => Receive::Data(Payload::Telemetry(TelemetryPacket::new(
                Local::now(),
                from,
                port,
                Bytes::copy_from_slice(data),
            ))),
            Ok(None) => Receive::NoData,
            Err(e) => Receive::Error(format!("UDP Error: {}", e)),
        }
    }
}
