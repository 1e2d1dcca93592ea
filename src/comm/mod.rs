//! Byte-stream communicators used to talk to instruments.
//!
//! A [`Communicator`] hides the physical link (TCP socket, serial port, GPIBUSB
//! adapter or the scripted [`Loopback`]) behind a small raw I/O surface. Command
//! framing (terminators, queries, binary blocks) lives one level up in
//! [`crate::instrument::Instrument`].

use crate::error::InstrumentError;
use log::{debug, warn};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

pub mod gpibusb;
pub mod loopback;
pub mod stream;

pub use gpibusb::GpibUsbCommunicator;
pub use loopback::{Loopback, LoopbackLog};
pub use stream::{StreamCommunicator, Transport};

/// Number of consecutive zero-length reads tolerated before a read is abandoned.
pub const MAX_EMPTY_READS: usize = 10;

/// Raw link to an instrument.
pub trait Communicator: Send {
    /// Write all bytes to the instrument.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError>;

    /// Read exactly `size` bytes.
    fn read_exact_raw(&mut self, size: usize) -> Result<Vec<u8>, InstrumentError>;

    /// Read until `terminator` is seen. The terminator is not part of the result.
    fn read_until(&mut self, terminator: &[u8]) -> Result<Vec<u8>, InstrumentError>;

    /// Discard everything that is waiting to be read.
    fn flush_input(&mut self) -> Result<(), InstrumentError>;

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError>;

    fn timeout(&self) -> Duration;

    /// Human readable description of the link, used in log lines.
    fn address(&self) -> String;

    /// Called before a reply is read. Adapters that must be told to fetch the
    /// instrument's answer (GPIBUSB) hook in here.
    fn prepare_read(&mut self) -> Result<(), InstrumentError> {
        Ok(())
    }
}

/// Open a TCP connection, trying every address the host name resolves to.
pub fn open_tcp(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<StreamCommunicator<TcpStream>, InstrumentError> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| InstrumentError::io(e, format!("Failed to resolve {host}:{port}")))?;

    let mut last_error = None;
    for addr in addrs {
        debug!("Connecting to instrument at {addr}");
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_nodelay(true)
                    .map_err(|e| InstrumentError::io(e, "Failed to disable Nagle"))?;
                debug!("Connected to {addr}");
                return StreamCommunicator::new(stream, timeout);
            }
            Err(e) => {
                warn!("Failed to connect to {addr}: {e}");
                last_error = Some(e);
            }
        }
    }

    Err(match last_error {
        Some(e) => InstrumentError::io(e, format!("Failed to connect to {host}:{port}")),
        None => InstrumentError::InvalidArgument(format!(
            "Host {host} did not resolve to any address"
        )),
    })
}

/// Open a serial port with 8N1 framing.
pub fn open_serial(
    port: &str,
    baud_rate: u32,
    timeout: Duration,
) -> Result<StreamCommunicator<Box<dyn serialport::SerialPort>>, InstrumentError> {
    debug!("Opening serial port {port} at {baud_rate} baud");
    let serial = serialport::new(port, baud_rate)
        .timeout(timeout)
        .open()
        .map_err(|e| {
            InstrumentError::io(
                std::io::Error::from(e),
                format!("Failed to open serial port '{port}' at {baud_rate} baud"),
            )
        })?;
    StreamCommunicator::new(serial, timeout)
}
