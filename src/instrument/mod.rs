use crate::comm::{self, Communicator, GpibUsbCommunicator, Loopback, LoopbackLog, StreamCommunicator};
use crate::error::InstrumentError;
use byteorder::{BigEndian, ReadBytesExt};
use log::debug;
use std::io::Cursor;
use std::str::FromStr;
use std::time::Duration;

pub mod scpi;

pub use crate::comm::gpibusb::GPIBUSB_BAUD_RATE;
pub use scpi::Identity;

pub const DEFAULT_TERMINATOR: &str = "\n";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Largest binary block accepted. TDS 5xx records top out at 50k two-byte points.
pub const MAX_BLOCK_LEN: usize = 16 * 1024 * 1024;

/// Where an instrument is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Connection {
    Tcp { host: String, port: u16 },
    Serial { port: String, baud_rate: u32 },
    GpibUsb { port: String, baud_rate: u32, address: u8 },
}

/// Builder for [`Instrument`].
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use instrument_kit::Instrument;
///
/// let scope = Instrument::builder()
///     .tcp("192.168.0.2", 4000)
///     .timeout(Duration::from_secs(10))
///     .build()?;
///
/// let yoko = Instrument::builder()
///     .gpibusb("/dev/ttyUSB0", 10)
///     .build()?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Default)]
pub struct InstrumentBuilder {
    connection: Option<Connection>,
    communicator: Option<Box<dyn Communicator>>,
    timeout: Option<Duration>,
    terminator: Option<String>,
}

impl InstrumentBuilder {
    pub fn tcp(mut self, host: &str, port: u16) -> Self {
        self.connection = Some(Connection::Tcp {
            host: host.to_string(),
            port,
        });
        self
    }

    pub fn serial(mut self, port: &str, baud_rate: u32) -> Self {
        self.connection = Some(Connection::Serial {
            port: port.to_string(),
            baud_rate,
        });
        self
    }

    /// Galvant GPIBUSB adapter on `port`, instrument at GPIB `address`
    pub fn gpibusb(mut self, port: &str, address: u8) -> Self {
        self.connection = Some(Connection::GpibUsb {
            port: port.to_string(),
            baud_rate: GPIBUSB_BAUD_RATE,
            address,
        });
        self
    }

    /// Override the baud rate of a serial or GPIBUSB connection. Must come
    /// after `.serial(..)` or `.gpibusb(..)`; ignored for TCP.
    pub fn baud(mut self, rate: u32) -> Self {
        match &mut self.connection {
            Some(Connection::Serial { baud_rate, .. })
            | Some(Connection::GpibUsb { baud_rate, .. }) => *baud_rate = rate,
            _ => {}
        }
        self
    }

    pub fn connection(mut self, connection: Connection) -> Self {
        self.connection = Some(connection);
        self
    }

    /// Use an already opened communicator. Takes precedence over any connection.
    pub fn communicator(mut self, communicator: Box<dyn Communicator>) -> Self {
        self.communicator = Some(communicator);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Line terminator appended to commands and expected after replies
    pub fn terminator(mut self, terminator: &str) -> Self {
        self.terminator = Some(terminator.to_string());
        self
    }

    pub fn build(self) -> Result<Instrument, InstrumentError> {
        let terminator = self
            .terminator
            .unwrap_or_else(|| DEFAULT_TERMINATOR.to_string());
        if terminator.is_empty() {
            return Err(InstrumentError::InvalidArgument(
                "Terminator must not be empty".to_string(),
            ));
        }

        let comm: Box<dyn Communicator> = match (self.communicator, self.connection) {
            (Some(mut comm), _) => {
                if let Some(timeout) = self.timeout {
                    comm.set_timeout(timeout)?;
                }
                comm
            }
            (None, Some(connection)) => {
                let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
                open_connection(&connection, timeout)?
            }
            (None, None) => {
                return Err(InstrumentError::InvalidArgument(
                    "A connection or communicator must be specified".to_string(),
                ));
            }
        };

        debug!("Instrument ready on {}", comm.address());
        Ok(Instrument { comm, terminator })
    }
}

fn open_connection(
    connection: &Connection,
    timeout: Duration,
) -> Result<Box<dyn Communicator>, InstrumentError> {
    Ok(match connection {
        Connection::Tcp { host, port } => Box::new(comm::open_tcp(host, *port, timeout)?),
        Connection::Serial { port, baud_rate } => {
            Box::new(comm::open_serial(port, *baud_rate, timeout)?)
        }
        Connection::GpibUsb {
            port,
            baud_rate,
            address,
        } => {
            let serial = comm::open_serial(port, *baud_rate, timeout)?;
            Box::new(GpibUsbCommunicator::new(serial, *address)?)
        }
    })
}

/// A message-based instrument: terminated ASCII commands and queries plus
/// IEEE-488.2 binary blocks over some [`Communicator`].
pub struct Instrument {
    comm: Box<dyn Communicator>,
    terminator: String,
}

impl Instrument {
    pub fn builder() -> InstrumentBuilder {
        InstrumentBuilder::default()
    }

    pub fn open_tcpip(host: &str, port: u16) -> Result<Self, InstrumentError> {
        Self::builder().tcp(host, port).build()
    }

    pub fn open_serial(port: &str, baud_rate: u32) -> Result<Self, InstrumentError> {
        Self::builder().serial(port, baud_rate).build()
    }

    pub fn open_gpibusb(port: &str, address: u8) -> Result<Self, InstrumentError> {
        Self::builder().gpibusb(port, address).build()
    }

    /// Instrument backed by a scripted [`Loopback`], plus the log of what was sent.
    pub fn loopback(script: Loopback) -> Result<(Self, LoopbackLog), InstrumentError> {
        let log = script.log();
        let comm = StreamCommunicator::new(script, Duration::from_millis(100))?;
        let inst = Self::builder().communicator(Box::new(comm)).build()?;
        Ok((inst, log))
    }

    pub fn terminator(&self) -> &str {
        &self.terminator
    }

    pub fn set_terminator(&mut self, terminator: &str) -> Result<(), InstrumentError> {
        if terminator.is_empty() {
            return Err(InstrumentError::InvalidArgument(
                "Terminator must not be empty".to_string(),
            ));
        }
        self.terminator = terminator.to_string();
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        self.comm.timeout()
    }

    pub fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError> {
        self.comm.set_timeout(timeout)
    }

    pub fn address(&self) -> String {
        self.comm.address()
    }

    /// Send a command, appending the terminator.
    pub fn sendcmd(&mut self, command: &str) -> Result<(), InstrumentError> {
        debug!(">> {command}");
        let mut line = Vec::with_capacity(command.len() + self.terminator.len());
        line.extend_from_slice(command.as_bytes());
        line.extend_from_slice(self.terminator.as_bytes());
        self.comm.write_raw(&line)
    }

    /// Send a query and return the reply with surrounding whitespace removed.
    pub fn query(&mut self, command: &str) -> Result<String, InstrumentError> {
        self.sendcmd(command)?;
        self.comm.prepare_read()?;
        let raw = self.comm.read_until(self.terminator.as_bytes())?;
        let reply = String::from_utf8_lossy(&raw).trim().to_string();
        debug!("<< {reply}");
        Ok(reply)
    }

    /// Send a query and read exactly `size` raw bytes back.
    pub fn query_raw(&mut self, command: &str, size: usize) -> Result<Vec<u8>, InstrumentError> {
        self.sendcmd(command)?;
        self.read_raw(size)
    }

    pub fn read_raw(&mut self, size: usize) -> Result<Vec<u8>, InstrumentError> {
        self.comm.prepare_read()?;
        let data = self.comm.read_exact_raw(size)?;
        debug!("<< {} raw bytes", data.len());
        Ok(data)
    }

    pub fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.comm.write_raw(data)
    }

    pub fn flush_input(&mut self) -> Result<(), InstrumentError> {
        self.comm.flush_input()
    }

    /// Query and parse the reply with [`FromStr`].
    pub fn query_parsed<T>(&mut self, command: &str) -> Result<T, InstrumentError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let reply = self.query(command)?;
        reply
            .parse::<T>()
            .map_err(|e| InstrumentError::parse(command, reply.as_str(), e.to_string()))
    }

    pub fn query_f64(&mut self, command: &str) -> Result<f64, InstrumentError> {
        self.query_parsed(command)
    }

    /// Query an integer flag (`0`/`1`).
    pub fn query_bool(&mut self, command: &str) -> Result<bool, InstrumentError> {
        let reply = self.query(command)?;
        crate::utils::parse_int_bool(&reply)
            .ok_or_else(|| InstrumentError::parse(command, reply, "expected an integer flag"))
    }

    /// Read an IEEE-488.2 definite-length binary block and decode it as signed
    /// big-endian integers `data_width` bytes wide.
    pub fn binblockread(&mut self, data_width: usize) -> Result<Vec<i64>, InstrumentError> {
        check_data_width(data_width)?;
        self.comm.prepare_read()?;

        let marker = self.comm.read_exact_raw(1)?;
        if marker[0] != b'#' {
            return Err(InstrumentError::Protocol(format!(
                "Binary block must start with '#', got {:?}",
                marker[0] as char
            )));
        }

        let digits = self.comm.read_exact_raw(1)?;
        let digit_count = parse_ascii_number(&digits)?;
        if digit_count == 0 {
            return Err(InstrumentError::Protocol(
                "Indefinite-length binary blocks are not supported".to_string(),
            ));
        }

        let length_field = self.comm.read_exact_raw(digit_count)?;
        let byte_count = parse_ascii_number(&length_field)?;
        debug!("Binary block of {byte_count} bytes, width {data_width}");
        if byte_count > MAX_BLOCK_LEN {
            return Err(InstrumentError::Protocol(format!(
                "Binary block of {byte_count} bytes exceeds the {MAX_BLOCK_LEN} byte limit"
            )));
        }

        let payload = self.comm.read_exact_raw(byte_count)?;
        decode_block(&payload, data_width)
    }
}

fn check_data_width(data_width: usize) -> Result<(), InstrumentError> {
    match data_width {
        1 | 2 | 4 => Ok(()),
        _ => Err(InstrumentError::InvalidArgument(format!(
            "Unsupported binary data width {data_width}"
        ))),
    }
}

fn parse_ascii_number(bytes: &[u8]) -> Result<usize, InstrumentError> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| {
            InstrumentError::Protocol(format!(
                "Invalid binary block header field {:?}",
                String::from_utf8_lossy(bytes)
            ))
        })
}

/// Decode a binary block payload of signed big-endian integers.
pub fn decode_block(payload: &[u8], data_width: usize) -> Result<Vec<i64>, InstrumentError> {
    check_data_width(data_width)?;
    if payload.len() % data_width != 0 {
        return Err(InstrumentError::Protocol(format!(
            "Block of {} bytes is not a multiple of the data width {}",
            payload.len(),
            data_width
        )));
    }

    let mut cursor = Cursor::new(payload);
    let mut values = Vec::with_capacity(payload.len() / data_width);
    for _ in 0..payload.len() / data_width {
        let value = match data_width {
            1 => cursor.read_i8()? as i64,
            2 => cursor.read_i16::<BigEndian>()? as i64,
            _ => cursor.read_i32::<BigEndian>()? as i64,
        };
        values.push(value);
    }
    Ok(values)
}
