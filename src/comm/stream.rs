use super::{Communicator, MAX_EMPTY_READS};
use crate::error::InstrumentError;
use log::debug;
use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// A bidirectional byte stream an instrument can be reached through.
pub trait Transport: Read + Write + Send {
    /// Drop any input the operating system has already received.
    fn clear_input(&mut self) -> std::io::Result<()>;

    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()>;

    fn describe(&self) -> String;
}

impl Transport for TcpStream {
    fn clear_input(&mut self) -> std::io::Result<()> {
        self.set_nonblocking(true)?;
        let mut scratch = [0u8; 1024];
        let drained = loop {
            match self.read(&mut scratch) {
                Ok(0) => break Ok(()),
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => break Err(e),
            }
        };
        self.set_nonblocking(false)?;
        drained
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        self.set_read_timeout(Some(timeout))?;
        self.set_write_timeout(Some(timeout))
    }

    fn describe(&self) -> String {
        self.peer_addr()
            .map(|addr| format!("tcp://{addr}"))
            .unwrap_or_else(|_| "tcp://<disconnected>".to_string())
    }
}

impl Transport for Box<dyn serialport::SerialPort> {
    fn clear_input(&mut self) -> std::io::Result<()> {
        serialport::SerialPort::clear(&**self, serialport::ClearBuffer::Input)
            .map_err(std::io::Error::from)
    }

    fn set_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        serialport::SerialPort::set_timeout(&mut **self, timeout).map_err(std::io::Error::from)
    }

    fn describe(&self) -> String {
        let name = serialport::SerialPort::name(&**self).unwrap_or_else(|| "?".to_string());
        format!("serial://{name}")
    }
}

/// Buffered [`Communicator`] over any [`Transport`].
pub struct StreamCommunicator<T: Transport> {
    reader: BufReader<T>,
    timeout: Duration,
}

impl<T: Transport> StreamCommunicator<T> {
    /// Wrap `transport` and apply `timeout` to it.
    pub fn new(mut transport: T, timeout: Duration) -> Result<Self, InstrumentError> {
        transport
            .set_timeout(timeout)
            .map_err(|e| InstrumentError::io(e, "Failed to set link timeout"))?;
        Ok(Self {
            reader: BufReader::new(transport),
            timeout,
        })
    }

    pub fn get_ref(&self) -> &T {
        self.reader.get_ref()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.reader.get_mut()
    }
}

impl<T: Transport> Communicator for StreamCommunicator<T> {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        let stream = self.reader.get_mut();
        stream
            .write_all(data)
            .and_then(|_| stream.flush())
            .map_err(|e| InstrumentError::io(e, "Writing to instrument"))
    }

    fn read_exact_raw(&mut self, size: usize) -> Result<Vec<u8>, InstrumentError> {
        let mut out = vec![0u8; size];
        let mut filled = 0;
        let mut empty_reads = 0;

        while filled < size {
            match self.reader.read(&mut out[filled..]) {
                Ok(0) => {
                    empty_reads += 1;
                    if empty_reads >= MAX_EMPTY_READS {
                        return Err(InstrumentError::Protocol(format!(
                            "Link returned no data after {filled} of {size} bytes"
                        )));
                    }
                }
                Ok(n) => {
                    filled += n;
                    empty_reads = 0;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Read failed after {filled} of {size} bytes: {e}");
                    return Err(InstrumentError::io(
                        e,
                        format!("Reading {size} bytes from instrument"),
                    ));
                }
            }
        }

        Ok(out)
    }

    fn read_until(&mut self, terminator: &[u8]) -> Result<Vec<u8>, InstrumentError> {
        if terminator.is_empty() {
            return Err(InstrumentError::InvalidArgument(
                "Read terminator must not be empty".to_string(),
            ));
        }

        let mut line = Vec::new();
        let mut empty_reads = 0;

        loop {
            let available = match self.reader.fill_buf() {
                Ok(buf) => buf,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(InstrumentError::io(e, "Reading reply from instrument"));
                }
            };

            if available.is_empty() {
                empty_reads += 1;
                if empty_reads >= MAX_EMPTY_READS {
                    return Err(InstrumentError::Protocol(
                        "Link closed before the reply terminator arrived".to_string(),
                    ));
                }
                continue;
            }
            empty_reads = 0;

            // byte-wise so a terminator split across two reads still matches
            let mut used = 0;
            let mut complete = false;
            for &byte in available {
                used += 1;
                line.push(byte);
                if line.ends_with(terminator) {
                    complete = true;
                    break;
                }
            }
            self.reader.consume(used);

            if complete {
                line.truncate(line.len() - terminator.len());
                return Ok(line);
            }
        }
    }

    fn flush_input(&mut self) -> Result<(), InstrumentError> {
        let buffered = self.reader.buffer().len();
        self.reader.consume(buffered);
        self.reader
            .get_mut()
            .clear_input()
            .map_err(|e| InstrumentError::io(e, "Flushing instrument input"))
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError> {
        self.reader
            .get_mut()
            .set_timeout(timeout)
            .map_err(|e| InstrumentError::io(e, "Failed to set link timeout"))?;
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn address(&self) -> String {
        self.reader.get_ref().describe()
    }
}
