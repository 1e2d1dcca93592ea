//! Galvant Industries GPIBUSB adapter.
//!
//! The adapter sits on a serial port and forwards lines to the GPIB bus. It has
//! to be told which bus address to talk to (`+a:<addr>`) and, after a query, to
//! go and fetch the instrument's reply (`+read`).

use super::{Communicator, StreamCommunicator, Transport};
use crate::error::InstrumentError;
use log::debug;
use std::time::Duration;

/// Default baud rate of the GPIBUSB adapter's virtual serial port.
pub const GPIBUSB_BAUD_RATE: u32 = 460_800;

/// Highest primary address allowed on a GPIB bus.
pub const MAX_GPIB_ADDRESS: u8 = 30;

pub struct GpibUsbCommunicator<T: Transport> {
    inner: StreamCommunicator<T>,
    address: u8,
    selected: Option<u8>,
}

impl<T: Transport> GpibUsbCommunicator<T> {
    pub fn new(inner: StreamCommunicator<T>, address: u8) -> Result<Self, InstrumentError> {
        validate_address(address)?;
        Ok(Self {
            inner,
            address,
            selected: None,
        })
    }

    pub fn gpib_address(&self) -> u8 {
        self.address
    }

    /// Change the bus address. The adapter is re-addressed on the next write.
    pub fn set_gpib_address(&mut self, address: u8) -> Result<(), InstrumentError> {
        validate_address(address)?;
        self.address = address;
        Ok(())
    }

    fn select(&mut self) -> Result<(), InstrumentError> {
        if self.selected != Some(self.address) {
            debug!("GPIBUSB: addressing instrument {}", self.address);
            self.inner
                .write_raw(format!("+a:{}\n", self.address).as_bytes())?;
            self.selected = Some(self.address);
        }
        Ok(())
    }
}

fn validate_address(address: u8) -> Result<(), InstrumentError> {
    if address > MAX_GPIB_ADDRESS {
        return Err(InstrumentError::InvalidArgument(format!(
            "GPIB address must be between 0 and {MAX_GPIB_ADDRESS}, got {address}"
        )));
    }
    Ok(())
}

impl<T: Transport> Communicator for GpibUsbCommunicator<T> {
    fn write_raw(&mut self, data: &[u8]) -> Result<(), InstrumentError> {
        self.select()?;
        self.inner.write_raw(data)
    }

    fn read_exact_raw(&mut self, size: usize) -> Result<Vec<u8>, InstrumentError> {
        self.inner.read_exact_raw(size)
    }

    fn read_until(&mut self, terminator: &[u8]) -> Result<Vec<u8>, InstrumentError> {
        self.inner.read_until(terminator)
    }

    fn flush_input(&mut self) -> Result<(), InstrumentError> {
        self.inner.flush_input()
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), InstrumentError> {
        self.inner.set_timeout(timeout)
    }

    fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    fn address(&self) -> String {
        format!("{} gpib#{}", self.inner.address(), self.address)
    }

    fn prepare_read(&mut self) -> Result<(), InstrumentError> {
        self.select()?;
        self.inner.write_raw(b"+read\n")
    }
}
