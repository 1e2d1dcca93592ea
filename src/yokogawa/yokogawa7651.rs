//! Yokogawa 7651 programmable DC source.
//!
//! The 7651 has a single output that is either a voltage source (0 V to
//! ±30 V) or a current source (up to ±100 mA). Every setting change is only
//! applied once the instrument is triggered with `E;`, which the setters here
//! do for you. The instrument cannot report its settings back.

use crate::error::InstrumentError;
use crate::instrument::Instrument;
use crate::interface::PowerSupply;
use crate::types::{Current, PowerSupplyMode, Voltage};
use crate::utils::format_float;
use log::debug;

const CHANNEL_COUNT: usize = 1;

/// Function code for the `F` command
fn mode_code(mode: PowerSupplyMode) -> u8 {
    match mode {
        PowerSupplyMode::Voltage => 1,
        PowerSupplyMode::Current => 5,
    }
}

pub struct Yokogawa7651 {
    inst: Instrument,
}

impl Yokogawa7651 {
    pub fn new(inst: Instrument) -> Self {
        Self { inst }
    }

    pub fn open_tcpip(host: &str, port: u16) -> Result<Self, InstrumentError> {
        Ok(Self::new(Instrument::open_tcpip(host, port)?))
    }

    pub fn open_serial(port: &str, baud_rate: u32) -> Result<Self, InstrumentError> {
        Ok(Self::new(Instrument::open_serial(port, baud_rate)?))
    }

    /// The usual way to reach a 7651: through a GPIBUSB adapter.
    ///
    /// ```no_run
    /// use instrument_kit::Yokogawa7651;
    ///
    /// let mut yoko = Yokogawa7651::open_gpibusb("/dev/ttyUSB0", 10)?;
    /// yoko.set_voltage(1.0)?;
    /// yoko.set_output(true)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_gpibusb(port: &str, address: u8) -> Result<Self, InstrumentError> {
        Ok(Self::new(Instrument::open_gpibusb(port, address)?))
    }

    pub fn instrument(&mut self) -> &mut Instrument {
        &mut self.inst
    }

    pub fn into_inner(self) -> Instrument {
        self.inst
    }

    /// Handle to output `idx`. Only index 0 exists.
    pub fn channel(&mut self, idx: usize) -> Result<Yokogawa7651Channel<'_>, InstrumentError> {
        check_channel(idx)?;
        Ok(Yokogawa7651Channel { yoko: self })
    }

    /// Apply pending setting changes.
    pub fn trigger(&mut self) -> Result<(), InstrumentError> {
        self.inst.sendcmd("E;")
    }

    pub fn set_mode(&mut self, mode: PowerSupplyMode) -> Result<(), InstrumentError> {
        debug!("Yokogawa 7651: mode {:?}", mode);
        self.inst.sendcmd(&format!("F{};", mode_code(mode)))?;
        self.trigger()
    }

    /// Switch to constant voltage and program `voltage`.
    pub fn set_voltage(&mut self, voltage: impl Into<Voltage>) -> Result<(), InstrumentError> {
        let volts = voltage.into().0;
        self.program(PowerSupplyMode::Voltage, volts, "voltage")
    }

    /// Switch to constant current and program `current`.
    pub fn set_current(&mut self, current: impl Into<Current>) -> Result<(), InstrumentError> {
        let amps = current.into().0;
        self.program(PowerSupplyMode::Current, amps, "current")
    }

    pub fn set_output(&mut self, enabled: bool) -> Result<(), InstrumentError> {
        self.inst.sendcmd(if enabled { "O1;" } else { "O0;" })?;
        self.trigger()
    }

    fn program(
        &mut self,
        mode: PowerSupplyMode,
        value: f64,
        what: &str,
    ) -> Result<(), InstrumentError> {
        if !value.is_finite() {
            return Err(InstrumentError::InvalidArgument(format!(
                "Output {what} must be finite, got {value}"
            )));
        }
        self.set_mode(mode)?;
        self.inst.sendcmd(&format!("SA{};", format_float(value)))?;
        self.trigger()
    }
}

fn check_channel(idx: usize) -> Result<(), InstrumentError> {
    if idx >= CHANNEL_COUNT {
        return Err(InstrumentError::InvalidArgument(format!(
            "Yokogawa 7651 has a single channel, got index {idx}"
        )));
    }
    Ok(())
}

fn not_readable(what: &str) -> InstrumentError {
    InstrumentError::NotSupported(format!("The Yokogawa 7651 cannot report its {what}"))
}

/// The only output channel of a [`Yokogawa7651`].
pub struct Yokogawa7651Channel<'a> {
    yoko: &'a mut Yokogawa7651,
}

impl Yokogawa7651Channel<'_> {
    pub fn set_mode(&mut self, mode: PowerSupplyMode) -> Result<(), InstrumentError> {
        self.yoko.set_mode(mode)
    }

    pub fn set_voltage(&mut self, voltage: impl Into<Voltage>) -> Result<(), InstrumentError> {
        self.yoko.set_voltage(voltage)
    }

    pub fn set_current(&mut self, current: impl Into<Current>) -> Result<(), InstrumentError> {
        self.yoko.set_current(current)
    }

    pub fn set_output(&mut self, enabled: bool) -> Result<(), InstrumentError> {
        self.yoko.set_output(enabled)
    }
}

impl PowerSupply for Yokogawa7651 {
    fn channel_count(&self) -> usize {
        CHANNEL_COUNT
    }

    fn mode(&mut self, channel: usize) -> Result<PowerSupplyMode, InstrumentError> {
        check_channel(channel)?;
        Err(not_readable("operation mode"))
    }

    fn set_mode(&mut self, channel: usize, mode: PowerSupplyMode) -> Result<(), InstrumentError> {
        check_channel(channel)?;
        Yokogawa7651::set_mode(self, mode)
    }

    fn voltage(&mut self, channel: usize) -> Result<Voltage, InstrumentError> {
        check_channel(channel)?;
        Err(not_readable("output voltage setting"))
    }

    fn set_voltage(&mut self, channel: usize, voltage: Voltage) -> Result<(), InstrumentError> {
        check_channel(channel)?;
        Yokogawa7651::set_voltage(self, voltage)
    }

    fn current(&mut self, channel: usize) -> Result<Current, InstrumentError> {
        check_channel(channel)?;
        Err(not_readable("output current setting"))
    }

    fn set_current(&mut self, channel: usize, current: Current) -> Result<(), InstrumentError> {
        check_channel(channel)?;
        Yokogawa7651::set_current(self, current)
    }

    fn output(&mut self, channel: usize) -> Result<bool, InstrumentError> {
        check_channel(channel)?;
        Err(not_readable("output status"))
    }

    fn set_output(&mut self, channel: usize, enabled: bool) -> Result<(), InstrumentError> {
        check_channel(channel)?;
        Yokogawa7651::set_output(self, enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::{Loopback, LoopbackLog};

    fn yoko(script: Loopback) -> (Yokogawa7651, LoopbackLog) {
        let (inst, log) = Instrument::loopback(script).unwrap();
        (Yokogawa7651::new(inst), log)
    }

    #[test]
    fn test_set_voltage_selects_mode_then_programs() {
        let (mut yoko, log) = yoko(
            Loopback::new()
                .expect("F1;")
                .expect("E;")
                .expect("SA1.0;")
                .expect("E;"),
        );
        yoko.set_voltage(1.0).unwrap();
        assert_eq!(log.commands(), vec!["F1;", "E;", "SA1.0;", "E;"]);
    }

    #[test]
    fn test_set_current_uses_current_mode() {
        let (mut yoko, log) = yoko(
            Loopback::new()
                .expect("F5;")
                .expect("E;")
                .expect("SA0.001;")
                .expect("E;"),
        );
        yoko.set_current(Current::milliamps(1.0)).unwrap();
        assert_eq!(log.commands(), vec!["F5;", "E;", "SA0.001;", "E;"]);
    }

    #[test]
    fn test_small_current_uses_signed_exponent() {
        let (mut yoko, log) = yoko(
            Loopback::new()
                .expect("F5;")
                .expect("E;")
                .expect("SA1e-05;")
                .expect("E;"),
        );
        yoko.set_current(Current::amps(1e-5)).unwrap();
        assert_eq!(log.commands()[2], "SA1e-05;");
    }

    #[test]
    fn test_output_toggle() {
        let (mut yoko, log) = yoko(
            Loopback::new()
                .expect("O1;")
                .expect("E;")
                .expect("O0;")
                .expect("E;"),
        );
        yoko.set_output(true).unwrap();
        yoko.set_output(false).unwrap();
        assert_eq!(log.commands(), vec!["O1;", "E;", "O0;", "E;"]);
    }

    #[test]
    fn test_channel_handle() {
        let (mut yoko, log) = yoko(Loopback::new().expect("F5;").expect("E;"));
        yoko.channel(0)
            .unwrap()
            .set_mode(PowerSupplyMode::Current)
            .unwrap();
        assert_eq!(log.commands(), vec!["F5;", "E;"]);
        assert!(matches!(
            yoko.channel(1),
            Err(InstrumentError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_getters_not_supported() {
        let (mut yoko, log) = yoko(Loopback::new());
        assert!(matches!(
            PowerSupply::voltage(&mut yoko, 0),
            Err(InstrumentError::NotSupported(_))
        ));
        assert!(matches!(
            PowerSupply::current(&mut yoko, 0),
            Err(InstrumentError::NotSupported(_))
        ));
        assert!(matches!(
            PowerSupply::mode(&mut yoko, 0),
            Err(InstrumentError::NotSupported(_))
        ));
        assert!(matches!(
            PowerSupply::output(&mut yoko, 0),
            Err(InstrumentError::NotSupported(_))
        ));
        assert!(log.commands().is_empty());
    }

    #[test]
    fn test_trait_checks_channel() {
        let (mut yoko, _) = yoko(Loopback::new());
        assert_eq!(PowerSupply::channel_count(&yoko), 1);
        assert!(matches!(
            PowerSupply::set_voltage(&mut yoko, 1, Voltage::volts(2.0)),
            Err(InstrumentError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_non_finite_rejected_before_sending() {
        let (mut yoko, log) = yoko(Loopback::new());
        assert!(matches!(
            yoko.set_voltage(f64::NAN),
            Err(InstrumentError::InvalidArgument(_))
        ));
        assert!(log.commands().is_empty());
    }
}
