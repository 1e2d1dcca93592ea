use crate::error::InstrumentError;
use crate::types::{Current, PowerSupplyMode, Voltage, Waveform, WaveformEncoding};

/// Programmable power supply with one or more output channels.
///
/// Many supplies are write-only for some settings; those getters return
/// [`InstrumentError::NotSupported`] instead of a guessed value.
pub trait PowerSupply {
    fn channel_count(&self) -> usize;

    fn mode(&mut self, channel: usize) -> Result<PowerSupplyMode, InstrumentError>;

    fn set_mode(&mut self, channel: usize, mode: PowerSupplyMode) -> Result<(), InstrumentError>;

    fn voltage(&mut self, channel: usize) -> Result<Voltage, InstrumentError>;

    fn set_voltage(&mut self, channel: usize, voltage: Voltage) -> Result<(), InstrumentError>;

    fn current(&mut self, channel: usize) -> Result<Current, InstrumentError>;

    fn set_current(&mut self, channel: usize, current: Current) -> Result<(), InstrumentError>;

    /// Whether the output is enabled
    fn output(&mut self, channel: usize) -> Result<bool, InstrumentError>;

    fn set_output(&mut self, channel: usize, enabled: bool) -> Result<(), InstrumentError>;
}

/// Digitizing oscilloscope.
pub trait Oscilloscope {
    /// Identifies a trace that waveform data can be transferred from
    type Source: Copy + PartialEq + std::fmt::Debug;

    fn channel_count(&self) -> usize;

    /// Source selected for waveform transfer
    fn data_source(&mut self) -> Result<Self::Source, InstrumentError>;

    fn set_data_source(&mut self, source: Self::Source) -> Result<(), InstrumentError>;

    /// Transfer and scale the waveform of `source`.
    fn read_waveform(
        &mut self,
        source: Self::Source,
        encoding: WaveformEncoding,
    ) -> Result<Waveform, InstrumentError>;

    fn force_trigger(&mut self) -> Result<(), InstrumentError>;
}
