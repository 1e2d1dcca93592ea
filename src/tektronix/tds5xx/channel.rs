use super::TekTds5xx;
use crate::error::InstrumentError;
use crate::types::{Bandwidth, Coupling, Impedance, Source, Waveform, WaveformEncoding};

/// One of the four input channels of a [`TekTds5xx`].
pub struct Tds5xxChannel<'a> {
    scope: &'a mut TekTds5xx,
    /// 1-based, as used in `CH<n>` headers
    number: usize,
    source: Source,
}

impl<'a> Tds5xxChannel<'a> {
    pub(super) fn new(scope: &'a mut TekTds5xx, number: usize, source: Source) -> Self {
        Self {
            scope,
            number,
            source,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    pub fn read_waveform(
        &mut self,
        encoding: WaveformEncoding,
    ) -> Result<Waveform, InstrumentError> {
        self.scope.read_waveform(self.source, encoding)
    }

    pub fn coupling(&mut self) -> Result<Coupling, InstrumentError> {
        self.scope
            .inst
            .query_parsed(&format!("CH{}:COUPL?", self.number))
    }

    pub fn set_coupling(&mut self, coupling: Coupling) -> Result<(), InstrumentError> {
        self.scope
            .sendcmd(&format!("CH{}:COUPL {coupling}", self.number))
    }

    pub fn bandwidth(&mut self) -> Result<Bandwidth, InstrumentError> {
        self.scope
            .inst
            .query_parsed(&format!("CH{}:BAND?", self.number))
    }

    pub fn set_bandwidth(&mut self, bandwidth: Bandwidth) -> Result<(), InstrumentError> {
        self.scope
            .sendcmd(&format!("CH{}:BAND {bandwidth}", self.number))
    }

    pub fn impedance(&mut self) -> Result<Impedance, InstrumentError> {
        self.scope
            .inst
            .query_parsed(&format!("CH{}:IMP?", self.number))
    }

    pub fn set_impedance(&mut self, impedance: Impedance) -> Result<(), InstrumentError> {
        self.scope
            .sendcmd(&format!("CH{}:IMP {impedance}", self.number))
    }

    /// Probe attenuation, e.g. `10.0` for a 10x probe.
    ///
    /// The scope reports the probe gain (`0.1` for 10x), which is inverted
    /// and rounded here.
    pub fn probe(&mut self) -> Result<f64, InstrumentError> {
        let command = format!("CH{}:PRO?", self.number);
        let gain = self.scope.inst.query_f64(&command)?;
        if gain == 0.0 {
            return Err(InstrumentError::parse(
                command.as_str(),
                "0",
                "probe gain of zero",
            ));
        }
        Ok((1.0 / gain).round())
    }

    /// Vertical scale in volts per division
    pub fn scale(&mut self) -> Result<f64, InstrumentError> {
        self.scope
            .inst
            .query_f64(&format!("CH{}:SCA?", self.number))
    }

    pub fn set_scale(&mut self, volts_per_div: f64) -> Result<(), InstrumentError> {
        let header = format!("CH{}:SCA", self.number);
        let setting = format!("CH{} scale", self.number);
        self.scope.set_verified(&header, &setting, volts_per_div)
    }
}
