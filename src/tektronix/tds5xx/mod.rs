//! Tektronix TDS 500 series digitizing oscilloscopes (TDS 520A, 540A, ...).
//!
//! The scope exposes four input channels, three math traces and four
//! reference memories. Any of them can be selected as the waveform data source;
//! [`TekTds5xx::read_waveform`] takes care of selecting and restoring it.

use crate::error::InstrumentError;
use crate::instrument::Instrument;
use crate::interface::Oscilloscope;
use crate::types::{
    Coupling, Edge, Mnemonic, Source, TriggerSource, Waveform, WaveformEncoding,
};
use crate::utils::format_sci;
use chrono::NaiveDateTime;
use log::{debug, info};
use std::time::Duration;

mod channel;
mod data_source;
mod hardcopy;
mod measurement;

pub use channel::Tds5xxChannel;
pub use data_source::Tds5xxDataSource;
pub use hardcopy::{bmp_payload_length, Hardcopy, BMP_HEADER_LEN};
pub use measurement::Tds5xxMeasurement;

pub const CHANNEL_COUNT: usize = 4;
pub const MATH_COUNT: usize = 3;
pub const REFERENCE_COUNT: usize = 4;
pub const MEASUREMENT_COUNT: usize = 4;

/// Time the scope needs after `HARDC START` before the bitmap can be read
pub const DEFAULT_HARDCOPY_WAIT: Duration = Duration::from_secs(1);

const DATA_SOURCE_SETTLE: Duration = Duration::from_millis(10);
const CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct TekTds5xx {
    inst: Instrument,
    hardcopy_wait: Duration,
}

impl TekTds5xx {
    pub fn new(inst: Instrument) -> Self {
        Self {
            inst,
            hardcopy_wait: DEFAULT_HARDCOPY_WAIT,
        }
    }

    /// Connect through a network-to-GPIB bridge or a scope with an Ethernet option.
    ///
    /// ```no_run
    /// use instrument_kit::{Source, TekTds5xx, WaveformEncoding};
    ///
    /// let mut tek = TekTds5xx::open_tcpip("192.168.0.2", 8080)?;
    /// let waveform = tek.read_waveform(Source::Ch1, WaveformEncoding::Binary)?;
    /// println!("{} points", waveform.len());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_tcpip(host: &str, port: u16) -> Result<Self, InstrumentError> {
        Ok(Self::new(Instrument::open_tcpip(host, port)?))
    }

    pub fn open_serial(port: &str, baud_rate: u32) -> Result<Self, InstrumentError> {
        Ok(Self::new(Instrument::open_serial(port, baud_rate)?))
    }

    pub fn open_gpibusb(port: &str, address: u8) -> Result<Self, InstrumentError> {
        Ok(Self::new(Instrument::open_gpibusb(port, address)?))
    }

    pub fn with_hardcopy_wait(mut self, wait: Duration) -> Self {
        self.hardcopy_wait = wait;
        self
    }

    pub fn hardcopy_wait(&self) -> Duration {
        self.hardcopy_wait
    }

    pub fn set_hardcopy_wait(&mut self, wait: Duration) {
        self.hardcopy_wait = wait;
    }

    pub fn instrument(&mut self) -> &mut Instrument {
        &mut self.inst
    }

    pub fn into_inner(self) -> Instrument {
        self.inst
    }

    pub fn sendcmd(&mut self, command: &str) -> Result<(), InstrumentError> {
        self.inst.sendcmd(command)
    }

    pub fn query(&mut self, command: &str) -> Result<String, InstrumentError> {
        self.inst.query(command)
    }

    // ==================== Handles ====================

    /// Input channel `idx` (zero-based, CH1 is 0)
    pub fn channel(&mut self, idx: usize) -> Result<Tds5xxChannel<'_>, InstrumentError> {
        let source =
            Source::channel(idx).ok_or_else(|| out_of_range("Channel", idx, CHANNEL_COUNT))?;
        Ok(Tds5xxChannel::new(self, idx + 1, source))
    }

    /// Math trace `idx` (zero-based, MATH1 is 0)
    pub fn math(&mut self, idx: usize) -> Result<Tds5xxDataSource<'_>, InstrumentError> {
        let source = Source::math(idx).ok_or_else(|| out_of_range("Math", idx, MATH_COUNT))?;
        Ok(Tds5xxDataSource::new(self, source))
    }

    /// Reference memory `idx` (zero-based, REF1 is 0)
    pub fn reference(&mut self, idx: usize) -> Result<Tds5xxDataSource<'_>, InstrumentError> {
        let source = Source::reference(idx)
            .ok_or_else(|| out_of_range("Reference", idx, REFERENCE_COUNT))?;
        Ok(Tds5xxDataSource::new(self, source))
    }

    /// Automated measurement slot `idx` (zero-based, MEAS1 is 0)
    pub fn measurement(&mut self, idx: usize) -> Result<Tds5xxMeasurement<'_>, InstrumentError> {
        if idx >= MEASUREMENT_COUNT {
            return Err(out_of_range("Measurement", idx, MEASUREMENT_COUNT));
        }
        Ok(Tds5xxMeasurement::new(self, idx + 1))
    }

    // ==================== Data sources ====================

    /// Sources that currently display a trace.
    pub fn sources(&mut self) -> Result<Vec<Source>, InstrumentError> {
        let reply = self.query("SEL?")?;
        let fields: Vec<&str> = reply.split(';').collect();
        if fields.len() < Source::ALL.len() {
            return Err(InstrumentError::parse(
                "SEL?",
                reply.as_str(),
                format!(
                    "expected {} fields, got {}",
                    Source::ALL.len(),
                    fields.len()
                ),
            ));
        }

        let mut active = Vec::new();
        for (source, field) in Source::ALL.iter().zip(&fields) {
            let state: i64 = field.trim().parse().map_err(|e: std::num::ParseIntError| {
                InstrumentError::parse("SEL?", reply.as_str(), e.to_string())
            })?;
            if state != 0 {
                active.push(*source);
            }
        }
        Ok(active)
    }

    pub fn data_source(&mut self) -> Result<Source, InstrumentError> {
        self.inst.query_parsed("DAT:SOU?")
    }

    pub fn set_data_source(&mut self, source: Source) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("DAT:SOU {source}"))?;
        // the scope drops commands that arrive right after a source change
        std::thread::sleep(DATA_SOURCE_SETTLE);
        Ok(())
    }

    /// Bytes per point of binary waveform transfers
    pub fn data_width(&mut self) -> Result<usize, InstrumentError> {
        self.inst.query_parsed("DATA:WIDTH?")
    }

    pub fn set_data_width(&mut self, width: usize) -> Result<(), InstrumentError> {
        if !matches!(width, 1 | 2) {
            return Err(InstrumentError::InvalidArgument(format!(
                "Only one or two byte data width is supported, got {width}"
            )));
        }
        self.sendcmd(&format!("DATA:WIDTH {width}"))
    }

    // ==================== Horizontal and trigger ====================

    /// Seconds per division of the main timebase
    pub fn horizontal_scale(&mut self) -> Result<f64, InstrumentError> {
        self.inst.query_f64("HOR:MAI:SCA?")
    }

    pub fn set_horizontal_scale(&mut self, seconds: f64) -> Result<(), InstrumentError> {
        self.set_verified("HOR:MAI:SCA", "horizontal scale", seconds)
    }

    pub fn trigger_level(&mut self) -> Result<f64, InstrumentError> {
        self.inst.query_f64("TRIG:MAI:LEV?")
    }

    pub fn set_trigger_level(&mut self, level: f64) -> Result<(), InstrumentError> {
        self.set_verified("TRIG:MAI:LEV", "trigger level", level)
    }

    pub fn trigger_coupling(&mut self) -> Result<Coupling, InstrumentError> {
        self.inst.query_parsed("TRIG:MAI:EDGE:COUP?")
    }

    pub fn set_trigger_coupling(&mut self, coupling: Coupling) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("TRIG:MAI:EDGE:COUP {coupling}"))
    }

    pub fn trigger_slope(&mut self) -> Result<Edge, InstrumentError> {
        self.inst.query_parsed("TRIG:MAI:EDGE:SLO?")
    }

    pub fn set_trigger_slope(&mut self, slope: Edge) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("TRIG:MAI:EDGE:SLO {slope}"))
    }

    pub fn trigger_source(&mut self) -> Result<TriggerSource, InstrumentError> {
        self.inst.query_parsed("TRIG:MAI:EDGE:SOU?")
    }

    pub fn set_trigger_source(&mut self, source: TriggerSource) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("TRIG:MAI:EDGE:SOU {source}"))
    }

    // ==================== Display ====================

    /// Scope real-time clock
    pub fn clock(&mut self) -> Result<NaiveDateTime, InstrumentError> {
        let reply = self.query("DATE?;:TIME?")?;
        parse_clock(&reply).ok_or_else(|| {
            InstrumentError::parse("DATE?;:TIME?", reply.as_str(), "invalid date/time")
        })
    }

    pub fn set_clock(&mut self, time: NaiveDateTime) -> Result<(), InstrumentError> {
        info!("Setting scope clock to {}", time.format(CLOCK_FORMAT));
        self.sendcmd(&time.format("DATE \"%Y-%m-%d\";:TIME \"%H:%M:%S\"").to_string())
    }

    /// Whether the clock is shown on screen
    pub fn display_clock(&mut self) -> Result<bool, InstrumentError> {
        self.inst.query_bool("DISPLAY:CLOCK?")
    }

    pub fn set_display_clock(&mut self, visible: bool) -> Result<(), InstrumentError> {
        self.sendcmd(&format!("DISPLAY:CLOCK {}", u8::from(visible)))
    }

    /// Send `<header> <value>` in `d.dddE±XX` form and read the setting back.
    ///
    /// The read-back is compared against the value as sent, so requests with
    /// more than four significant digits are not reported as mismatches.
    pub(crate) fn set_verified(
        &mut self,
        header: &str,
        setting: &str,
        value: f64,
    ) -> Result<(), InstrumentError> {
        if !value.is_finite() {
            return Err(InstrumentError::InvalidArgument(format!(
                "{setting} must be finite, got {value}"
            )));
        }
        let text = format_sci(value, 3);
        let sent: f64 = text.parse().unwrap_or(value);

        self.sendcmd(&format!("{header} {text}"))?;
        let actual = self.inst.query_f64(&format!("{header}?"))?;
        if actual != sent {
            return Err(InstrumentError::VerifyMismatch {
                setting: setting.to_string(),
                requested: value,
                actual,
            });
        }
        debug!("{setting} set to {actual}");
        Ok(())
    }
}

fn out_of_range(what: &str, idx: usize, count: usize) -> InstrumentError {
    InstrumentError::InvalidArgument(format!(
        "{what} index {idx} out of range, the scope has {count}"
    ))
}

/// Parse a `"2024-01-31";"13:45:00"` reply.
fn parse_clock(reply: &str) -> Option<NaiveDateTime> {
    let (date, time) = reply.split_once(';')?;
    let date = date.trim().trim_matches('"');
    let time = time.trim().trim_start_matches(':').trim_matches('"');
    NaiveDateTime::parse_from_str(&format!("{date} {time}"), CLOCK_FORMAT).ok()
}

impl Oscilloscope for TekTds5xx {
    type Source = Source;

    fn channel_count(&self) -> usize {
        CHANNEL_COUNT
    }

    fn data_source(&mut self) -> Result<Source, InstrumentError> {
        TekTds5xx::data_source(self)
    }

    fn set_data_source(&mut self, source: Source) -> Result<(), InstrumentError> {
        TekTds5xx::set_data_source(self, source)
    }

    fn read_waveform(
        &mut self,
        source: Source,
        encoding: WaveformEncoding,
    ) -> Result<Waveform, InstrumentError> {
        TekTds5xx::read_waveform(self, source, encoding)
    }

    fn force_trigger(&mut self) -> Result<(), InstrumentError> {
        Err(InstrumentError::NotSupported(
            "The TDS 5xx cannot force a trigger over the bus".to_string(),
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::comm::{Loopback, LoopbackLog};
    use chrono::NaiveDate;

    pub(crate) fn tek(script: Loopback) -> (TekTds5xx, LoopbackLog) {
        let (inst, log) = Instrument::loopback(script).unwrap();
        (TekTds5xx::new(inst).with_hardcopy_wait(Duration::ZERO), log)
    }

    #[test]
    fn test_sources() {
        let (mut tek, _) = tek(Loopback::new().reply("SEL?", "1;0;1;0;0;1;0;0;0;0;1;1;0"));
        assert_eq!(
            tek.sources().unwrap(),
            vec![Source::Ch1, Source::Ch3, Source::Math2, Source::Ref4]
        );
    }

    #[test]
    fn test_sources_short_reply() {
        let (mut tek, _) = tek(Loopback::new().reply("SEL?", "1;0;1"));
        assert!(matches!(tek.sources(), Err(InstrumentError::Parse { .. })));
    }

    #[test]
    fn test_data_source_round_trip() {
        let (mut tek, log) = tek(
            Loopback::new()
                .reply("DAT:SOU?", "REF2")
                .expect("DAT:SOU MATH1"),
        );
        assert_eq!(tek.data_source().unwrap(), Source::Ref2);
        tek.set_data_source(Source::Math1).unwrap();
        assert_eq!(log.commands(), vec!["DAT:SOU?", "DAT:SOU MATH1"]);
    }

    #[test]
    fn test_data_width() {
        let (mut tek, log) = tek(
            Loopback::new()
                .reply("DATA:WIDTH?", "1")
                .expect("DATA:WIDTH 2"),
        );
        assert_eq!(tek.data_width().unwrap(), 1);
        tek.set_data_width(2).unwrap();
        assert!(matches!(
            tek.set_data_width(4),
            Err(InstrumentError::InvalidArgument(_))
        ));
        assert_eq!(log.commands(), vec!["DATA:WIDTH?", "DATA:WIDTH 2"]);
    }

    #[test]
    fn test_horizontal_scale_verified() {
        let (mut tek, log) = tek(
            Loopback::new()
                .expect("HOR:MAI:SCA 1.000E-03")
                .reply("HOR:MAI:SCA?", "1.0E-3"),
        );
        tek.set_horizontal_scale(0.001).unwrap();
        assert_eq!(log.commands(), vec!["HOR:MAI:SCA 1.000E-03", "HOR:MAI:SCA?"]);
    }

    #[test]
    fn test_horizontal_scale_mismatch() {
        let (mut tek, _) = tek(
            Loopback::new()
                .expect("HOR:MAI:SCA 3.000E-03")
                .reply("HOR:MAI:SCA?", "2.0E-3"),
        );
        match tek.set_horizontal_scale(0.003) {
            Err(InstrumentError::VerifyMismatch {
                requested, actual, ..
            }) => {
                assert_eq!(requested, 0.003);
                assert_eq!(actual, 0.002);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_trigger_level_compares_against_sent_value() {
        let (mut tek, _) = tek(
            Loopback::new()
                .expect("TRIG:MAI:LEV 1.235E+00")
                .reply("TRIG:MAI:LEV?", "1.235"),
        );
        tek.set_trigger_level(1.23456).unwrap();
    }

    #[test]
    fn test_trigger_settings() {
        let (mut tek, log) = tek(
            Loopback::new()
                .reply("TRIG:MAI:EDGE:COUP?", "DC")
                .expect("TRIG:MAI:EDGE:COUP AC")
                .reply("TRIG:MAI:EDGE:SLO?", "FALL")
                .expect("TRIG:MAI:EDGE:SLO RIS")
                .reply("TRIG:MAI:EDGE:SOU?", "LINE")
                .expect("TRIG:MAI:EDGE:SOU CH2")
                .reply("TRIG:MAI:LEV?", "0.5"),
        );
        assert_eq!(tek.trigger_coupling().unwrap(), Coupling::Dc);
        tek.set_trigger_coupling(Coupling::Ac).unwrap();
        assert_eq!(tek.trigger_slope().unwrap(), Edge::Falling);
        tek.set_trigger_slope(Edge::Rising).unwrap();
        assert_eq!(tek.trigger_source().unwrap(), TriggerSource::Line);
        tek.set_trigger_source(TriggerSource::Ch2).unwrap();
        assert_eq!(tek.trigger_level().unwrap(), 0.5);
        assert_eq!(log.commands().len(), 7);
    }

    #[test]
    fn test_clock() {
        let time = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(14, 5, 30)
            .unwrap();
        let (mut tek, log) = tek(
            Loopback::new()
                .reply("DATE?;:TIME?", "\"2024-03-09\";\"14:05:30\"")
                .expect("DATE \"2024-03-09\";:TIME \"14:05:30\""),
        );
        assert_eq!(tek.clock().unwrap(), time);
        tek.set_clock(time).unwrap();
        assert_eq!(log.commands()[1], "DATE \"2024-03-09\";:TIME \"14:05:30\"");
    }

    #[test]
    fn test_clock_bad_reply() {
        let (mut tek, _) = tek(Loopback::new().reply("DATE?;:TIME?", "garbage"));
        assert!(matches!(tek.clock(), Err(InstrumentError::Parse { .. })));
    }

    #[test]
    fn test_display_clock() {
        let (mut tek, log) = tek(
            Loopback::new()
                .reply("DISPLAY:CLOCK?", "1")
                .expect("DISPLAY:CLOCK 0"),
        );
        assert!(tek.display_clock().unwrap());
        tek.set_display_clock(false).unwrap();
        assert_eq!(log.commands(), vec!["DISPLAY:CLOCK?", "DISPLAY:CLOCK 0"]);
    }

    #[test]
    fn test_handle_indices() {
        let (mut tek, _) = tek(Loopback::new());
        assert!(tek.channel(3).is_ok());
        assert!(matches!(
            tek.channel(4),
            Err(InstrumentError::InvalidArgument(_))
        ));
        assert!(tek.math(2).is_ok());
        assert!(tek.math(3).is_err());
        assert!(tek.reference(3).is_ok());
        assert!(tek.reference(4).is_err());
        assert!(tek.measurement(3).is_ok());
        assert!(tek.measurement(4).is_err());
    }

    #[test]
    fn test_force_trigger_not_supported() {
        let (mut tek, _) = tek(Loopback::new());
        assert!(matches!(
            Oscilloscope::force_trigger(&mut tek),
            Err(InstrumentError::NotSupported(_))
        ));
        assert_eq!(Oscilloscope::channel_count(&tek), 4);
    }
}
