use chrono::{DateTime, Utc};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Settings that travel over the wire as short SCPI mnemonics.
pub trait Mnemonic: Sized + Copy + 'static {
    /// Every value, in declaration order.
    const ALL: &'static [Self];

    fn mnemonic(&self) -> &'static str;

    /// Parse an instrument reply.
    ///
    /// Replies are matched case-insensitively with surrounding whitespace and
    /// quotes removed. Besides the short mnemonic the long form an instrument
    /// echoes in verbose mode is accepted (`RISE` for `RIS`, `FORWARDS` for
    /// `FORW`): the longest mnemonic the reply starts with wins.
    fn from_reply(reply: &str) -> Option<Self> {
        let normalized = reply.trim().trim_matches('"').trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return None;
        }

        if let Some(exact) = Self::ALL.iter().find(|v| v.mnemonic() == normalized) {
            return Some(*exact);
        }

        Self::ALL
            .iter()
            .filter(|v| normalized.starts_with(v.mnemonic()))
            .max_by_key(|v| v.mnemonic().len())
            .copied()
    }
}

macro_rules! mnemonic_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $( $(#[$vmeta:meta])* $variant:ident => $code:literal ),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl Mnemonic for $name {
            const ALL: &'static [Self] = &[ $( $name::$variant ),+ ];

            fn mnemonic(&self) -> &'static str {
                match self {
                    $( $name::$variant => $code ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.mnemonic())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                <$name as Mnemonic>::from_reply(s).ok_or_else(|| {
                    let valid: Vec<&str> = Self::ALL.iter().map(|v| v.mnemonic()).collect();
                    format!(
                        "'{}' is not a valid {} (expected one of {})",
                        s,
                        stringify!($name),
                        valid.join(", ")
                    )
                })
            }
        }
    };
}

mnemonic_enum! {
    /// Input and trigger coupling
    Coupling {
        Ac => "AC",
        Dc => "DC",
        Ground => "GND",
    }
}

mnemonic_enum! {
    /// Channel bandwidth limit
    Bandwidth {
        /// 20 MHz
        Twenty => "TWE",
        /// 100 MHz
        OneHundred => "HUN",
        /// 200 MHz
        TwoHundred => "TWO",
        Full => "FUL",
    }
}

mnemonic_enum! {
    /// Input impedance
    Impedance {
        /// 50 Ω
        Fifty => "FIF",
        /// 1 MΩ
        OneMeg => "MEG",
    }
}

mnemonic_enum! {
    /// Signal edge, used for trigger slope and delay measurements
    Edge {
        Rising => "RIS",
        Falling => "FALL",
    }
}

mnemonic_enum! {
    /// Main trigger sources. AUX is not fitted on the TDS 520A/540A.
    TriggerSource {
        Ch1 => "CH1",
        Ch2 => "CH2",
        Ch3 => "CH3",
        Ch4 => "CH4",
        Aux => "AUX",
        Line => "LINE",
    }
}

mnemonic_enum! {
    /// Waveform data sources: input channels, math traces and stored references
    Source {
        Ch1 => "CH1",
        Ch2 => "CH2",
        Ch3 => "CH3",
        Ch4 => "CH4",
        Math1 => "MATH1",
        Math2 => "MATH2",
        Math3 => "MATH3",
        Ref1 => "REF1",
        Ref2 => "REF2",
        Ref3 => "REF3",
        Ref4 => "REF4",
    }
}

mnemonic_enum! {
    /// Automated measurement types
    MeasurementType {
        Amplitude => "AMP",
        Area => "ARE",
        Burst => "BUR",
        CycleArea => "CAR",
        CycleMean => "CME",
        CycleRms => "CRM",
        Delay => "DEL",
        Fall => "FALL",
        Frequency => "FREQ",
        High => "HIGH",
        Low => "LOW",
        Maximum => "MAX",
        Mean => "MEAN",
        Minimum => "MINI",
        NegativeDuty => "NDU",
        NegativeOvershoot => "NOV",
        NegativeWidth => "NWI",
        PositiveDuty => "PDU",
        Period => "PERI",
        Phase => "PHA",
        PeakToPeak => "PK2",
        PositiveOvershoot => "POV",
        PositiveWidth => "PWI",
        Rise => "RIS",
        Rms => "RMS",
    }
}

mnemonic_enum! {
    /// Search direction for delay measurements
    Direction {
        Backwards => "BAC",
        Forwards => "FORW",
    }
}

impl Source {
    /// Input channel by zero-based index
    pub fn channel(idx: usize) -> Option<Self> {
        [Source::Ch1, Source::Ch2, Source::Ch3, Source::Ch4]
            .get(idx)
            .copied()
    }

    /// Math trace by zero-based index
    pub fn math(idx: usize) -> Option<Self> {
        [Source::Math1, Source::Math2, Source::Math3].get(idx).copied()
    }

    /// Reference trace by zero-based index
    pub fn reference(idx: usize) -> Option<Self> {
        [Source::Ref1, Source::Ref2, Source::Ref3, Source::Ref4]
            .get(idx)
            .copied()
    }

    /// Zero-based index if this is an input channel
    pub fn channel_index(&self) -> Option<usize> {
        match self {
            Source::Ch1 => Some(0),
            Source::Ch2 => Some(1),
            Source::Ch3 => Some(2),
            Source::Ch4 => Some(3),
            _ => None,
        }
    }
}

/// Output regulation mode of a power supply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerSupplyMode {
    /// Constant voltage
    Voltage,
    /// Constant current
    Current,
}

/// Waveform transfer encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformEncoding {
    Ascii,
    #[default]
    Binary,
}

/// Voltage in volts
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Voltage(pub f64);

impl Voltage {
    pub fn volts(value: f64) -> Self {
        Self(value)
    }

    pub fn millivolts(value: f64) -> Self {
        Self(value * 1e-3)
    }
}

impl From<f64> for Voltage {
    fn from(volts: f64) -> Self {
        Voltage(volts)
    }
}

impl From<Voltage> for f64 {
    fn from(voltage: Voltage) -> Self {
        voltage.0
    }
}

/// Current in amperes
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Current(pub f64);

impl Current {
    pub fn amps(value: f64) -> Self {
        Self(value)
    }

    pub fn milliamps(value: f64) -> Self {
        Self(value * 1e-3)
    }
}

impl From<f64> for Current {
    fn from(amps: f64) -> Self {
        Current(amps)
    }
}

impl From<Current> for f64 {
    fn from(current: Current) -> Self {
        current.0
    }
}

/// A scaled waveform read from an oscilloscope.
///
/// `x` is the time axis in seconds starting at zero, `y` the vertical values in
/// the source's units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Waveform {
    pub source: Source,
    pub x: Array1<f64>,
    pub y: Array1<f64>,
}

impl Waveform {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    /// Sample spacing, if there are at least two points
    pub fn dt(&self) -> Option<f64> {
        (self.x.len() >= 2).then(|| self.x[1] - self.x[0])
    }

    /// (min, max) of the vertical values
    pub fn y_range(&self) -> Option<(f64, f64)> {
        if self.y.is_empty() {
            return None;
        }
        let min = self.y.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some((min, max))
    }
}

/// One reading of an automated scope measurement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementReading {
    pub id: usize,
    pub measurement_type: MeasurementType,
    pub units: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_mnemonics_parse() {
        assert_eq!(Coupling::from_reply("GND"), Some(Coupling::Ground));
        assert_eq!(Source::from_reply("MATH2"), Some(Source::Math2));
        assert_eq!(MeasurementType::from_reply("FALL"), Some(MeasurementType::Fall));
        assert_eq!(Edge::from_reply("FALL"), Some(Edge::Falling));
    }

    #[test]
    fn test_replies_are_normalized() {
        assert_eq!(Source::from_reply(" ch3\n"), Some(Source::Ch3));
        assert_eq!(Impedance::from_reply("\"MEG\""), Some(Impedance::OneMeg));
    }

    #[test]
    fn test_long_forms_parse() {
        assert_eq!(Edge::from_reply("RISE"), Some(Edge::Rising));
        assert_eq!(Direction::from_reply("FORWARDS"), Some(Direction::Forwards));
        assert_eq!(Direction::from_reply("BACKWARDS"), Some(Direction::Backwards));
        assert_eq!(Bandwidth::from_reply("FULL"), Some(Bandwidth::Full));
        assert_eq!(Bandwidth::from_reply("TWENTY"), Some(Bandwidth::Twenty));
        assert_eq!(
            MeasurementType::from_reply("FREQUENCY"),
            Some(MeasurementType::Frequency)
        );
        assert_eq!(
            MeasurementType::from_reply("MINIMUM"),
            Some(MeasurementType::Minimum)
        );
        assert_eq!(
            MeasurementType::from_reply("MAXIMUM"),
            Some(MeasurementType::Maximum)
        );
        assert_eq!(MeasurementType::from_reply("PK2PK"), Some(MeasurementType::PeakToPeak));
    }

    #[test]
    fn test_unknown_reply_is_rejected() {
        assert_eq!(Coupling::from_reply("XYZ"), None);
        assert_eq!(Source::from_reply(""), None);
        assert!("CH9".parse::<TriggerSource>().is_err());
    }

    #[test]
    fn test_display_is_mnemonic() {
        assert_eq!(Bandwidth::TwoHundred.to_string(), "TWO");
        assert_eq!(MeasurementType::PeakToPeak.to_string(), "PK2");
        assert_eq!(TriggerSource::Line.to_string(), "LINE");
    }

    #[test]
    fn test_source_indices() {
        assert_eq!(Source::channel(0), Some(Source::Ch1));
        assert_eq!(Source::channel(4), None);
        assert_eq!(Source::math(2), Some(Source::Math3));
        assert_eq!(Source::math(3), None);
        assert_eq!(Source::reference(3), Some(Source::Ref4));
        assert_eq!(Source::Ch2.channel_index(), Some(1));
        assert_eq!(Source::Ref1.channel_index(), None);
    }

    #[test]
    fn test_waveform_helpers() {
        let wf = Waveform {
            source: Source::Ch1,
            x: Array1::from(vec![0.0, 0.5, 1.0]),
            y: Array1::from(vec![-1.0, 2.0, 0.5]),
        };
        assert_eq!(wf.len(), 3);
        assert_eq!(wf.dt(), Some(0.5));
        assert_eq!(wf.y_range(), Some((-1.0, 2.0)));
    }

    #[test]
    fn test_unit_constructors() {
        assert!((Voltage::millivolts(250.0).0 - 0.25).abs() < 1e-12);
        assert!((Current::milliamps(100.0).0 - 0.1).abs() < 1e-12);
        assert_eq!(f64::from(Voltage::from(3.0)), 3.0);
    }
}
