pub mod comm;
pub mod config;
pub mod error;
pub mod instrument;
pub mod interface;
pub mod logger;
pub mod plotting;
pub mod tektronix;
pub mod types;
pub mod utils;
pub mod yokogawa;

pub use comm::{Communicator, GpibUsbCommunicator, Loopback, LoopbackLog, StreamCommunicator};
pub use crate::config::{load_config, load_config_or_default, AppConfig};
pub use error::InstrumentError;
pub use instrument::{Connection, Identity, Instrument, InstrumentBuilder};
pub use interface::{Oscilloscope, PowerSupply};
pub use logger::DataLogger;
pub use plotting::{plot_values, plot_waveform};
pub use tektronix::{Hardcopy, TekTds5xx, Tds5xxChannel, Tds5xxDataSource, Tds5xxMeasurement};
pub use types::{
    Bandwidth, Coupling, Current, Direction, Edge, Impedance, MeasurementReading,
    MeasurementType, Mnemonic, PowerSupplyMode, Source, TriggerSource, Voltage, Waveform,
    WaveformEncoding,
};
pub use utils::{poll_until, PollError};
pub use yokogawa::{Yokogawa7651, Yokogawa7651Channel};
