use clap::{Subcommand, ValueEnum};
use instrument_kit::{Instrument, InstrumentError, Yokogawa7651};
use log::info;

#[derive(Subcommand, Debug)]
pub enum PsuCommand {
    /// Constant voltage output, in volts
    Voltage {
        #[arg(allow_negative_numbers = true)]
        volts: f64,
    },
    /// Constant current output, in amps
    Current {
        #[arg(allow_negative_numbers = true)]
        amps: f64,
    },
    /// Enable or disable the output
    Output { state: OnOff },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnOff {
    On,
    Off,
}

pub fn run(command: PsuCommand, inst: Instrument) -> Result<(), InstrumentError> {
    let mut yoko = Yokogawa7651::new(inst);
    match command {
        PsuCommand::Voltage { volts } => {
            yoko.set_voltage(volts)?;
            info!("Output set to {volts} V");
        }
        PsuCommand::Current { amps } => {
            yoko.set_current(amps)?;
            info!("Output set to {amps} A");
        }
        PsuCommand::Output { state } => {
            yoko.set_output(state == OnOff::On)?;
            info!("Output {}", if state == OnOff::On { "on" } else { "off" });
        }
    }
    Ok(())
}
