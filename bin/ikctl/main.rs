mod psu;
mod scope;

use clap::{Parser, Subcommand};
use env_logger::Env;
use instrument_kit::config::{load_config_or_default, AppConfig};
use instrument_kit::instrument::GPIBUSB_BAUD_RATE;
use instrument_kit::{Connection, Instrument, InstrumentError};
use log::{error, info, LevelFilter};
use std::path::PathBuf;

use crate::psu::PsuCommand;
use crate::scope::ScopeCommand;

/// Command line control for lab instruments
#[derive(Parser, Debug)]
#[command(name = "ikctl")]
#[command(about = "Talk to Tektronix TDS 5xx scopes and Yokogawa 7651 sources", long_about = None)]
struct Args {
    /// Configuration file (defaults to instrument-kit.toml if present)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,

    /// Connect over TCP, e.g. 192.168.0.2:4000
    #[arg(long, value_name = "HOST:PORT", global = true, conflicts_with = "serial")]
    tcp: Option<String>,

    /// Serial port, or the port of a GPIBUSB adapter when --gpib is given
    #[arg(long, value_name = "PORT", global = true)]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// GPIB address behind a GPIBUSB adapter
    #[arg(long, value_name = "ADDR", global = true)]
    gpib: Option<u8>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the instrument identity (*IDN?)
    Idn,
    /// Send a query and print the reply
    Query { command: String },
    /// Send a command without reading a reply
    Send { command: String },
    /// Tektronix TDS 5xx oscilloscope
    Scope {
        #[command(subcommand)]
        command: ScopeCommand,
    },
    /// Yokogawa 7651 DC source
    Psu {
        #[command(subcommand)]
        command: PsuCommand,
    },
}

fn main() {
    let args = Args::parse();
    let config = load_config_or_default(args.config.as_deref());

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.log_level.clone());
    initialize_logging(&log_level);

    if let Err(e) = run(args, &config) {
        error!("{e}");
        std::process::exit(1);
    }
}

fn run(args: Args, config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let connection = resolve_connection(&args, config)?;
    info!("Connecting to {:?}", connection);
    let mut inst = Instrument::builder()
        .connection(connection)
        .timeout(config.connection.timeout())
        .terminator(&config.connection.terminator)
        .build()?;

    match args.command {
        Command::Idn => println!("{}", inst.identify()?),
        Command::Query { command } => println!("{}", inst.query(&command)?),
        Command::Send { command } => inst.sendcmd(&command)?,
        Command::Scope { command } => scope::run(command, inst, config)?,
        Command::Psu { command } => psu::run(command, inst)?,
    }
    Ok(())
}

/// Command line connection options take precedence over the configuration.
fn resolve_connection(args: &Args, config: &AppConfig) -> Result<Connection, InstrumentError> {
    if let Some(target) = &args.tcp {
        let (host, port) = target.rsplit_once(':').ok_or_else(|| {
            InstrumentError::InvalidArgument(format!("Expected HOST:PORT, got {target}"))
        })?;
        let port = port
            .parse()
            .map_err(|_| InstrumentError::InvalidArgument(format!("Invalid port in {target}")))?;
        return Ok(Connection::Tcp {
            host: host.to_string(),
            port,
        });
    }

    let from_config = config.connection.connection();
    if args.serial.is_none() && args.gpib.is_none() && args.baud.is_none() {
        return Ok(from_config);
    }

    let port = args
        .serial
        .clone()
        .unwrap_or_else(|| config.connection.serial_port.clone());
    Ok(match (args.gpib, from_config) {
        (Some(address), _) => Connection::GpibUsb {
            port,
            baud_rate: args.baud.unwrap_or(GPIBUSB_BAUD_RATE),
            address,
        },
        (None, Connection::GpibUsb { baud_rate, address, .. }) => Connection::GpibUsb {
            port,
            baud_rate: args.baud.unwrap_or(baud_rate),
            address,
        },
        (None, _) => Connection::Serial {
            port,
            baud_rate: args.baud.unwrap_or(config.connection.baud_rate),
        },
    })
}

/// Initialize logging with configurable level
fn initialize_logging(log_level: &str) {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => {
            eprintln!("Warning: Invalid log level '{}', using 'info'", log_level);
            LevelFilter::Info
        }
    };

    env_logger::Builder::from_env(Env::default())
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_tcp_override() {
        let args = parse(&["ikctl", "--tcp", "10.0.0.2:4000", "idn"]);
        assert_eq!(
            resolve_connection(&args, &AppConfig::default()).unwrap(),
            Connection::Tcp {
                host: "10.0.0.2".to_string(),
                port: 4000
            }
        );
    }

    #[test]
    fn test_gpib_override() {
        let args = parse(&["ikctl", "psu", "output", "on", "--serial", "/dev/ttyUSB1", "--gpib", "7"]);
        assert_eq!(
            resolve_connection(&args, &AppConfig::default()).unwrap(),
            Connection::GpibUsb {
                port: "/dev/ttyUSB1".to_string(),
                baud_rate: GPIBUSB_BAUD_RATE,
                address: 7
            }
        );
    }

    #[test]
    fn test_config_used_without_overrides() {
        let args = parse(&["ikctl", "scope", "sources"]);
        let config = AppConfig::default();
        assert_eq!(
            resolve_connection(&args, &config).unwrap(),
            config.connection.connection()
        );
    }

    #[test]
    fn test_bad_tcp_target() {
        let args = parse(&["ikctl", "--tcp", "nohost", "idn"]);
        assert!(resolve_connection(&args, &AppConfig::default()).is_err());
    }
}
