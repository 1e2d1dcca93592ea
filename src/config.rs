use crate::instrument::{Connection, DEFAULT_TERMINATOR, GPIBUSB_BAUD_RATE};
use crate::types::WaveformEncoding;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "instrument-kit.toml";
pub const ENV_PREFIX: &str = "INSTRUMENT_KIT";

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct AppConfig {
    pub connection: ConnectionConfig,
    pub logging: LoggingConfig,
    pub scope: ScopeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Tcp,
    Serial,
    Gpibusb,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConnectionConfig {
    pub transport: TransportKind,
    pub host: String,
    pub port: u16,
    pub serial_port: String,
    pub baud_rate: u32,
    pub gpib_address: u8,
    pub timeout_ms: u64,
    pub terminator: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub log_level: String,
    /// Where measurement monitors write their readings
    pub data_path: PathBuf,
    pub buffer_size: usize,
    /// Convert the JSONL data file into a JSON array when done
    pub final_json: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScopeConfig {
    pub hardcopy_wait_ms: u64,
    pub default_encoding: WaveformEncoding,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::Tcp,
            host: "127.0.0.1".to_string(),
            port: 1234,
            serial_port: "/dev/ttyUSB0".to_string(),
            baud_rate: GPIBUSB_BAUD_RATE,
            gpib_address: 1,
            timeout_ms: 3000,
            terminator: DEFAULT_TERMINATOR.to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_path: PathBuf::from("./data/measurements.jsonl"),
            buffer_size: 16,
            final_json: false,
        }
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            hardcopy_wait_ms: 1000,
            default_encoding: WaveformEncoding::Binary,
        }
    }
}

impl ConnectionConfig {
    /// The connection described by the selected transport
    pub fn connection(&self) -> Connection {
        match self.transport {
            TransportKind::Tcp => Connection::Tcp {
                host: self.host.clone(),
                port: self.port,
            },
            TransportKind::Serial => Connection::Serial {
                port: self.serial_port.clone(),
                baud_rate: self.baud_rate,
            },
            TransportKind::Gpibusb => Connection::GpibUsb {
                port: self.serial_port.clone(),
                baud_rate: self.baud_rate,
                address: self.gpib_address,
            },
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl ScopeConfig {
    pub fn hardcopy_wait(&self) -> Duration {
        Duration::from_millis(self.hardcopy_wait_ms)
    }
}

/// Load configuration with layered fallbacks: defaults, then the given file
/// (or `instrument-kit.toml` if present), then `INSTRUMENT_KIT__*` variables.
pub fn load_config(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(ConfigError::Message(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path));
    } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
        builder = builder.add_source(File::with_name(DEFAULT_CONFIG_FILE));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize::<AppConfig>()
}

pub fn load_config_or_default(config_path: Option<&Path>) -> AppConfig {
    match load_config(config_path) {
        Ok(config) => {
            log::info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            log::warn!("Failed to load config ({}), using defaults", e);
            AppConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.connection.transport, TransportKind::Tcp);
        assert_eq!(config.connection.timeout(), Duration::from_secs(3));
        assert_eq!(config.scope.hardcopy_wait(), Duration::from_secs(1));
        assert_eq!(config.scope.default_encoding, WaveformEncoding::Binary);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[connection]
transport = "gpibusb"
serial_port = "/dev/ttyACM3"
gpib_address = 10

[scope]
default_encoding = "ascii"
"#
        )
        .unwrap();

        let config = load_config(Some(file.path())).unwrap();
        assert_eq!(
            config.connection.connection(),
            Connection::GpibUsb {
                port: "/dev/ttyACM3".to_string(),
                baud_rate: GPIBUSB_BAUD_RATE,
                address: 10,
            }
        );
        assert_eq!(config.scope.default_encoding, WaveformEncoding::Ascii);
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[connection]
host = "10.0.0.9"

[logging]
buffer_size = 64

[scope]
hardcopy_wait_ms = 500
"#
        )
        .unwrap();

        // keys not asserted by the other tests, which may run concurrently
        let vars = [
            ("INSTRUMENT_KIT__CONNECTION__HOST", "scope.lab"),
            ("INSTRUMENT_KIT__SCOPE__HARDCOPY_WAIT_MS", "0"),
        ];
        for (key, value) in vars {
            unsafe { std::env::set_var(key, value) };
        }
        let config = load_config(Some(file.path()));
        for (key, _) in vars {
            unsafe { std::env::remove_var(key) };
        }

        let config = config.unwrap();
        assert_eq!(config.connection.host, "scope.lab");
        assert_eq!(config.scope.hardcopy_wait(), Duration::ZERO);
        assert_eq!(config.logging.buffer_size, 64);
        assert_eq!(config.connection.timeout_ms, 3000);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(&missing)).is_err());

        let config = load_config_or_default(Some(&missing));
        assert_eq!(config.connection.port, 1234);
    }

    #[test]
    fn test_tcp_connection() {
        let connection = ConnectionConfig {
            host: "10.0.0.5".to_string(),
            port: 4000,
            ..ConnectionConfig::default()
        };
        assert_eq!(
            connection.connection(),
            Connection::Tcp {
                host: "10.0.0.5".to_string(),
                port: 4000
            }
        );
    }
}
