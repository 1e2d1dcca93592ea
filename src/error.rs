use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstrumentError {
    #[error("IO error ({context}): {source}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },
    #[error("Communication timeout")]
    Timeout,
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Could not parse reply {response:?} to {command:?}: {reason}")]
    Parse {
        command: String,
        response: String,
        reason: String,
    },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Not supported by this instrument: {0}")]
    NotSupported(String),
    #[error("Tried to set {setting} to {requested} but got {actual} instead")]
    VerifyMismatch {
        setting: String,
        requested: f64,
        actual: f64,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl InstrumentError {
    /// Wrap an I/O error, turning socket/serial timeouts into [`InstrumentError::Timeout`].
    pub fn io(source: std::io::Error, context: impl Into<String>) -> Self {
        match source.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                InstrumentError::Timeout
            }
            _ => InstrumentError::Io {
                source,
                context: context.into(),
            },
        }
    }

    pub fn parse(
        command: impl Into<String>,
        response: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        InstrumentError::Parse {
            command: command.into(),
            response: response.into(),
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for InstrumentError {
    fn from(source: std::io::Error) -> Self {
        InstrumentError::io(source, "instrument I/O")
    }
}
