//! Error type for fallible controller operations.
//!
//! Acquisition stalls are not errors: they are latched as
//! [`crate::pipeline::FaultKind`] in the sequencer and reported through the
//! alarm output. [`Error`] covers configuration, save-state I/O and decoding.

use std::fmt;

use crate::config::ConfigError;

#[derive(Debug)]
pub enum Error {
    /// Rejected configuration
    Config(ConfigError),
    /// Filesystem error while reading or writing a save state
    Io(std::io::Error),
    /// Save state header or payload is malformed
    StateFormat(String),
    /// Save state was captured with a different buffer geometry
    StateMismatch {
        field: &'static str,
        saved: u64,
        current: u64,
    },
    /// bincode encode/decode failure
    Codec(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(e) => write!(f, "invalid configuration: {}", e),
            Error::Io(e) => write!(f, "save state I/O: {}", e),
            Error::StateFormat(msg) => write!(f, "invalid save state: {}", msg),
            Error::StateMismatch { field, saved, current } => write!(
                f,
                "save state mismatch: {} saved={} current={}",
                field, saved, current
            ),
            Error::Codec(msg) => write!(f, "save state codec: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => Some(e),
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Codec(e.to_string())
    }
}
