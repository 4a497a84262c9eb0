//! Error types for NM3 protocol operations.

use thiserror::Error;

/// Result type alias for NM3 operations.
pub type Result<T> = std::result::Result<T, ModemError>;

/// Error types for NM3 modem communication.
#[derive(Error, Debug)]
pub enum ModemError {
    /// Serial port communication error
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Nothing received before the read deadline
    #[error("No response from modem")]
    NoResponse,

    /// First phase of a two-phase exchange timed out
    #[error("Timed out waiting for acknowledgment")]
    AckTimeout,

    /// Second phase of a two-phase exchange timed out
    #[error("Timed out waiting for response")]
    ResponseTimeout,

    /// Frame had a known prefix but its fields did not parse
    #[error("Protocol error: {}", String::from_utf8_lossy(.raw))]
    ProtocolError {
        /// Frame as received, terminator stripped
        raw: Vec<u8>,
    },

    /// Frame is not a valid answer to the command in flight
    #[error("Unexpected response: {}", String::from_utf8_lossy(.raw))]
    UnexpectedResponse {
        /// Frame as received, terminator stripped
        raw: Vec<u8>,
    },

    /// Command fields violate a width or length limit
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A command was issued while another one was still outstanding
    #[error("Modem busy with an outstanding command")]
    Busy,

    /// The task owning the modem has stopped
    #[error("Modem worker is not running")]
    WorkerStopped,

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for ModemError {
    fn from(err: toml::de::Error) -> Self {
        ModemError::Config(err.to_string())
    }
}
