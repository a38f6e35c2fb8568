use std::{error::Error as StdError, fmt::Display, io};

use wirekite_protocol::error::ReadError;

/// Errors reported by device operations.
#[derive(Debug)]
pub enum Error {
    /// The device sent a malformed or unexpected message. The connection is closed.
    Protocol(ReadError),
    /// The device rejected a configuration request with the given result code.
    Configuration { code: u8 },
    /// The port id does not refer to a configured port of the required kind.
    InvalidPort(u16),
    /// The arguments of the call are inconsistent.
    InvalidArgument(String),
    /// Reading from or writing to the USB pipes failed. The connection is closed.
    Transport(io::Error),
    /// The request can never be admitted because the flow control budget is too small.
    ResourceExhausted { required: usize, budget: usize },
    /// The wait was released by a configuration reset.
    Cancelled,
    /// The device has been closed or disconnected.
    Closed,
    /// The device answered with a message of the wrong kind.
    UnexpectedResponse,
}

impl From<ReadError> for Error {
    fn from(value: ReadError) -> Self {
        match value {
            ReadError::IoError(error) => Error::Transport(error),
            other => Error::Protocol(other),
        }
    }
}

impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self {
        Error::Transport(value)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Protocol(error) => write!(f, "Protocol error: {}", error),
            Error::Configuration { code } => write!(f, "Configuration failed with code {}", code),
            Error::InvalidPort(port) => write!(f, "Invalid port ID {}", port),
            Error::InvalidArgument(msg) => write!(f, "{}", msg),
            Error::Transport(error) => write!(f, "Transport error: {}", error),
            Error::ResourceExhausted { required, budget } => write!(
                f,
                "Request requires {} bytes of device memory, but only {} are configured",
                required, budget
            ),
            Error::Cancelled => write!(f, "Request cancelled by configuration reset"),
            Error::Closed => write!(f, "Device has been closed or disconnected"),
            Error::UnexpectedResponse => write!(f, "Unexpected response from device"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Protocol(error) => Some(error),
            Error::Transport(error) => Some(error),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
