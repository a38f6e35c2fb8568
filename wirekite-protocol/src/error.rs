use std::{
    error::Error,
    fmt::Display,
    io::{self},
};

use crate::protocol::MessageType;

/// Errors that may occur when decoding a message or reassembling the byte stream.
/// Apart from `IoError`, all of them indicate a malformed stream.
#[derive(Debug)]
pub enum ReadError {
    IoError(io::Error),
    /// The buffer holds fewer bytes than the message declares.
    Truncated { expected: usize, got: usize },
    /// The declared size is too small for the header or the message type.
    InvalidSize { message_type: Option<MessageType>, size: usize },
    UnknownMessageType(u8),
    UnknownAction { message_type: MessageType, action: u8 },
    UnknownEvent(u8),
}

impl From<io::Error> for ReadError {
    fn from(value: io::Error) -> Self {
        ReadError::IoError(value)
    }
}

impl Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReadError::IoError(error) => write!(f, "{}", error),
            ReadError::Truncated { expected, got } => {
                write!(f, "Message truncated: expected {} bytes, got {}", expected, got)
            }
            ReadError::InvalidSize {
                message_type: Some(message_type),
                size,
            } => write!(f, "Invalid size {} for {} message", size, message_type),
            ReadError::InvalidSize {
                message_type: None,
                size,
            } => write!(f, "Invalid message size {}", size),
            ReadError::UnknownMessageType(t) => write!(f, "Invalid message type ({}) received", t),
            ReadError::UnknownAction {
                message_type,
                action,
            } => write!(f, "Unknown action {} in {} message", action, message_type),
            ReadError::UnknownEvent(event) => write!(f, "Unknown port event code {}", event),
        }
    }
}

impl Error for ReadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ReadError::IoError(error) => Some(error),
            _ => None,
        }
    }
}
