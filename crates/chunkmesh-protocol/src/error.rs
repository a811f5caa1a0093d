//! Error types for protocol operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors scoped to a single message. None of these are fatal to a connection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u64),

    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),
}

/// Errors raised while moving frames over a byte stream.
///
/// Every variant ends the connection it was raised on.
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    /// Map a read error, folding short reads into a clean close
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::ConnectionClosed
        } else {
            FrameError::Io(err)
        }
    }

    /// True when the remote side simply went away
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, FrameError::ConnectionClosed)
    }
}
