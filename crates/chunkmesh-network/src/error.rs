//! Overlay error types

use thiserror::Error;

use crate::peer::PeerState;

/// Overlay-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Peer not found: {0}")]
    NotFound(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Failed to connect to {address}: {reason}")]
    ConnectFailed { address: String, reason: String },

    #[error("Timed out connecting to {0}")]
    Timeout(String),

    #[error("Overlay is not running")]
    NotRunning,

    #[error("Overlay is already running")]
    AlreadyRunning,

    #[error("Peer {peer} is {state}")]
    PeerNotActive { peer: String, state: PeerState },

    #[error("Invalid peer state transition: {from} -> {to}")]
    InvalidTransition { from: PeerState, to: PeerState },

    #[error("Protocol error: {0}")]
    Protocol(#[from] chunkmesh_protocol::ProtocolError),

    #[error("Frame error: {0}")]
    Frame(#[from] chunkmesh_protocol::FrameError),

    #[error("Registry error: {0}")]
    Registry(#[from] chunkmesh_registry::RegistryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for overlay operations
pub type Result<T> = std::result::Result<T, NetworkError>;
