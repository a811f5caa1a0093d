//! Registry error types

use thiserror::Error;

/// Registry-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Node not found: {0}")]
    NotFound(String),

    #[error("Address {address} already registered to node {owner}")]
    Conflict { address: String, owner: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
