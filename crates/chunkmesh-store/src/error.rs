//! Chunk store error types

use thiserror::Error;

/// Chunk store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Wrap an IO error, turning a missing file into `NotFound`
    pub(crate) fn io_for(what: impl Into<String>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(what.into())
        } else {
            StoreError::Io(err)
        }
    }
}

/// Result type for chunk store operations
pub type Result<T> = std::result::Result<T, StoreError>;
