//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while reading or writing protocol lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A line grew past the maximum length without a terminator.
    #[error("line too long: {length} bytes without terminator (max: {max})")]
    LineTooLong { length: usize, max: usize },

    /// IO error during read/write.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation timed out.
    #[error("timeout during {operation}")]
    Timeout { operation: String },
}

impl ProtocolError {
    /// Creates a timeout error for the named operation.
    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }
}
