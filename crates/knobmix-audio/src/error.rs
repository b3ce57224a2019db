//! Error types for audio backend operations.

use thiserror::Error;

/// An error returned by an [`AudioBackend`](crate::AudioBackend).
#[derive(Debug, Error)]
pub enum AudioError {
    /// A volume outside `[0, 1]` was requested.
    #[error("volume {volume} is outside [0, 1]")]
    VolumeOutOfRange { volume: f32 },

    /// No running session matches the endpoint name.
    #[error("no session found for {name:?}")]
    SessionNotFound { name: String },

    /// An external command exited unsuccessfully.
    #[error("{command} failed: {message}")]
    Command { command: String, message: String },

    /// An external command could not be spawned.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend returned data that could not be understood.
    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    /// The configured backend name is not known.
    #[error("unknown audio backend: {0} (expected pulse or memory)")]
    UnknownBackend(String),
}

impl AudioError {
    /// Creates a session-not-found error.
    pub fn session_not_found(name: impl Into<String>) -> Self {
        Self::SessionNotFound { name: name.into() }
    }

    /// Creates a command failure error.
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Returns true if the error only concerns the requested endpoint.
    ///
    /// Such errors are expected during normal operation (an application was
    /// closed, a knob was turned past full scale) and are not worth more than
    /// a warning.
    pub fn is_endpoint_local(&self) -> bool {
        matches!(
            self,
            Self::VolumeOutOfRange { .. } | Self::SessionNotFound { .. }
        )
    }
}

impl From<serde_json::Error> for AudioError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

/// A specialized Result type for audio backend operations.
pub type AudioResult<T> = Result<T, AudioError>;
