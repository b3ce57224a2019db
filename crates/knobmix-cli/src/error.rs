//! CLI error types.

use std::fmt;

use knobmix_audio::AudioError;
use knobmix_core::TracingError;
use knobmix_daemon::DaemonError;

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

/// Errors that can occur in the CLI.
#[derive(Debug)]
pub enum CliError {
    /// Configuration error.
    Config(String),
    /// IO error.
    Io(std::io::Error),
    /// Daemon startup error.
    Daemon(DaemonError),
    /// Audio backend error.
    Audio(AudioError),
    /// Logging could not be set up.
    Tracing(TracingError),
    /// Output could not be rendered.
    Output(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Daemon(err) => write!(f, "{}", err),
            Self::Audio(err) => write!(f, "audio error: {}", err),
            Self::Tracing(err) => write!(f, "logging error: {}", err),
            Self::Output(msg) => write!(f, "output error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Daemon(err) => Some(err),
            Self::Audio(err) => Some(err),
            Self::Tracing(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<DaemonError> for CliError {
    fn from(err: DaemonError) -> Self {
        Self::Daemon(err)
    }
}

impl From<AudioError> for CliError {
    fn from(err: AudioError) -> Self {
        Self::Audio(err)
    }
}

impl From<TracingError> for CliError {
    fn from(err: TracingError) -> Self {
        Self::Tracing(err)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Output(err.to_string())
    }
}
