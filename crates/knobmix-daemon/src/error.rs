//! Daemon error types.

use std::io;

use knobmix_audio::AudioError;
use knobmix_core::FrameError;
use knobmix_protocol::ProtocolError;
use thiserror::Error;

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

/// Errors that can occur in the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// IO error (pid file, etc.).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (framing, line length, etc.).
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Frame decoder could not be built.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Audio backend error.
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// A serial port could not be opened.
    #[error("Cannot open serial port {port}: {message}")]
    Serial { port: String, message: String },

    /// Serial ports could not be listed.
    #[error("Cannot enumerate serial ports: {0}")]
    PortEnumeration(String),

    /// Another live process holds the knob panel.
    #[error("knobmix is already running as PID {pid} on {port} (guard file: {path})")]
    AlreadyRunning { path: String, pid: u32, port: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Shutdown requested.
    #[error("Shutdown requested")]
    Shutdown,
}

impl DaemonError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a serial port error.
    pub fn serial(port: impl Into<String>, message: impl ToString) -> Self {
        Self::Serial {
            port: port.into(),
            message: message.to_string(),
        }
    }

    /// Creates an already running error naming the owner and its port.
    pub fn already_running(path: impl Into<String>, pid: u32, port: impl Into<String>) -> Self {
        Self::AlreadyRunning {
            path: path.into(),
            pid,
            port: port.into(),
        }
    }

    /// Returns true if this error only signals a shutdown request.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }
}
