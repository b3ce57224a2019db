//! AudioBackend trait definition.
//!
//! This module defines the [`AudioBackend`] trait, which is the capability
//! contract the mixer needs from the host audio system:
//! - set the system output and capture device levels
//! - enumerate running application sessions
//! - set the level of one application session
//!
//! A level of 0 mutes the target. Any other level unmutes it and sets the
//! level. Every call validates its level before touching the system.

use std::fmt;
use std::str::FromStr;

use knobmix_core::Endpoint;
use serde::{Deserialize, Serialize};

use crate::error::{AudioError, AudioResult};
use crate::memory::MemoryBackend;
use crate::pulse::PulseBackend;

/// The core abstraction for audio systems.
///
/// Backends are driven from the blocking mixing loop, so every method is
/// synchronous and takes `&mut self`.
///
/// # Implementation Notes
///
/// - Call [`validate_volume`] before any side effect and return its error
///   unchanged
/// - A level of exactly 0.0 mutes; anything else unmutes
/// - `set_application_volume` updates every session whose name matches the
///   endpoint name case-insensitively, and reports
///   [`AudioError::SessionNotFound`] if there is none
pub trait AudioBackend: Send {
    /// Returns the name of this backend (e.g., "pulse", "memory").
    fn name(&self) -> &str;

    /// Sets the system output level.
    fn set_master_volume(&mut self, volume: f32) -> AudioResult<()>;

    /// Sets the default capture device level.
    fn set_microphone_volume(&mut self, volume: f32) -> AudioResult<()>;

    /// Lists the application sessions currently known to the audio system.
    fn get_endpoints(&mut self) -> AudioResult<Vec<Endpoint>>;

    /// Sets the level of the sessions named by `endpoint` to its `set_volume`.
    fn set_application_volume(&mut self, endpoint: &Endpoint) -> AudioResult<()>;
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn set_master_volume(&mut self, volume: f32) -> AudioResult<()> {
        (**self).set_master_volume(volume)
    }

    fn set_microphone_volume(&mut self, volume: f32) -> AudioResult<()> {
        (**self).set_microphone_volume(volume)
    }

    fn get_endpoints(&mut self) -> AudioResult<Vec<Endpoint>> {
        (**self).get_endpoints()
    }

    fn set_application_volume(&mut self, endpoint: &Endpoint) -> AudioResult<()> {
        (**self).set_application_volume(endpoint)
    }
}

/// Rejects levels outside `[0, 1]`, including NaN.
pub fn validate_volume(volume: f32) -> AudioResult<()> {
    if (0.0..=1.0).contains(&volume) {
        Ok(())
    } else {
        Err(AudioError::VolumeOutOfRange { volume })
    }
}

/// The audio backends that can be selected by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// PulseAudio or PipeWire through `pactl`.
    #[default]
    Pulse,
    /// In-process sessions, nothing reaches the system.
    Memory,
}

impl BackendKind {
    /// Returns the configuration name of this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pulse => "pulse",
            Self::Memory => "memory",
        }
    }

    /// Creates a backend of this kind with default settings.
    pub fn create(self) -> Box<dyn AudioBackend> {
        match self {
            Self::Pulse => Box::new(PulseBackend::new()),
            Self::Memory => Box::new(MemoryBackend::new()),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = AudioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pulse" | "pulseaudio" | "pipewire" => Ok(Self::Pulse),
            "memory" => Ok(Self::Memory),
            _ => Err(AudioError::UnknownBackend(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_volume_bounds() {
        assert!(validate_volume(0.0).is_ok());
        assert!(validate_volume(0.5).is_ok());
        assert!(validate_volume(1.0).is_ok());
        assert!(validate_volume(1.0001).is_err());
        assert!(validate_volume(-0.01).is_err());
        assert!(validate_volume(f32::NAN).is_err());
    }

    #[test]
    fn backend_kind_parsing() {
        assert_eq!("pulse".parse::<BackendKind>().unwrap(), BackendKind::Pulse);
        assert_eq!("PipeWire".parse::<BackendKind>().unwrap(), BackendKind::Pulse);
        assert_eq!(" memory ".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!(matches!(
            "alsa".parse::<BackendKind>(),
            Err(AudioError::UnknownBackend(_))
        ));
    }

    #[test]
    fn backend_kind_serde() {
        let kind: BackendKind = serde_json::from_str("\"memory\"").unwrap();
        assert_eq!(kind, BackendKind::Memory);
        assert_eq!(serde_json::to_string(&BackendKind::Pulse).unwrap(), "\"pulse\"");
        assert_eq!(BackendKind::default(), BackendKind::Pulse);
    }

    #[test]
    fn boxed_backend_delegates() {
        let mut backend = BackendKind::Memory.create();
        assert_eq!(backend.name(), "memory");
        backend.set_master_volume(0.4).unwrap();
        assert!(backend.set_master_volume(2.0).is_err());
        assert!(backend.get_endpoints().unwrap().is_empty());
    }
}
