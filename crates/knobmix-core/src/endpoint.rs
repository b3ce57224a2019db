//! Audio endpoint value type.
//!
//! An [`Endpoint`] is a named volume target: the system output, the capture
//! device, or one application session. Endpoints come from two places:
//! - the configuration file (name only, in knob order)
//! - the audio backend at runtime (name, pid and current volume)
//!
//! Both kinds are merged by name every mixing cycle, so identity is the
//! name alone, compared case-insensitively. Volumes and pid are attributes.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Reserved endpoint name routed to the system output volume.
pub const MASTER_ENDPOINT: &str = "master";

/// Reserved endpoint name routed to the default capture device.
pub const MICROPHONE_ENDPOINT: &str = "mic";

/// How an endpoint is dispatched to the audio backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    /// The system output (master volume).
    Master,
    /// The default capture device.
    Microphone,
    /// A single application session.
    Application,
}

/// A named audio volume target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Display name (process executable name for application sessions).
    pub name: String,
    /// Last volume reported by the backend, in `[0, 1]`.
    pub current_volume: f32,
    /// Volume requested by the knob panel. Not clamped.
    pub set_volume: f32,
    /// Owning process id, when the backend reported one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

impl Endpoint {
    /// Creates a configured endpoint with only a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current_volume: 0.0,
            set_volume: 0.0,
            pid: None,
        }
    }

    /// Creates an endpoint as reported live by an audio backend.
    pub fn discovered(name: impl Into<String>, pid: Option<u32>, current_volume: f32) -> Self {
        Self {
            name: name.into(),
            current_volume,
            set_volume: current_volume,
            pid,
        }
    }

    /// Builder: set the requested volume.
    #[must_use]
    pub fn with_set_volume(mut self, volume: f32) -> Self {
        self.set_volume = volume;
        self
    }

    /// Returns true if both names are equal ignoring ASCII/Unicode case.
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }

    /// Returns the routing kind derived from the reserved names.
    pub fn kind(&self) -> EndpointKind {
        if self.matches_name(MASTER_ENDPOINT) {
            EndpointKind::Master
        } else if self.matches_name(MICROPHONE_ENDPOINT) {
            EndpointKind::Microphone
        } else {
            EndpointKind::Application
        }
    }

    /// Refreshes runtime attributes from a live endpoint with the same identity.
    ///
    /// The requested volume is kept: it belongs to the knob, not the session.
    pub fn sync_from(&mut self, live: &Endpoint) {
        self.name.clone_from(&live.name);
        self.current_volume = live.current_volume;
        self.pid = live.pid;
    }
}

impl PartialEq for Endpoint {
    fn eq(&self, other: &Self) -> bool {
        self.matches_name(&other.name)
    }
}

impl Eq for Endpoint {}

impl Hash for Endpoint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_lowercase().hash(state);
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "{} (pid {})", self.name, pid),
            None => write!(f, "{}", self.name),
        }
    }
}
