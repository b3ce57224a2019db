//! Configuration file.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/knobmix/config.toml` by default:
//!
//! ```toml
//! [device]
//! knobs = 3
//! baud_rate = 9600
//! port = "/dev/ttyACM0"
//!
//! [mixer]
//! endpoints = ["master", "mic", "firefox"]
//! backend = "pulse"
//! ```
//!
//! A broken file never stops the bridge: unreadable files and invalid values
//! fall back to defaults with a warning. `knobmix config validate` reports
//! the same problems as errors.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use knobmix_audio::BackendKind;
use knobmix_core::{DEFAULT_RELAY_CAPACITY, MASTER_ENDPOINT};
use knobmix_daemon::{DEFAULT_BAUD_RATE, DEFAULT_KNOBS, LinkConfig, MixerConfig};
use knobmix_protocol::{HANDSHAKE_ACK, HANDSHAKE_KEY, HEARTBEAT_TOKEN, ProtocolTokens};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CliError, CliResult};

/// Configuration for knobmix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnobmixConfig {
    /// Knob panel settings.
    pub device: DeviceSettings,

    /// Mixing settings.
    pub mixer: MixerSettings,
}

/// Knob panel and serial link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Values per frame.
    pub knobs: usize,

    /// Serial baud rate.
    pub baud_rate: u32,

    /// Only try this port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,

    /// Key the panel sends to identify itself.
    pub handshake_key: String,

    /// Reply sent once the key is seen.
    pub handshake_ack: String,

    /// Liveness token.
    pub heartbeat: String,

    pub handshake_timeout_ms: u64,
    pub heartbeat_timeout_ms: u64,
    pub reconnect_delay_ms: u64,
    pub search_backoff_ms: u64,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            knobs: DEFAULT_KNOBS,
            baud_rate: DEFAULT_BAUD_RATE,
            port: None,
            handshake_key: HANDSHAKE_KEY.to_string(),
            handshake_ack: HANDSHAKE_ACK.to_string(),
            heartbeat: HEARTBEAT_TOKEN.to_string(),
            handshake_timeout_ms: 1000,
            heartbeat_timeout_ms: 1500,
            reconnect_delay_ms: 1500,
            search_backoff_ms: 3000,
        }
    }
}

/// Mixing loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    /// Interval between relay polls.
    pub poll_interval_ms: u64,

    /// Lines kept between polls.
    pub relay_capacity: usize,

    /// Endpoint names in knob order. `master` and `mic` are reserved.
    pub endpoints: Vec<String>,

    /// Audio backend.
    pub backend: BackendKind,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            relay_capacity: DEFAULT_RELAY_CAPACITY,
            endpoints: vec![MASTER_ENDPOINT.to_string()],
            backend: BackendKind::default(),
        }
    }
}

impl KnobmixConfig {
    /// Loads the configuration, falling back to defaults on any problem.
    ///
    /// Uses `path` if given, the default path otherwise. Invalid values are
    /// replaced by their defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map_or_else(Self::default_path, Path::to_path_buf);
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config.sanitized(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring configuration file");
                Self::default()
            }
        }
    }

    /// Loads configuration from a specific path, as written.
    pub fn load_from(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("failed to parse {}: {}", path.display(), e)))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("knobmix")
            .join("config.toml")
    }

    /// Describes every invalid value, without changing anything.
    pub fn problems(&self) -> Vec<String> {
        self.clone().repair()
    }

    /// Replaces invalid values by their defaults, warning once per value.
    pub fn sanitized(mut self) -> Self {
        for problem in self.repair() {
            warn!(problem = %problem, "Invalid configuration value");
        }
        self
    }

    fn repair(&mut self) -> Vec<String> {
        let defaults = Self::default();
        let mut problems = Vec::new();
        let device = &mut self.device;
        let mixer = &mut self.mixer;

        positive("device.knobs", &mut device.knobs, defaults.device.knobs, &mut problems);
        positive(
            "device.baud_rate",
            &mut device.baud_rate,
            defaults.device.baud_rate,
            &mut problems,
        );
        positive(
            "device.handshake_timeout_ms",
            &mut device.handshake_timeout_ms,
            defaults.device.handshake_timeout_ms,
            &mut problems,
        );
        positive(
            "device.heartbeat_timeout_ms",
            &mut device.heartbeat_timeout_ms,
            defaults.device.heartbeat_timeout_ms,
            &mut problems,
        );
        positive(
            "device.reconnect_delay_ms",
            &mut device.reconnect_delay_ms,
            defaults.device.reconnect_delay_ms,
            &mut problems,
        );
        positive(
            "device.search_backoff_ms",
            &mut device.search_backoff_ms,
            defaults.device.search_backoff_ms,
            &mut problems,
        );
        positive(
            "mixer.poll_interval_ms",
            &mut mixer.poll_interval_ms,
            defaults.mixer.poll_interval_ms,
            &mut problems,
        );
        positive(
            "mixer.relay_capacity",
            &mut mixer.relay_capacity,
            defaults.mixer.relay_capacity,
            &mut problems,
        );

        non_empty(
            "device.handshake_key",
            &mut device.handshake_key,
            &defaults.device.handshake_key,
            &mut problems,
        );
        non_empty(
            "device.handshake_ack",
            &mut device.handshake_ack,
            &defaults.device.handshake_ack,
            &mut problems,
        );
        non_empty(
            "device.heartbeat",
            &mut device.heartbeat,
            &defaults.device.heartbeat,
            &mut problems,
        );

        if device.port.as_deref().is_some_and(|p| p.trim().is_empty()) {
            problems.push("device.port is empty, searching all ports".to_string());
            device.port = None;
        }

        let before = mixer.endpoints.len();
        mixer.endpoints.retain(|name| !name.trim().is_empty());
        if mixer.endpoints.len() != before {
            problems.push("mixer.endpoints contains empty names, dropping them".to_string());
        }
        if mixer.endpoints.is_empty() {
            problems.push(format!(
                "mixer.endpoints is empty, using {:?}",
                defaults.mixer.endpoints
            ));
            mixer.endpoints = defaults.mixer.endpoints;
        }

        problems
    }

    /// Builds the serial link configuration.
    pub fn link_config(&self) -> LinkConfig {
        let device = &self.device;
        let mut config = LinkConfig::new(device.baud_rate)
            .with_tokens(ProtocolTokens::new(
                &device.handshake_key,
                &device.handshake_ack,
                &device.heartbeat,
            ))
            .with_handshake_timeout(Duration::from_millis(device.handshake_timeout_ms))
            .with_heartbeat_timeout(Duration::from_millis(device.heartbeat_timeout_ms))
            .with_reconnect_delay(Duration::from_millis(device.reconnect_delay_ms))
            .with_search_backoff(Duration::from_millis(device.search_backoff_ms));
        if let Some(ref port) = device.port {
            config = config.with_port(port);
        }
        config
    }

    /// Builds the mixing loop configuration.
    pub fn mixer_config(&self) -> MixerConfig {
        MixerConfig::new(self.device.knobs)
            .with_poll_interval(Duration::from_millis(self.mixer.poll_interval_ms))
            .with_relay_capacity(self.mixer.relay_capacity)
            .with_endpoints(self.mixer.endpoints.iter().cloned())
    }
}

fn positive<T>(name: &str, value: &mut T, default: T, problems: &mut Vec<String>)
where
    T: Copy + Default + PartialEq + fmt::Display,
{
    if *value == T::default() {
        problems.push(format!("{} must be greater than zero, using {}", name, default));
        *value = default;
    }
}

fn non_empty(name: &str, value: &mut String, default: &str, problems: &mut Vec<String>) {
    if value.is_empty() {
        problems.push(format!("{} is empty, using {:?}", name, default));
        *value = default.to_string();
    }
}
