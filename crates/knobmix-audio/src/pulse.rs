//! PulseAudio backend.
//!
//! Drives the sound server through `pactl`, which also works against
//! PipeWire's pulse compatibility layer:
//!
//! - `pactl -f json list sink-inputs` - enumerate application streams
//! - `pactl set-sink-input-volume <index> <raw>` / `set-sink-input-mute`
//! - `pactl set-sink-volume @DEFAULT_SINK@ <raw>`
//! - `pactl set-source-volume @DEFAULT_SOURCE@ <raw>` / `set-source-mute`
//!
//! Levels are passed as raw volumes where 65536 is 100%.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Command;
use std::time::{Duration, Instant};

use knobmix_core::Endpoint;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::backend::{AudioBackend, validate_volume};
use crate::error::{AudioError, AudioResult};

/// Raw volume for 100%.
pub const VOLUME_NORM: u32 = 65536;

/// How long a sink-input listing is reused for volume updates.
pub const LISTING_TTL: Duration = Duration::from_millis(500);

/// Level difference below which a stream is considered already set.
const VOLUME_EPSILON: f32 = 1.0 / 1024.0;

const DEFAULT_SINK: &str = "@DEFAULT_SINK@";
const DEFAULT_SOURCE: &str = "@DEFAULT_SOURCE@";

/// One application stream as reported by `pactl list sink-inputs`.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkInput {
    /// Server-side stream index.
    pub index: u32,
    /// Process executable name, or application name if unavailable.
    pub name: String,
    /// Owning process id.
    pub pid: Option<u32>,
    /// Mean channel level in `[0, 1]` (may exceed 1 when boosted).
    pub volume: f32,
    /// Whether the stream is muted.
    pub muted: bool,
}

impl SinkInput {
    /// Converts the stream into a discovered endpoint.
    pub fn to_endpoint(&self) -> Endpoint {
        Endpoint::discovered(self.name.clone(), self.pid, self.volume)
    }
}

#[derive(Debug, Deserialize)]
struct RawSinkInput {
    index: u32,
    #[serde(default)]
    mute: bool,
    #[serde(default)]
    volume: BTreeMap<String, RawChannel>,
    #[serde(default)]
    properties: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    value: u32,
}

impl RawSinkInput {
    fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    fn into_sink_input(self) -> Option<SinkInput> {
        let name = self
            .property("application.process.binary")
            .or_else(|| self.property("application.name"))?
            .to_string();
        let pid = self
            .property("application.process.id")
            .and_then(|p| p.parse().ok());
        let volume = if self.volume.is_empty() {
            0.0
        } else {
            let total: f64 = self.volume.values().map(|c| f64::from(c.value)).sum();
            (total / self.volume.len() as f64 / f64::from(VOLUME_NORM)) as f32
        };
        Some(SinkInput {
            index: self.index,
            name,
            pid,
            volume,
            muted: self.mute,
        })
    }
}

/// Parses the output of `pactl -f json list sink-inputs`.
///
/// Streams without any application name are skipped.
pub fn parse_sink_inputs(json: &str) -> AudioResult<Vec<SinkInput>> {
    let raw: Vec<RawSinkInput> = serde_json::from_str(json)?;
    Ok(raw.into_iter().filter_map(RawSinkInput::into_sink_input).collect())
}

/// Converts a level in `[0, 1]` into a `pactl` raw volume argument.
pub fn volume_arg(volume: f32) -> String {
    ((volume * VOLUME_NORM as f32).round() as u32).to_string()
}

/// Audio backend shelling out to `pactl`.
///
/// The listing fetched by [`AudioBackend::get_endpoints`] is reused for the
/// volume updates that follow it in the same mixing cycle, and streams that
/// are already at the requested level are left alone.
#[derive(Debug, Clone)]
pub struct PulseBackend {
    program: PathBuf,
    listing: Option<(Instant, Vec<SinkInput>)>,
}

impl Default for PulseBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseBackend {
    /// Creates a backend using `pactl` from `PATH`.
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("pactl"),
            listing: None,
        }
    }

    /// Builder: use a different `pactl` executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Lists application streams.
    pub fn sink_inputs(&self) -> AudioResult<Vec<SinkInput>> {
        let output = self.pactl(&["-f", "json", "list", "sink-inputs"])?;
        parse_sink_inputs(&output)
    }

    fn cached_sink_inputs(&mut self) -> AudioResult<Vec<SinkInput>> {
        if let Some((fetched, inputs)) = &self.listing {
            if fetched.elapsed() < LISTING_TTL {
                return Ok(inputs.clone());
            }
        }
        let inputs = self.sink_inputs()?;
        self.listing = Some((Instant::now(), inputs.clone()));
        Ok(inputs)
    }

    /// Runs `pactl` with `args` and returns its stdout.
    fn pactl(&self, args: &[&str]) -> AudioResult<String> {
        trace!(program = %self.program.display(), ?args, "Running pactl");
        let output = Command::new(&self.program).args(args).output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AudioError::command(
                format!("pactl {}", args.join(" ")),
                format!("exit {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn set_mute(&self, command: &str, target: &str, muted: bool) -> AudioResult<()> {
        self.pactl(&[command, target, if muted { "1" } else { "0" }])
            .map(drop)
    }

    fn apply_to_sink_input(&self, input: &SinkInput, volume: f32) -> AudioResult<()> {
        let index = input.index.to_string();
        if volume == 0.0 {
            if input.muted {
                return Ok(());
            }
            return self.set_mute("set-sink-input-mute", &index, true);
        }
        if !input.muted && (input.volume - volume).abs() < VOLUME_EPSILON {
            return Ok(());
        }
        self.pactl(&["set-sink-input-volume", &index, &volume_arg(volume)])?;
        if input.muted {
            self.set_mute("set-sink-input-mute", &index, false)?;
        }
        Ok(())
    }
}

impl AudioBackend for PulseBackend {
    fn name(&self) -> &str {
        "pulse"
    }

    fn set_master_volume(&mut self, volume: f32) -> AudioResult<()> {
        validate_volume(volume)?;
        self.pactl(&["set-sink-volume", DEFAULT_SINK, &volume_arg(volume)])?;
        Ok(())
    }

    fn set_microphone_volume(&mut self, volume: f32) -> AudioResult<()> {
        validate_volume(volume)?;
        if volume == 0.0 {
            return self.set_mute("set-source-mute", DEFAULT_SOURCE, true);
        }
        self.pactl(&["set-source-volume", DEFAULT_SOURCE, &volume_arg(volume)])?;
        self.set_mute("set-source-mute", DEFAULT_SOURCE, false)
    }

    fn get_endpoints(&mut self) -> AudioResult<Vec<Endpoint>> {
        let inputs = self.sink_inputs()?;
        let endpoints = inputs.iter().map(SinkInput::to_endpoint).collect();
        self.listing = Some((Instant::now(), inputs));
        Ok(endpoints)
    }

    fn set_application_volume(&mut self, endpoint: &Endpoint) -> AudioResult<()> {
        let volume = endpoint.set_volume;
        validate_volume(volume)?;

        let inputs: Vec<SinkInput> = self
            .cached_sink_inputs()?
            .into_iter()
            .filter(|input| endpoint.matches_name(&input.name))
            .collect();
        if inputs.is_empty() {
            return Err(AudioError::session_not_found(&endpoint.name));
        }

        let mut first_error = None;
        for input in &inputs {
            if let Err(e) = self.apply_to_sink_input(input, volume) {
                debug!(index = input.index, error = %e, "Failed to update sink input");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        if first_error.is_some() {
            self.listing = None;
        } else if let Some((_, cached)) = &mut self.listing {
            for input in cached.iter_mut().filter(|i| endpoint.matches_name(&i.name)) {
                if volume == 0.0 {
                    input.muted = true;
                } else {
                    input.volume = volume;
                    input.muted = false;
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
