//! Runtime configuration for the link and the mixing loop.

use std::time::Duration;

use knobmix_core::{DEFAULT_RELAY_CAPACITY, MASTER_ENDPOINT};
use knobmix_protocol::{MAX_LINE_LENGTH, ProtocolTokens};

/// Default knob count.
pub const DEFAULT_KNOBS: usize = 5;
/// Default serial baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Serial link configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Baud rate used to open candidate ports.
    pub baud_rate: u32,

    /// Restricts the search to this port name.
    pub port: Option<String>,

    /// Handshake and heartbeat strings.
    pub tokens: ProtocolTokens,

    /// How long a freshly opened port has to send the handshake key.
    pub handshake_timeout: Duration,

    /// How long a linked device may stay silent between heartbeats.
    pub heartbeat_timeout: Duration,

    /// Pause between losing a link and searching again.
    pub reconnect_delay: Duration,

    /// Pause after every candidate port failed.
    pub search_backoff: Duration,

    /// Longest accepted line, in bytes.
    pub max_line_length: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            port: None,
            tokens: ProtocolTokens::default(),
            handshake_timeout: Duration::from_millis(1000),
            heartbeat_timeout: Duration::from_millis(1500),
            reconnect_delay: Duration::from_millis(1500),
            search_backoff: Duration::from_millis(3000),
            max_line_length: MAX_LINE_LENGTH,
        }
    }
}

impl LinkConfig {
    /// Creates a new link configuration with the given baud rate.
    pub fn new(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Default::default()
        }
    }

    /// Builder: only consider this port.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Builder: set protocol tokens.
    pub fn with_tokens(mut self, tokens: ProtocolTokens) -> Self {
        self.tokens = tokens;
        self
    }

    /// Builder: set handshake timeout.
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Builder: set heartbeat timeout.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Builder: set reconnect delay.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Builder: set search backoff.
    pub fn with_search_backoff(mut self, backoff: Duration) -> Self {
        self.search_backoff = backoff;
        self
    }

    /// Builder: set maximum line length.
    pub fn with_max_line_length(mut self, max: usize) -> Self {
        self.max_line_length = max;
        self
    }
}

/// Mixing loop configuration.
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Values per frame.
    pub knobs: usize,

    /// Interval between relay polls.
    pub poll_interval: Duration,

    /// Relay buffer capacity.
    pub relay_capacity: usize,

    /// Endpoint names, in knob order.
    pub endpoints: Vec<String>,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            knobs: DEFAULT_KNOBS,
            poll_interval: Duration::from_millis(50),
            relay_capacity: DEFAULT_RELAY_CAPACITY,
            endpoints: vec![MASTER_ENDPOINT.to_string()],
        }
    }
}

impl MixerConfig {
    /// Creates a new mixer configuration for the given knob count.
    pub fn new(knobs: usize) -> Self {
        Self {
            knobs,
            ..Default::default()
        }
    }

    /// Builder: set poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder: set relay capacity.
    pub fn with_relay_capacity(mut self, capacity: usize) -> Self {
        self.relay_capacity = capacity;
        self
    }

    /// Builder: set endpoint names.
    pub fn with_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_link_config() {
        let config = LinkConfig::default();
        assert_eq!(config.baud_rate, 9600);
        assert_eq!(config.port, None);
        assert_eq!(config.handshake_timeout, Duration::from_millis(1000));
        assert_eq!(config.heartbeat_timeout, Duration::from_millis(1500));
        assert_eq!(config.reconnect_delay, Duration::from_millis(1500));
        assert_eq!(config.max_line_length, MAX_LINE_LENGTH);
    }

    #[test]
    fn custom_link_config() {
        let config = LinkConfig::new(115_200)
            .with_port("/dev/ttyACM0")
            .with_handshake_timeout(Duration::from_millis(250))
            .with_heartbeat_timeout(Duration::from_secs(5))
            .with_reconnect_delay(Duration::from_millis(10))
            .with_search_backoff(Duration::from_millis(20))
            .with_max_line_length(64)
            .with_tokens(ProtocolTokens::new("HI", "OK", "HB"));

        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.handshake_timeout, Duration::from_millis(250));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(5));
        assert_eq!(config.search_backoff, Duration::from_millis(20));
        assert_eq!(config.max_line_length, 64);
        assert_eq!(config.tokens.heartbeat, "HB");
    }

    #[test]
    fn default_mixer_config() {
        let config = MixerConfig::default();
        assert_eq!(config.knobs, 5);
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.relay_capacity, 64);
        assert_eq!(config.endpoints, vec!["master".to_string()]);
    }

    #[test]
    fn custom_mixer_config() {
        let config = MixerConfig::new(3)
            .with_poll_interval(Duration::from_millis(10))
            .with_relay_capacity(8)
            .with_endpoints(["master", "mic", "spotify"]);

        assert_eq!(config.knobs, 3);
        assert_eq!(config.relay_capacity, 8);
        assert_eq!(config.endpoints.len(), 3);
        assert_eq!(config.endpoints[2], "spotify");
    }
}
