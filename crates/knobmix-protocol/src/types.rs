//! Control tokens and line classification.

use serde::{Deserialize, Serialize};

use crate::framing::trim_line_end;
use crate::{HANDSHAKE_ACK, HANDSHAKE_KEY, HEARTBEAT_TOKEN};

/// The fixed strings that make up the control protocol.
///
/// Firmware builds may use different strings, so they are configurable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolTokens {
    /// Key the device sends to identify itself.
    pub handshake_key: String,
    /// Line the host writes back once the key is seen.
    pub handshake_ack: String,
    /// Liveness token sent by the device and echoed by the host.
    pub heartbeat: String,
}

impl Default for ProtocolTokens {
    fn default() -> Self {
        Self {
            handshake_key: HANDSHAKE_KEY.to_string(),
            handshake_ack: HANDSHAKE_ACK.to_string(),
            heartbeat: HEARTBEAT_TOKEN.to_string(),
        }
    }
}

/// What a received line means to the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind<'a> {
    /// The line carries the handshake key.
    Handshake,
    /// The line carries the heartbeat token.
    Heartbeat,
    /// Anything else, with trailing CR/LF removed.
    Data(&'a str),
}

impl ProtocolTokens {
    /// Creates a token set from explicit strings.
    pub fn new(
        handshake_key: impl Into<String>,
        handshake_ack: impl Into<String>,
        heartbeat: impl Into<String>,
    ) -> Self {
        Self {
            handshake_key: handshake_key.into(),
            handshake_ack: handshake_ack.into(),
            heartbeat: heartbeat.into(),
        }
    }

    /// Returns true if `line` contains the handshake key.
    pub fn is_handshake(&self, line: &str) -> bool {
        !self.handshake_key.is_empty() && line.contains(self.handshake_key.as_str())
    }

    /// Returns true if `line` contains the heartbeat token.
    pub fn is_heartbeat(&self, line: &str) -> bool {
        !self.heartbeat.is_empty() && line.contains(self.heartbeat.as_str())
    }

    /// Classifies a received line.
    ///
    /// Heartbeats are checked first: they are by far the most frequent
    /// control line once linked.
    pub fn classify<'a>(&self, line: &'a str) -> LineKind<'a> {
        if self.is_heartbeat(line) {
            LineKind::Heartbeat
        } else if self.is_handshake(line) {
            LineKind::Handshake
        } else {
            LineKind::Data(trim_line_end(line))
        }
    }
}
