//! Serial wire protocol between the knob panel and the host.
//!
//! The panel speaks plain ASCII lines:
//!
//! ```text
//! device -> host   KNOBMIX:HELLO\n        handshake key, until acknowledged
//! host   -> device KNOBMIX:READY\n        handshake acknowledgement
//! device -> host   512|0|1023|77|300\r    data frame, one per sample period
//! device -> host   KNOBMIX:PING\n         heartbeat
//! host   -> device KNOBMIX:PING\n         heartbeat echo
//! ```
//!
//! Control lines end with `\n`, data lines with `\r`. [`LineStream`] splits on
//! either terminator, and [`ProtocolTokens::classify`] sorts each line into
//! handshake, heartbeat or data.
//!
//! # Example
//!
//! ```rust
//! use knobmix_protocol::{LineKind, ProtocolTokens};
//!
//! let tokens = ProtocolTokens::default();
//! assert_eq!(tokens.classify("KNOBMIX:PING"), LineKind::Heartbeat);
//! assert_eq!(tokens.classify("1|2|3"), LineKind::Data("1|2|3"));
//! ```

mod error;
mod framing;
mod types;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{LineStream, trim_line_end};
pub use types::{LineKind, ProtocolTokens};

/// Default handshake key sent by the panel.
pub const HANDSHAKE_KEY: &str = "KNOBMIX:HELLO";

/// Default acknowledgement written back by the host.
pub const HANDSHAKE_ACK: &str = "KNOBMIX:READY";

/// Default heartbeat token, sent by the panel and echoed by the host.
pub const HEARTBEAT_TOKEN: &str = "KNOBMIX:PING";

/// Longest line accepted before the stream is considered garbage (bytes).
pub const MAX_LINE_LENGTH: usize = 256;
