//! Core types: endpoints, frame decoding, relay buffer, tracing

pub mod endpoint;
pub mod frame;
pub mod relay;
pub mod tracing;

pub use endpoint::{Endpoint, EndpointKind, MASTER_ENDPOINT, MICROPHONE_ENDPOINT};
pub use frame::{Frame, FrameDecoder, FrameError, MAX_KNOB_VALUE, parse_values, scale_values};
pub use relay::{DEFAULT_RELAY_CAPACITY, RelayBuffer, SharedRelay};
pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
