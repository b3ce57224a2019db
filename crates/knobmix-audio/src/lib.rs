//! AudioBackend trait and implementations.
//!
//! This crate provides the abstraction layer over the host audio system:
//!
//! - [`AudioBackend`] - The capability contract every backend implements
//! - [`PulseBackend`] - PulseAudio/PipeWire through `pactl`
//! - [`MemoryBackend`] - In-process sessions for dry runs and tests
//! - [`AudioError`] - Error types for backend operations
//!
//! # Architecture
//!
//! ```text
//!        levels from the knob panel
//!                    │
//!                    ▼
//!          ┌──────────────────┐
//!          │  EndpointRouter  │   (knobmix-daemon)
//!          └────────┬─────────┘
//!                   │   AudioBackend
//!          ┌────────┴─────────┐
//!          ▼                  ▼
//! ┌─────────────────┐ ┌─────────────────┐
//! │  PulseBackend   │ │  MemoryBackend  │
//! └────────┬────────┘ └─────────────────┘
//!          ▼
//!        pactl
//! ```
//!
//! # Example
//!
//! ```
//! use knobmix_audio::{AudioBackend, MemoryBackend};
//! use knobmix_core::Endpoint;
//!
//! let mut backend = MemoryBackend::new().with_session("vlc", Some(42), 1.0);
//! backend.set_master_volume(0.5).unwrap();
//! backend
//!     .set_application_volume(&Endpoint::new("VLC").with_set_volume(0.2))
//!     .unwrap();
//! assert_eq!(backend.session("vlc").unwrap().volume, 0.2);
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod pulse;

// Re-export main types at crate root
pub use backend::{AudioBackend, BackendKind, validate_volume};
pub use error::{AudioError, AudioResult};
pub use memory::{MemoryBackend, MemorySession};
pub use pulse::{PulseBackend, SinkInput, parse_sink_inputs};
