//! Daemon: serial link, endpoint routing, mixing loop.
//!
//! This crate provides the knobmix runtime:
//! - [`Link`]: finds the knob panel, handshakes, keeps it alive and relays
//!   its data lines into a [`RelayBuffer`](knobmix_core::RelayBuffer)
//! - [`Mixer`]: polls the relay, decodes frames and dispatches levels
//!   through an [`EndpointRouter`]
//! - process plumbing: [`SignalHandler`], [`PidFile`]
//!
//! # Example
//!
//! ```rust,no_run
//! use knobmix_audio::MemoryBackend;
//! use knobmix_core::RelayBuffer;
//! use knobmix_daemon::{Link, LinkConfig, Mixer, MixerConfig, SerialPorts, SignalHandler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!
//!     let mixer_config = MixerConfig::default();
//!     let relay = RelayBuffer::shared(mixer_config.relay_capacity);
//!     let link = Link::new(
//!         SerialPorts,
//!         LinkConfig::default(),
//!         relay.clone(),
//!         signals.shutdown_handle(),
//!     );
//!     let mixer = Mixer::new(&mixer_config, relay, MemoryBackend::new())?;
//!
//!     let shutdown = signals.shutdown_handle();
//!     let mixing = tokio::task::spawn_blocking(move || mixer.run(&shutdown));
//!     link.run().await;
//!     mixing.await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod link;
mod mixer;
mod pidfile;
mod port;
mod router;
mod signals;

pub use config::{DEFAULT_BAUD_RATE, DEFAULT_KNOBS, LinkConfig, MixerConfig};
pub use error::{DaemonError, DaemonResult};
pub use link::{Link, LinkState, LinkStats};
pub use mixer::{Mixer, MixerStats};
pub use pidfile::{PanelOwner, PidFile, default_pid_path};
pub use port::{MemoryPorts, PortInfo, PortKind, PortProvider, SerialPorts, candidate_ports};
pub use router::{DispatchReport, EndpointRouter};
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
