//! Mixing loop.
//!
//! Polls the relay buffer at a fixed interval, decodes the freshest frame
//! and hands its levels to the [`EndpointRouter`]. Runs on a blocking thread
//! because audio backends are synchronous.

use std::thread;
use std::time::{Duration, Instant};

use knobmix_audio::AudioBackend;
use knobmix_core::{FrameDecoder, SharedRelay};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::config::MixerConfig;
use crate::error::DaemonResult;
use crate::router::{DispatchReport, EndpointRouter};
use crate::signals::ShutdownHandle;

/// Longest uninterrupted sleep, so shutdown is noticed promptly.
const SHUTDOWN_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Counters kept by the mixing loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MixerStats {
    /// Relay polls performed.
    pub polls: u64,
    /// Frames decoded and dispatched.
    pub frames_applied: u64,
    /// Frames rejected by the decoder.
    pub frames_rejected: u64,
    /// Endpoint updates the backend rejected.
    pub endpoint_failures: u64,
}

/// Decodes relayed frames and applies them to the audio backend.
pub struct Mixer<B> {
    decoder: FrameDecoder,
    relay: SharedRelay,
    router: EndpointRouter<B>,
    poll_interval: Duration,
    stats: MixerStats,
}

impl<B: AudioBackend> Mixer<B> {
    /// Creates a mixer reading from `relay`.
    pub fn new(config: &MixerConfig, relay: SharedRelay, backend: B) -> DaemonResult<Self> {
        let decoder = FrameDecoder::new(config.knobs)?;
        if config.endpoints.len() != config.knobs {
            warn!(
                knobs = config.knobs,
                endpoints = config.endpoints.len(),
                "Knob count and endpoint count differ"
            );
        }

        Ok(Self {
            decoder,
            relay,
            router: EndpointRouter::new(backend, config.endpoints.iter().cloned()),
            poll_interval: config.poll_interval,
            stats: MixerStats::default(),
        })
    }

    /// Returns the router.
    pub fn router(&self) -> &EndpointRouter<B> {
        &self.router
    }

    /// Returns the counters.
    pub fn stats(&self) -> MixerStats {
        self.stats
    }

    /// Applies the freshest relayed frame, if any.
    ///
    /// The relay is always left empty.
    pub fn poll_once(&mut self) -> Option<DispatchReport> {
        self.stats.polls += 1;
        let line = self.relay.get_latest_match(self.decoder.pattern())?;

        let frame = match self.decoder.decode_unchecked(&line) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.frames_rejected += 1;
                warn!(line = %line, error = %e, "Rejected frame");
                return None;
            }
        };
        trace!(values = ?frame.values(), "Decoded frame");

        let report = self.router.apply(&frame.levels());
        self.stats.frames_applied += 1;
        self.stats.endpoint_failures += report.failed as u64;
        Some(report)
    }

    /// Polls until shutdown. Blocks the calling thread.
    pub fn run(mut self, shutdown: &ShutdownHandle) -> MixerStats {
        info!(
            backend = self.router.backend().name(),
            knobs = self.decoder.knobs(),
            poll_ms = self.poll_interval.as_millis() as u64,
            "Mixer started"
        );

        while !shutdown.is_shutdown() {
            self.poll_once();
            sleep_unless_shutdown(self.poll_interval, shutdown);
        }

        debug!(stats = ?self.stats, "Mixer stats");
        info!(frames = self.stats.frames_applied, "Mixer stopped");
        self.stats
    }
}

fn sleep_unless_shutdown(duration: Duration, shutdown: &ShutdownHandle) {
    let until = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= until || shutdown.is_shutdown() {
            return;
        }
        thread::sleep((until - now).min(SHUTDOWN_CHECK_INTERVAL));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knobmix_audio::MemoryBackend;
    use knobmix_core::RelayBuffer;

    fn mixer(endpoints: &[&str], backend: MemoryBackend) -> (Mixer<MemoryBackend>, SharedRelay) {
        let config = MixerConfig::new(endpoints.len())
            .with_poll_interval(Duration::from_millis(5))
            .with_endpoints(endpoints.iter().copied());
        let relay = RelayBuffer::shared(8);
        let mixer = Mixer::new(&config, relay.clone(), backend).unwrap();
        (mixer, relay)
    }

    #[test]
    fn applies_latest_frame() {
        let backend = MemoryBackend::new().with_session("vlc", None, 1.0);
        let handle = backend.clone();
        let (mut mixer, relay) = mixer(&["master", "vlc"], backend);

        relay.push("0|0");
        relay.push("1023|511");
        relay.push("KNOBMIX:garbage");

        let report = mixer.poll_once().unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(handle.master_volume(), Some(1.0));
        assert!((handle.session("vlc").unwrap().volume - 0.4995).abs() < 1e-3);
        assert!(relay.is_empty());
    }

    #[test]
    fn empty_or_noisy_relay_does_nothing() {
        let backend = MemoryBackend::new();
        let handle = backend.clone();
        let (mut mixer, relay) = mixer(&["master"], backend);

        assert!(mixer.poll_once().is_none());
        relay.push("12|34");
        relay.push("abc");
        assert!(mixer.poll_once().is_none());

        assert!(relay.is_empty());
        assert_eq!(handle.master_volume(), None);
        assert_eq!(mixer.stats().polls, 2);
        assert_eq!(mixer.stats().frames_applied, 0);
    }

    #[test]
    fn out_of_range_reading_is_counted_as_failure() {
        let backend = MemoryBackend::new();
        let handle = backend.clone();
        let (mut mixer, relay) = mixer(&["master"], backend);

        relay.push("2000");
        let report = mixer.poll_once().unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(mixer.stats().endpoint_failures, 1);
        assert_eq!(handle.master_volume(), None);
    }

    #[test]
    fn zero_knobs_rejected() {
        let config = MixerConfig::new(0);
        let result = Mixer::new(&config, RelayBuffer::shared(4), MemoryBackend::new());
        assert!(result.is_err());
    }

    #[test]
    fn run_stops_on_shutdown() {
        let backend = MemoryBackend::new();
        let handle = backend.clone();
        let (mixer, relay) = mixer(&["master"], backend);
        let shutdown = ShutdownHandle::new();

        let thread = {
            let shutdown = shutdown.clone();
            thread::spawn(move || mixer.run(&shutdown))
        };

        relay.push("1023");
        let started = Instant::now();
        while handle.master_volume().is_none() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        shutdown.trigger();

        let stats = thread.join().unwrap();
        assert_eq!(handle.master_volume(), Some(1.0));
        assert_eq!(stats.frames_applied, 1);
    }
}
