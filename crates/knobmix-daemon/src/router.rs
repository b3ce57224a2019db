//! Endpoint router.
//!
//! Maps knob levels onto the configured endpoints, merges them with the
//! sessions the audio backend reports, and issues the volume calls.

use knobmix_audio::AudioBackend;
use knobmix_core::{Endpoint, EndpointKind};
use tracing::{debug, error, trace, warn};

/// Outcome of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Endpoints the backend accepted.
    pub applied: usize,
    /// Application endpoints with no running session.
    pub skipped: usize,
    /// Endpoints the backend rejected.
    pub failed: usize,
}

/// Routes levels to endpoints through an audio backend.
pub struct EndpointRouter<B> {
    backend: B,
    endpoints: Vec<Endpoint>,
    live: Vec<Endpoint>,
    assigned: usize,
}

impl<B: AudioBackend> EndpointRouter<B> {
    /// Creates a router for the given endpoint names, in knob order.
    pub fn new<I, S>(backend: B, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            backend,
            endpoints: names.into_iter().map(Endpoint::new).collect(),
            live: Vec::new(),
            assigned: 0,
        }
    }

    /// Returns the configured endpoints with their latest attributes.
    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Returns the sessions seen by the last refresh.
    pub fn live(&self) -> &[Endpoint] {
        &self.live
    }

    /// Returns the audio backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Stores level `i` as the requested volume of endpoint `i`.
    ///
    /// Levels without an endpoint are ignored; endpoints without a level
    /// keep their previous request and are not dispatched.
    pub fn assign(&mut self, levels: &[f32]) {
        if levels.len() != self.endpoints.len() {
            trace!(
                levels = levels.len(),
                endpoints = self.endpoints.len(),
                "Level and endpoint counts differ"
            );
        }
        for (endpoint, &level) in self.endpoints.iter_mut().zip(levels) {
            endpoint.set_volume = level;
        }
        self.assigned = levels.len().min(self.endpoints.len());
    }

    /// Asks the backend for live sessions and reconciles with them.
    ///
    /// A listing failure is logged and treated as no live sessions; reserved
    /// endpoints are still dispatched.
    pub fn refresh(&mut self) {
        let live = match self.backend.get_endpoints() {
            Ok(live) => live,
            Err(e) => {
                warn!(backend = self.backend.name(), error = %e, "Cannot list audio sessions");
                Vec::new()
            }
        };
        self.reconcile(live);
    }

    /// Merges live sessions into the configured endpoints by name.
    ///
    /// A configured endpoint adopts the live name, pid and current volume;
    /// its requested volume is kept.
    pub fn reconcile(&mut self, live: Vec<Endpoint>) {
        for endpoint in &mut self.endpoints {
            if let Some(found) = live.iter().find(|l| l.matches_name(&endpoint.name)) {
                endpoint.sync_from(found);
            }
        }
        self.live = live;
    }

    /// Applies the requested volumes of the assigned endpoints.
    ///
    /// A failing endpoint is logged and does not stop the others.
    pub fn dispatch(&mut self) -> DispatchReport {
        let mut report = DispatchReport::default();

        for endpoint in self.endpoints.iter().take(self.assigned) {
            let volume = endpoint.set_volume;
            let result = match endpoint.kind() {
                EndpointKind::Master => self.backend.set_master_volume(volume),
                EndpointKind::Microphone => self.backend.set_microphone_volume(volume),
                EndpointKind::Application => {
                    if !self.live.iter().any(|l| l == endpoint) {
                        report.skipped += 1;
                        continue;
                    }
                    self.backend.set_application_volume(endpoint)
                }
            };

            match result {
                Ok(()) => report.applied += 1,
                Err(e) if e.is_endpoint_local() => {
                    report.failed += 1;
                    warn!(endpoint = %endpoint, volume, error = %e, "Failed to set volume");
                }
                Err(e) => {
                    report.failed += 1;
                    error!(
                        backend = self.backend.name(),
                        endpoint = %endpoint,
                        error = %e,
                        "Audio backend failed"
                    );
                }
            }
        }

        debug!(
            applied = report.applied,
            skipped = report.skipped,
            failed = report.failed,
            "Dispatched levels"
        );
        report
    }

    /// Assigns, refreshes and dispatches one set of levels.
    pub fn apply(&mut self, levels: &[f32]) -> DispatchReport {
        self.assign(levels);
        self.refresh();
        self.dispatch()
    }
}
