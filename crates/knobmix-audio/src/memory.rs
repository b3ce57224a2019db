//! In-memory audio backend.
//!
//! Holds a list of fake application sessions and records every level it is
//! asked to apply. Clones share state, so a test can keep a handle while the
//! mixer owns another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use knobmix_core::Endpoint;
use tracing::debug;

use crate::backend::{AudioBackend, validate_volume};
use crate::error::{AudioError, AudioResult};

/// One fake application session.
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySession {
    /// Process name.
    pub name: String,
    /// Owning process id.
    pub pid: Option<u32>,
    /// Current level.
    pub volume: f32,
    /// Whether the session is muted.
    pub muted: bool,
}

#[derive(Debug, Default)]
struct MemoryState {
    sessions: Vec<MemorySession>,
    master: Option<f32>,
    microphone: Option<f32>,
    microphone_muted: bool,
    fail_listing: bool,
}

/// Audio backend that never touches the host audio system.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    /// Creates a backend with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a session.
    #[must_use]
    pub fn with_session(self, name: impl Into<String>, pid: Option<u32>, volume: f32) -> Self {
        self.add_session(name, pid, volume);
        self
    }

    /// Adds a session, as if an application had started playing.
    pub fn add_session(&self, name: impl Into<String>, pid: Option<u32>, volume: f32) {
        self.lock().sessions.push(MemorySession {
            name: name.into(),
            pid,
            volume,
            muted: false,
        });
    }

    /// Removes every session with the given name. Returns how many were removed.
    pub fn remove_session(&self, name: &str) -> usize {
        let mut state = self.lock();
        let before = state.sessions.len();
        state.sessions.retain(|s| !names_match(&s.name, name));
        before - state.sessions.len()
    }

    /// Returns a snapshot of all sessions.
    pub fn sessions(&self) -> Vec<MemorySession> {
        self.lock().sessions.clone()
    }

    /// Returns the first session with the given name.
    pub fn session(&self, name: &str) -> Option<MemorySession> {
        self.lock()
            .sessions
            .iter()
            .find(|s| names_match(&s.name, name))
            .cloned()
    }

    /// Returns the last master level applied, if any.
    pub fn master_volume(&self) -> Option<f32> {
        self.lock().master
    }

    /// Returns the last microphone level applied, if any.
    pub fn microphone_volume(&self) -> Option<f32> {
        self.lock().microphone
    }

    /// Returns whether the microphone is muted.
    pub fn is_microphone_muted(&self) -> bool {
        self.lock().microphone_muted
    }

    /// Makes [`AudioBackend::get_endpoints`] fail until reset.
    pub fn set_fail_listing(&self, fail: bool) {
        self.lock().fail_listing = fail;
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn set_master_volume(&mut self, volume: f32) -> AudioResult<()> {
        validate_volume(volume)?;
        debug!(volume, "memory: master volume");
        self.lock().master = Some(volume);
        Ok(())
    }

    fn set_microphone_volume(&mut self, volume: f32) -> AudioResult<()> {
        validate_volume(volume)?;
        debug!(volume, "memory: microphone volume");
        let mut state = self.lock();
        state.microphone = Some(volume);
        state.microphone_muted = volume == 0.0;
        Ok(())
    }

    fn get_endpoints(&mut self) -> AudioResult<Vec<Endpoint>> {
        let state = self.lock();
        if state.fail_listing {
            return Err(AudioError::invalid_response("session listing disabled"));
        }
        Ok(state
            .sessions
            .iter()
            .map(|s| Endpoint::discovered(s.name.clone(), s.pid, s.volume))
            .collect())
    }

    fn set_application_volume(&mut self, endpoint: &Endpoint) -> AudioResult<()> {
        let volume = endpoint.set_volume;
        validate_volume(volume)?;

        let mut state = self.lock();
        let mut found = false;
        for session in state
            .sessions
            .iter_mut()
            .filter(|s| endpoint.matches_name(&s.name))
        {
            found = true;
            if volume == 0.0 {
                session.muted = true;
            } else {
                session.volume = volume;
                session.muted = false;
            }
        }

        if found {
            debug!(endpoint = %endpoint, volume, "memory: application volume");
            Ok(())
        } else {
            Err(AudioError::session_not_found(&endpoint.name))
        }
    }
}

fn names_match(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_sessions_as_endpoints() {
        let mut backend = MemoryBackend::new()
            .with_session("firefox", Some(100), 0.7)
            .with_session("vlc", None, 1.0);

        let endpoints = backend.get_endpoints().unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].name, "firefox");
        assert_eq!(endpoints[0].pid, Some(100));
        assert_eq!(endpoints[0].current_volume, 0.7);
    }

    #[test]
    fn zero_mutes_and_nonzero_unmutes() {
        let mut backend = MemoryBackend::new().with_session("Music", Some(5), 0.6);

        backend
            .set_application_volume(&Endpoint::new("music").with_set_volume(0.0))
            .unwrap();
        let session = backend.session("music").unwrap();
        assert!(session.muted);
        assert_eq!(session.volume, 0.6);

        backend
            .set_application_volume(&Endpoint::new("MUSIC").with_set_volume(0.25))
            .unwrap();
        let session = backend.session("music").unwrap();
        assert!(!session.muted);
        assert_eq!(session.volume, 0.25);
    }

    #[test]
    fn updates_every_matching_session() {
        let mut backend = MemoryBackend::new()
            .with_session("chrome", Some(1), 0.1)
            .with_session("chrome", Some(2), 0.2)
            .with_session("slack", Some(3), 0.3);

        backend
            .set_application_volume(&Endpoint::new("chrome").with_set_volume(0.9))
            .unwrap();

        let volumes: Vec<f32> = backend.sessions().iter().map(|s| s.volume).collect();
        assert_eq!(volumes, vec![0.9, 0.9, 0.3]);
    }

    #[test]
    fn missing_session_is_reported() {
        let mut backend = MemoryBackend::new();
        let err = backend
            .set_application_volume(&Endpoint::new("ghost").with_set_volume(0.5))
            .unwrap_err();
        assert!(matches!(err, AudioError::SessionNotFound { .. }));
    }

    #[test]
    fn out_of_range_is_rejected_without_side_effects() {
        let mut backend = MemoryBackend::new().with_session("vlc", None, 0.5);

        let err = backend
            .set_application_volume(&Endpoint::new("vlc").with_set_volume(1.2))
            .unwrap_err();
        assert!(matches!(err, AudioError::VolumeOutOfRange { .. }));
        assert_eq!(backend.session("vlc").unwrap().volume, 0.5);

        assert!(backend.set_master_volume(-1.0).is_err());
        assert_eq!(backend.master_volume(), None);
    }

    #[test]
    fn records_master_and_microphone() {
        let mut backend = MemoryBackend::new();
        backend.set_master_volume(0.8).unwrap();
        backend.set_microphone_volume(0.0).unwrap();

        assert_eq!(backend.master_volume(), Some(0.8));
        assert_eq!(backend.microphone_volume(), Some(0.0));
        assert!(backend.is_microphone_muted());

        backend.set_microphone_volume(0.3).unwrap();
        assert!(!backend.is_microphone_muted());
    }

    #[test]
    fn clones_share_state() {
        let handle = MemoryBackend::new();
        let mut owned = handle.clone();

        owned.set_master_volume(0.1).unwrap();
        handle.add_session("game", Some(9), 1.0);

        assert_eq!(handle.master_volume(), Some(0.1));
        assert_eq!(owned.get_endpoints().unwrap().len(), 1);
        assert_eq!(handle.remove_session("GAME"), 1);
        assert!(owned.get_endpoints().unwrap().is_empty());
    }

    #[test]
    fn listing_failure_can_be_injected() {
        let mut backend = MemoryBackend::new();
        backend.set_fail_listing(true);
        assert!(backend.get_endpoints().is_err());
        backend.set_fail_listing(false);
        assert!(backend.get_endpoints().is_ok());
    }
}
