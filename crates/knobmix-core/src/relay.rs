//! Bounded relay buffer between the serial link and the mixing loop.
//!
//! The link pushes every data line it receives; the mixing loop periodically
//! asks for the freshest line matching the frame pattern. Each poll drains
//! the buffer completely, so a poll only ever sees lines that arrived since
//! the previous poll, and at most one of them is surfaced.
//!
//! Entries are kept as a stack. When the buffer is full, the entry evicted to
//! make room is the most recently pushed one (top of stack), not the oldest.
//! Under sustained overflow the bottom of the stack is therefore frozen and
//! only the top slot keeps changing.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use regex::Regex;
use tracing::trace;

/// Default number of lines held by a relay buffer.
pub const DEFAULT_RELAY_CAPACITY: usize = 64;

/// Relay buffer shared between the link task and the mixing loop.
pub type SharedRelay = Arc<RelayBuffer>;

/// Bounded, lock-protected stack of raw lines.
#[derive(Debug)]
pub struct RelayBuffer {
    capacity: usize,
    entries: Mutex<Vec<String>>,
}

impl Default for RelayBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_RELAY_CAPACITY)
    }
}

impl RelayBuffer {
    /// Creates a buffer holding at most `capacity` lines (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(Vec::with_capacity(capacity)),
        }
    }

    /// Creates a buffer wrapped for sharing between tasks.
    pub fn shared(capacity: usize) -> SharedRelay {
        Arc::new(Self::new(capacity))
    }

    /// Returns the fixed capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes a line as the most recent entry.
    ///
    /// If the buffer is full, the current most recent entry is discarded
    /// first.
    pub fn push(&self, line: impl Into<String>) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            let evicted = entries.pop();
            trace!(?evicted, capacity = self.capacity, "Relay full, evicting newest entry");
        }
        entries.push(line.into());
    }

    /// Returns the most recent line fully matching `pattern` and empties the
    /// buffer.
    ///
    /// Entries are examined newest first. The buffer is empty when this
    /// returns, whether or not a match was found.
    pub fn get_latest_match(&self, pattern: &Regex) -> Option<String> {
        let whole_line = anchored(pattern);
        let mut entries = self.lock();
        let mut found = None;
        while let Some(entry) = entries.pop() {
            let matched = match whole_line {
                Some(ref re) => re.is_match(&entry),
                None => leftmost_spans(pattern, &entry),
            };
            if matched {
                found = Some(entry);
                break;
            }
        }
        if !entries.is_empty() {
            trace!(discarded = entries.len(), "Draining older relay entries");
        }
        entries.clear();
        found
    }

    /// Removes and returns the most recent entry.
    pub fn pop(&self) -> Option<String> {
        self.lock().pop()
    }

    /// Returns the number of buffered lines.
    pub fn size(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if no lines are buffered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // A panic while holding the lock cannot leave the Vec half-modified, so
    // a poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wraps `pattern` as `^(?:pattern)$` so any alternative may span the line.
fn anchored(pattern: &Regex) -> Option<Regex> {
    Regex::new(&format!("^(?:{})$", pattern.as_str())).ok()
}

/// Fallback when the anchored form exceeds the regex size limit.
fn leftmost_spans(pattern: &Regex, text: &str) -> bool {
    pattern
        .find(text)
        .is_some_and(|m| m.start() == 0 && m.end() == text.len())
}
